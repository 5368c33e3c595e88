use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::prompt::{AutoConfirm, ConsolePrompt};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uploader_core::auth::YouTubeConnector;
use uploader_core::config;
use uploader_core::config::AppConfig;
use uploader_core::pipeline::{self, Confirm, RunOutcome};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    debug!(categories = cfg.categories.len(), "configuration loaded");

    match cli.command.unwrap_or(Commands::Upload { yes: false }) {
        Commands::Upload { yes } => run_upload(cfg, yes).await,
        Commands::Scan { json } => run_scan(cfg, json),
        Commands::Login => run_login(cfg).await,
    }
}

#[derive(Parser)]
#[command(name = "folder-uploader")]
#[command(about = "Upload category folders of videos to YouTube playlists", long_about = None)]
struct Cli {
    /// Path to config file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan, confirm, upload and archive (default)
    Upload {
        /// Skip the confirmation prompt
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
    /// List pending uploads without authenticating
    Scan {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the interactive login and store a fresh token
    Login,
}

async fn run_upload(cfg: AppConfig, yes: bool) -> Result<()> {
    let connector = YouTubeConnector::from_config(&cfg);
    let mut console;
    let mut auto;
    let prompt: &mut dyn Confirm = if yes {
        auto = AutoConfirm;
        &mut auto
    } else {
        console = ConsolePrompt::stdio();
        &mut console
    };

    match pipeline::run(&cfg, &connector, prompt).await? {
        RunOutcome::NothingToUpload => {}
        RunOutcome::Cancelled => println!("Upload cancelled."),
        RunOutcome::Finished(report) => {
            println!(
                "upload summary: uploaded={}, partial={}, failed={}",
                report.uploaded.len(),
                report.partial.len(),
                report.failed.len()
            );
            for p in &report.partial {
                println!(
                    "  video {} created without playlist: {}",
                    p.video_id,
                    p.path.display()
                );
            }
        }
    }
    Ok(())
}

fn run_scan(cfg: AppConfig, json: bool) -> Result<()> {
    let pending = pipeline::plan(&cfg)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&pending)?);
    } else {
        print!("{}", pipeline::render_summary(&cfg.categories(), &pending));
    }
    Ok(())
}

async fn run_login(cfg: AppConfig) -> Result<()> {
    let connector = YouTubeConnector::from_config(&cfg);
    connector.credentials().login().await?;
    println!("Token saved to {}", cfg.auth.token_file);
    Ok(())
}
