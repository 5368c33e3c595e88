use std::io::{self, BufRead, Write};
use uploader_core::pipeline::{is_affirmative, Confirm};

/// Prints the summary and reads a yes/no answer.
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Confirm for ConsolePrompt<R, W> {
    fn confirm(&mut self, summary: &str) -> io::Result<bool> {
        writeln!(self.output)?;
        writeln!(self.output, "{}", summary)?;
        write!(self.output, "Start uploading? (y/n): ")?;
        self.output.flush()?;
        let mut answer = String::new();
        // EOF leaves the answer empty, which cancels.
        self.input.read_line(&mut answer)?;
        Ok(is_affirmative(&answer))
    }
}

/// `--yes`: prints the summary and proceeds without asking.
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&mut self, summary: &str) -> io::Result<bool> {
        println!("\n{}", summary);
        Ok(true)
    }
}
