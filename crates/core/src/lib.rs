//! Core library: scanning, uploading, credentials, archiving and the run pipeline.

pub mod archive;
pub mod auth;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod scanner;
pub mod uploader;
