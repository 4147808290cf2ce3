use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "resolver",
    about = "Transcript Resolver - fetch YouTube transcripts with multi-source fallback and caching",
    version,
    long_about = "Resolves the transcript for a YouTube video id by trying a remote extraction proxy, a hosted transcript API, and a local python subprocess in priority order, caching whatever succeeds."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the transcript for a video id or YouTube URL
    Fetch {
        /// 11-character video id or any common YouTube URL
        #[arg(value_name = "VIDEO")]
        video: String,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Preferred language codes, tried in order
        #[arg(short, long = "lang", value_name = "LANG")]
        languages: Vec<String>,

        /// Overall deadline for the whole fallback chain, in milliseconds
        #[arg(long, default_value = "60000", value_name = "MS")]
        max_wait_ms: u64,
    },

    /// Probe every configured source and report aggregate health
    Health,

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List configured transcript sources in fallback order
    Sources,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// Plain transcript text
    Text,
    /// JSON with source metadata
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
