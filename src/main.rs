use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transcript_resolver::cli::{Cli, Commands};
use transcript_resolver::config::Config;
use transcript_resolver::resolver::{HealthState, ResolveOptions, TranscriptResolver};
use transcript_resolver::{output, utils};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "resolver=debug,transcript_resolver=debug"
    } else {
        "resolver=info,transcript_resolver=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().await?;

    match cli.command {
        Commands::Fetch {
            video,
            output,
            format,
            languages,
            max_wait_ms,
        } => {
            let video_id = utils::extract_video_id(&video).ok_or_else(|| {
                anyhow::anyhow!("'{}' is not a video id or recognizable YouTube URL", video)
            })?;

            let resolver = TranscriptResolver::new(&config)?;

            let progress = if cli.quiet {
                None
            } else {
                let spinner = indicatif::ProgressBar::new_spinner();
                spinner.set_style(
                    indicatif::ProgressStyle::default_spinner()
                        .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
                );
                spinner.set_message(format!("Resolving transcript for {}...", video_id));
                spinner.enable_steady_tick(Duration::from_millis(100));
                Some(spinner)
            };

            let result = resolver
                .get_transcript(
                    &video_id,
                    ResolveOptions {
                        languages,
                        max_wait: Duration::from_millis(max_wait_ms),
                    },
                )
                .await?;

            if let Some(spinner) = progress {
                spinner.finish_and_clear();
            }

            match result {
                Some(transcript) => match output {
                    Some(path) => {
                        output::save_to_file(&transcript, &path, &format)?;
                        println!("Transcript saved to: {}", path.display());
                    }
                    None => output::print_to_console(&transcript, &format)?,
                },
                None => {
                    eprintln!("No transcript available for {}", video_id);
                    std::process::exit(1);
                }
            }
        }
        Commands::Health => {
            let resolver = TranscriptResolver::new(&config)?;
            let report = resolver.health_check().await;

            println!("Overall: {}", report.status);
            for source in &report.sources {
                match &source.last_error {
                    Some(error) => println!("  {} - {} ({})", source.source, source.state, error),
                    None => println!("  {} - {}", source.source, source.state),
                }
            }

            if report.status == HealthState::Unavailable {
                std::process::exit(1);
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Edit the config file manually:");
                println!(
                    "  {}",
                    dirs::config_dir()
                        .map(|d| d.join("transcript-resolver").join("config.yaml"))
                        .unwrap_or_default()
                        .display()
                );
            }
        }
        Commands::Sources => {
            println!("Configured transcript sources (fallback order):");
            let mut entries = vec![
                (
                    config.sources.remote_proxy.settings.priority,
                    "remote-proxy",
                    config.sources.remote_proxy.settings.enabled,
                    config.sources.remote_proxy.base_url.clone(),
                ),
                (
                    config.sources.cloud_api.settings.priority,
                    "cloud-api",
                    config.sources.cloud_api.settings.enabled
                        && config.sources.cloud_api.api_key.is_some(),
                    config.sources.cloud_api.base_url.clone(),
                ),
                (
                    config.sources.local_process.settings.priority,
                    "local-process",
                    config.sources.local_process.settings.enabled,
                    config.sources.local_process.python_cmd.clone(),
                ),
            ];
            entries.sort_by_key(|(priority, ..)| *priority);

            for (priority, name, enabled, target) in entries {
                println!(
                    "  {}. {} [{}] -> {}",
                    priority,
                    name,
                    if enabled { "enabled" } else { "disabled" },
                    target
                );
            }
        }
    }

    Ok(())
}
