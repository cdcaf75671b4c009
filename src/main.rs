use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mailproof::server::HttpServer;
use mailproof::{AppConfig, Checker, ViewportSet};

#[derive(Parser)]
#[command(name = "mailproof", version, about = "Check HTML email templates and capture them at several viewport sizes")]
struct Cli {
    /// Override the viewports, e.g. "desktop:1200x800,mobile:375x667"
    #[arg(long, global = true)]
    viewports: Option<String>,

    /// Chrome/Chromium binary to use for screenshots
    #[arg(long, global = true)]
    chrome: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a template and store a report
    Check {
        file: PathBuf,
        /// Also capture screenshots
        #[arg(long)]
        screenshots: bool,
        /// Print the stored report as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List stored reports, newest first
    Reports,
    /// Print one stored report as JSON
    Report { id: String },
    /// Remove screenshots older than the retention period
    Cleanup {
        #[arg(long)]
        days: Option<u64>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        bind: Option<String>,
        /// Worker threads (defaults to the number of CPUs)
        #[arg(long)]
        workers: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("reading configuration")?;
    if let Some(list) = &cli.viewports {
        config.viewports = ViewportSet::parse_list(list)?;
    }
    if let Some(chrome) = cli.chrome {
        config.capture.chrome_path = Some(chrome);
    }

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    let launcher = mailproof::default_launcher(config.capture.clone());

    match cli.command {
        Command::Check { file, screenshots, json } => {
            let checker = Checker::new(config, launcher);
            let content = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let upload = checker.accept(&filename, content, screenshots)?;
            let report = runtime.block_on(checker.check(upload))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.validation);
                if let Some(shots) = &report.screenshots {
                    println!("\nScreenshots:");
                    for shot in shots {
                        println!("   {} -> {}", shot.name, shot.path);
                    }
                    for failure in &report.screenshot_failures {
                        println!("   {} failed: {}", failure.viewport, failure.error);
                    }
                }
                println!("\nReport id: {}", report.run_id);
            }
        }
        Command::Reports => {
            let checker = Checker::new(config, launcher);
            for report in checker.reports().list()? {
                println!(
                    "{}  {}  html_valid={} missing_alt={} media_queries={}",
                    report.run_id,
                    report.original_filename,
                    report.validation.html_valid,
                    report.validation.missing_alt_count,
                    report.validation.media_query_count
                );
            }
        }
        Command::Report { id } => {
            let checker = Checker::new(config, launcher);
            let report = checker.reports().get(&id)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Cleanup { days } => {
            if let Some(days) = days {
                config.retention_days = days;
            }
            let checker = Checker::new(config, launcher);
            let summary = checker.sweep();
            println!("Removed {} screenshots ({} failures)", summary.removed, summary.failed);
        }
        Command::Serve { bind, workers } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            let server = HttpServer::bind(&config.bind)?;
            let checker = Arc::new(Checker::new(config, launcher));
            let workers = workers.unwrap_or_else(num_cpus::get);
            if workers == 0 {
                bail!("--workers must be at least 1");
            }
            server.run(checker, runtime.handle().clone(), workers);
        }
    }

    Ok(())
}
