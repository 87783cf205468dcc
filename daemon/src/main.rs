mod pacing;
mod publisher;
mod uploader;

use clap::Parser;
use common::{Config, ScheduleRepository, ScheduleStore};
use pacing::{PacingPolicy, RandomPacing};
use publisher::{ApiPublisher, Publisher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uploader::Uploader;

#[derive(Parser)]
#[command(author, version, about = "Scheduled video upload daemon", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = common::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Run a single scheduled pass and exit instead of looping
    #[arg(long)]
    once: bool,
    /// Also upload every account's pending videos after the scheduled pass
    #[arg(long)]
    all_accounts: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_file(&args.config)?;
    setup_logging(&config.directory_structure.logs_dir)?;
    log::info!("Starting clipsched-daemon...");

    let tz = config.timezone()?;
    let store = ScheduleStore::new(&config.scheduler_settings.schedules_file);
    let repo = ScheduleRepository::new(store, tz);
    let publisher = ApiPublisher::new(config.api.clone());
    let mut uploader = Uploader::new(config, repo, publisher, RandomPacing);

    if args.once {
        uploader.process_scheduled_uploads().await?;
        if args.all_accounts {
            uploader.process_all_accounts().await;
        }
        return Ok(());
    }

    run_daemon(&mut uploader, args.all_accounts).await
}

/// Long-running loop: one scheduled pass per poll interval, with a
/// longer backoff after a failed pass instead of terminating. Stops
/// only on an interrupt signal.
async fn run_daemon<P: Publisher, D: PacingPolicy>(
    uploader: &mut Uploader<P, D>,
    all_accounts: bool,
) -> anyhow::Result<()> {
    let settings = &uploader.config().scheduler_settings;
    let poll = Duration::from_secs(settings.poll_interval_secs);
    let backoff = Duration::from_secs(settings.error_backoff_secs);
    log::info!(
        "Scheduler daemon started (poll every {}s, backoff {}s)",
        poll.as_secs(),
        backoff.as_secs()
    );

    // One listener for the whole loop, so an interrupt lands even while
    // a pass is blocked inside its pacing sleeps or network calls. An
    // in-flight item may lose its completion record; that is accepted.
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let result = tokio::select! {
            result = run_pass(uploader, all_accounts) => result,
            _ = &mut shutdown => {
                log::info!("Scheduler daemon stopping");
                return Ok(());
            }
        };
        let wait = match result {
            Ok(()) => poll,
            Err(e) => {
                log::error!("Scheduled processing failed: {:#}", e);
                backoff
            }
        };
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = &mut shutdown => {
                log::info!("Scheduler daemon stopping");
                return Ok(());
            }
        }
    }
}

async fn run_pass<P: Publisher, D: PacingPolicy>(
    uploader: &mut Uploader<P, D>,
    all_accounts: bool,
) -> anyhow::Result<()> {
    uploader.process_scheduled_uploads().await?;
    if all_accounts {
        uploader.process_all_accounts().await;
    }
    Ok(())
}

fn setup_logging(logs_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(logs_dir)?;
    let log_file = logs_dir.join(format!(
        "clipsched_daemon_{}.log",
        chrono::Local::now().format("%Y%m%d")
    ));

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout())
        .chain(fern::log_file(log_file)?)
        .apply()?;

    Ok(())
}
