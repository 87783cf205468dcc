use clap::{Parser, Subcommand};
use comfy_table::Table;
use common::discovery;
use common::{
    Account, Config, Schedule, ScheduleRepository, ScheduleStatus, ScheduleStore,
    SCHEDULE_TIME_FORMAT, TIMESTAMP_FORMAT,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Manage scheduled video uploads", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = common::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule a video upload
    Add {
        /// Account username
        username: String,
        /// Video file name inside the account's videos directory
        video: String,
        /// Scheduled time (YYYY-MM-DD HH:MM)
        time: String,
        /// Attach the matching caption file (or a generated default)
        #[arg(long)]
        caption: bool,
    },
    /// List scheduled uploads
    List {
        /// Only this account's schedules
        #[arg(long)]
        username: Option<String>,
        /// Only schedules with this status
        #[arg(long, value_parser = parse_status)]
        status: Option<ScheduleStatus>,
    },
    /// Cancel a pending scheduled upload
    Cancel {
        /// Id of the schedule to cancel
        id: u64,
    },
    /// Show videos on disk that have no pending schedule
    Unscheduled {
        #[arg(long)]
        username: Option<String>,
    },
    /// Show videos missing caption files
    Captions {
        #[arg(long)]
        username: Option<String>,
        /// List caption files without a matching video instead
        #[arg(long)]
        orphaned: bool,
    },
}

fn parse_status(s: &str) -> Result<ScheduleStatus, String> {
    s.parse()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    // Business failures are reported as text; only argument parsing
    // exits non-zero.
    if let Err(e) = run(cli) {
        log::error!("Command failed: {:#}", e);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_file(&cli.config)?;
    let tz = config.timezone()?;
    let store = ScheduleStore::new(&config.scheduler_settings.schedules_file);
    let mut repo = ScheduleRepository::new(store, tz);

    match cli.command {
        Commands::Add {
            username,
            video,
            time,
            caption,
        } => add(&config, &mut repo, &username, &video, &time, caption),
        Commands::List { username, status } => {
            let schedules = repo.list(username.as_deref(), status);
            if schedules.is_empty() {
                println!("No scheduled uploads.");
            } else {
                println!("{}", schedule_table(&schedules));
            }
        }
        Commands::Cancel { id } => match repo.cancel(id) {
            Ok(true) => println!("Schedule {} cancelled.", id),
            Ok(false) => {
                println!("Schedule {} was not cancelled (unknown id or already processed).", id)
            }
            Err(e) => log::error!("Failed to cancel schedule {}: {}", id, e),
        },
        Commands::Unscheduled { username } => unscheduled(&config, &repo, username.as_deref()),
        Commands::Captions { username, orphaned } => {
            captions(&config, username.as_deref(), orphaned)
        }
    }
    Ok(())
}

fn add(
    config: &Config,
    repo: &mut ScheduleRepository,
    username: &str,
    video: &str,
    time: &str,
    use_caption: bool,
) {
    let Some(account) = config.find_account(username) else {
        log::error!("Account not found: {}", username);
        return;
    };

    let video_path = config.videos_dir(account).join(video);
    if !video_path.exists() {
        log::error!("Video file not found: {}", video_path.display());
        return;
    }

    let caption = if use_caption {
        let caption_path = discovery::caption_path(&video_path, &config.captions_dir(account));
        match fs::read_to_string(&caption_path) {
            Ok(text) => Some(text.trim().to_string()),
            Err(_) => {
                log::warn!(
                    "Caption file not found: {}; using a generated caption",
                    caption_path.display()
                );
                Some(discovery::default_caption(&video_path, &account.default_tags))
            }
        }
    } else {
        None
    };

    match repo.add(username, &video_path, time, caption) {
        Ok(schedule) => {
            println!("Schedule added:");
            println!("{}", schedule_table(&[schedule]));
        }
        Err(e) => log::error!("Failed to add schedule: {}", e),
    }
}

fn unscheduled(config: &Config, repo: &ScheduleRepository, username: Option<&str>) {
    for account in accounts(config, username) {
        let on_disk = discovery::pending_videos(&config.videos_dir(account));
        let pending: BTreeSet<String> = repo
            .list(Some(&account.username), Some(ScheduleStatus::Pending))
            .iter()
            .map(|s| s.video_name().to_string())
            .collect();

        let free: Vec<&str> = on_disk
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .filter(|name| !pending.contains(*name))
            .collect();

        if free.is_empty() {
            println!("All videos for {} are scheduled.", account.username);
        } else {
            println!("Unscheduled videos for {}:", account.username);
            for name in free {
                println!("  {}", name);
            }
        }
    }
}

fn captions(config: &Config, username: Option<&str>, orphaned: bool) {
    for account in accounts(config, username) {
        let video_stems: BTreeSet<String> = discovery::pending_videos(&config.videos_dir(account))
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        let caption_stems: BTreeSet<String> = caption_files(&config.captions_dir(account));

        if orphaned {
            let extra: Vec<&String> = caption_stems.difference(&video_stems).collect();
            if extra.is_empty() {
                println!("Every caption for {} has a matching video.", account.username);
            } else {
                println!("Captions without a video for {}:", account.username);
                for stem in extra {
                    println!("  {}.txt", stem);
                }
            }
        } else {
            let missing: Vec<&String> = video_stems.difference(&caption_stems).collect();
            if missing.is_empty() {
                println!("Every video for {} has a caption.", account.username);
            } else {
                println!("Videos without a caption for {}:", account.username);
                for stem in missing {
                    println!("  {}", stem);
                }
            }
        }
    }
}

fn caption_files(captions_dir: &std::path::Path) -> BTreeSet<String> {
    let Ok(entries) = fs::read_dir(captions_dir) else {
        return BTreeSet::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("txt"))
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
        .collect()
}

fn accounts<'a>(config: &'a Config, username: Option<&str>) -> Vec<&'a Account> {
    let selected: Vec<&Account> = config
        .accounts
        .iter()
        .filter(|a| username.map_or(true, |u| a.username == u))
        .collect();
    if selected.is_empty() {
        if let Some(u) = username {
            log::error!("Account not found: {}", u);
        } else {
            println!("No accounts configured.");
        }
    }
    selected
}

fn schedule_table(schedules: &[Schedule]) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["ID", "Account", "Video", "Scheduled", "Status", "Created"]);
    for s in schedules {
        table.add_row(vec![
            s.id.to_string(),
            s.account_username.clone(),
            s.video_name().to_string(),
            s.scheduled_time.format(SCHEDULE_TIME_FORMAT).to_string(),
            s.status.to_string(),
            s.created_at.format(TIMESTAMP_FORMAT).to_string(),
        ]);
    }
    table
}
