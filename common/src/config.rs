use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One configured publishing account. Read-only to the scheduling core;
/// credentials and directories are owned by the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub proxy: Option<String>,
    pub account_directory: PathBuf,
    #[serde(default)]
    pub default_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryStructure {
    #[serde(default = "default_videos_dir")]
    pub videos_dir: String,
    #[serde(default = "default_captions_dir")]
    pub captions_dir: String,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

fn default_videos_dir() -> String { "videos".to_string() }
fn default_captions_dir() -> String { "captions".to_string() }
fn default_logs_dir() -> PathBuf { PathBuf::from("logs") }

impl Default for DirectoryStructure {
    fn default() -> Self {
        Self {
            videos_dir: default_videos_dir(),
            captions_dir: default_captions_dir(),
            logs_dir: default_logs_dir(),
        }
    }
}

/// Pacing bounds in seconds. Delays are drawn uniformly at random from
/// these intervals so uploads never show a fixed cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    #[serde(default = "default_min_delay_before")]
    pub min_delay_before_upload: f64,
    #[serde(default = "default_max_delay_before")]
    pub max_delay_before_upload: f64,
    #[serde(default = "default_min_delay_between")]
    pub min_delay_between_uploads: f64,
    #[serde(default = "default_max_delay_between")]
    pub max_delay_between_uploads: f64,
}

fn default_min_delay_before() -> f64 { 10.0 }
fn default_max_delay_before() -> f64 { 30.0 }
fn default_min_delay_between() -> f64 { 300.0 }
fn default_max_delay_between() -> f64 { 600.0 }

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            min_delay_before_upload: default_min_delay_before(),
            max_delay_before_upload: default_max_delay_before(),
            min_delay_between_uploads: default_min_delay_between(),
            max_delay_between_uploads: default_max_delay_between(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_schedules_file")]
    pub schedules_file: PathBuf,
    /// IANA time zone identifier all schedule times are interpreted in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
}

fn default_schedules_file() -> PathBuf { PathBuf::from(crate::DEFAULT_SCHEDULES_FILE) }
fn default_timezone() -> String { "Asia/Seoul".to_string() }
fn default_poll_interval() -> u64 { 60 }
fn default_error_backoff() -> u64 { 300 }

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            schedules_file: default_schedules_file(),
            timezone: default_timezone(),
            poll_interval_secs: default_poll_interval(),
            error_backoff_secs: default_error_backoff(),
        }
    }
}

/// Settings for the publishing API client: endpoint, presented device
/// identity and the session cache location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_app_version")]
    pub app_version: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_country_code")]
    pub country_code: u32,
    #[serde(default = "default_timezone_offset")]
    pub timezone_offset_secs: i64,
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
}

fn default_base_url() -> String { "https://i.instagram.com".to_string() }
fn default_app_version() -> String { "269.0.0.18.75".to_string() }
fn default_user_agent() -> String {
    "Instagram 269.0.0.18.75 Android (26/8.0.0; 480dpi; 1080x1920; Samsung; SM-G950F; \
     dreamlte; universal8895; ko_KR; 314665256)"
        .to_string()
}
fn default_locale() -> String { "ko_KR".to_string() }
fn default_country() -> String { "KR".to_string() }
fn default_country_code() -> u32 { 82 }
fn default_timezone_offset() -> i64 { 9 * 60 * 60 }
fn default_sessions_dir() -> PathBuf { PathBuf::from("sessions") }

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            app_version: default_app_version(),
            locale: default_locale(),
            country: default_country(),
            country_code: default_country_code(),
            timezone_offset_secs: default_timezone_offset(),
            sessions_dir: default_sessions_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub directory_structure: DirectoryStructure,
    #[serde(default)]
    pub upload_settings: UploadSettings,
    #[serde(default)]
    pub scheduler_settings: SchedulerSettings,
    #[serde(default)]
    pub api: ApiSettings,
}

impl Config {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Detect file type by extension and load.
    pub fn from_file(path: &Path) -> Result<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "json" => Self::from_json_file(path),
            "yaml" | "yml" => Self::from_yaml_file(path),
            _ => Err(anyhow!(
                "Unsupported config file format. Use .json, .yaml, or .yml"
            )),
        }
    }

    pub fn find_account(&self, username: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.username == username)
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.scheduler_settings
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Invalid timezone {:?}: {}", self.scheduler_settings.timezone, e))
    }

    pub fn videos_dir(&self, account: &Account) -> PathBuf {
        account
            .account_directory
            .join(&self.directory_structure.videos_dir)
    }

    pub fn captions_dir(&self, account: &Account) -> PathBuf {
        account
            .account_directory
            .join(&self.directory_structure.captions_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_config_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r##"{
                "accounts": [
                    {
                        "username": "alice",
                        "password": "hunter2",
                        "account_directory": "accounts/alice",
                        "default_tags": ["#daily", "#clip"]
                    }
                ]
            }"##,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.scheduler_settings.poll_interval_secs, 60);
        assert_eq!(config.scheduler_settings.error_backoff_secs, 300);
        assert_eq!(config.directory_structure.videos_dir, "videos");
        assert!(config.timezone().is_ok());

        let account = config.find_account("alice").unwrap();
        assert_eq!(
            config.videos_dir(account),
            PathBuf::from("accounts/alice/videos")
        );
        assert!(config.find_account("bob").is_none());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(Config::from_file(Path::new("config.ini")).is_err());
    }

    #[test]
    fn invalid_timezone_is_an_error() {
        let config = Config {
            scheduler_settings: SchedulerSettings {
                timezone: "Mars/Olympus_Mons".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.timezone().is_err());
    }
}
