pub mod config;
pub mod discovery;
pub mod repository;
pub mod schedule;
pub mod store;

pub use config::{Account, Config};
pub use repository::{ScheduleError, ScheduleRepository};
pub use schedule::{Schedule, ScheduleStatus, SCHEDULE_TIME_FORMAT, TIMESTAMP_FORMAT};
pub use store::{ScheduleSet, ScheduleStore};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_SCHEDULES_FILE: &str = "schedules.json";

/// Sidecar suffix marking a video as already published.
pub const UPLOADED_MARKER_SUFFIX: &str = ".uploaded";

/// File extensions treated as uploadable videos.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi"];
