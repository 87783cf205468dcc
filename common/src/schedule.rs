use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Minute-resolution format used for scheduled times.
pub const SCHEDULE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Second-resolution format used for created/terminal timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Failed => "failed",
            ScheduleStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScheduleStatus::Pending),
            "completed" => Ok(ScheduleStatus::Completed),
            "failed" => Ok(ScheduleStatus::Failed),
            "cancelled" => Ok(ScheduleStatus::Cancelled),
            other => Err(format!(
                "unknown status {:?}, expected pending, completed, failed or cancelled",
                other
            )),
        }
    }
}

/// A single requested publish action: one video, one account, one time.
///
/// Times are stored as naive local timestamps and interpreted in the
/// configured time zone; the serialized form matches the schedules.json
/// document layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: u64,
    pub account_username: String,
    pub video_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(with = "minute_format")]
    pub scheduled_time: NaiveDateTime,
    pub status: ScheduleStatus,
    #[serde(with = "second_format")]
    pub created_at: NaiveDateTime,
    #[serde(default, with = "second_format_opt", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<NaiveDateTime>,
    #[serde(default, with = "second_format_opt", skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Schedule {
    pub fn is_terminal(&self) -> bool {
        self.status != ScheduleStatus::Pending
    }

    pub fn video_name(&self) -> &str {
        self.video_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("?")
    }
}

pub mod minute_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.format(super::SCHEDULE_TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, super::SCHEDULE_TIME_FORMAT)
            .map_err(serde::de::Error::custom)
    }
}

pub mod second_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.format(super::TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, super::TIMESTAMP_FORMAT)
            .map_err(serde::de::Error::custom)
    }
}

pub mod second_format_opt {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        dt: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => {
                serializer.serialize_some(&dt.format(super::TIMESTAMP_FORMAT).to_string())
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => NaiveDateTime::parse_from_str(&s, super::TIMESTAMP_FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> Schedule {
        Schedule {
            id: 3,
            account_username: "alice".to_string(),
            video_path: PathBuf::from("accounts/alice/videos/clip.mp4"),
            caption: None,
            scheduled_time: NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(14, 30, 0)
                .unwrap(),
            status: ScheduleStatus::Pending,
            created_at: NaiveDate::from_ymd_opt(2025, 5, 30)
                .unwrap()
                .and_hms_opt(9, 15, 42)
                .unwrap(),
            completed_at: None,
            failed_at: None,
            error_message: None,
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ScheduleStatus::Pending,
            ScheduleStatus::Completed,
            ScheduleStatus::Failed,
            ScheduleStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<ScheduleStatus>(), Ok(status));
        }
        assert!("done".parse::<ScheduleStatus>().is_err());
    }

    #[test]
    fn serializes_times_in_document_format() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["scheduled_time"], "2025-06-01 14:30");
        assert_eq!(json["created_at"], "2025-05-30 09:15:42");
        assert_eq!(json["status"], "pending");
        assert!(json.get("completed_at").is_none());
        assert!(json.get("error_message").is_none());
    }

    #[test]
    fn deserializes_terminal_fields() {
        let json = r#"{
            "id": 7,
            "account_username": "bob",
            "video_path": "v.mp4",
            "scheduled_time": "2025-06-01 10:00",
            "status": "failed",
            "created_at": "2025-05-30 08:00:00",
            "failed_at": "2025-06-01 10:01:07",
            "error_message": "login failed"
        }"#;
        let schedule: Schedule = serde_json::from_str(json).unwrap();
        assert_eq!(schedule.status, ScheduleStatus::Failed);
        assert!(schedule.is_terminal());
        assert!(schedule.failed_at.is_some());
        assert_eq!(schedule.error_message.as_deref(), Some("login failed"));
    }
}
