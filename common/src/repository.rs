use crate::schedule::{Schedule, ScheduleStatus, SCHEDULE_TIME_FORMAT};
use crate::store::{ScheduleSet, ScheduleStore};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid time format {0:?}, expected YYYY-MM-DD HH:MM")]
    InvalidTimeFormat(String),
    #[error("scheduled time must be later than the current time")]
    TimeNotInFuture,
    #[error("failed to persist schedules: {0}")]
    Store(#[from] std::io::Error),
}

/// Business logic over the schedule store.
///
/// Every mutation is persisted before the call returns; the store file
/// stays the sole source of truth. Expected "not found" and
/// "already terminal" outcomes are reported as booleans or no-ops,
/// never as errors; only store I/O surfaces as `ScheduleError::Store`.
pub struct ScheduleRepository {
    store: ScheduleStore,
    set: ScheduleSet,
    tz: Tz,
}

impl ScheduleRepository {
    pub fn new(store: ScheduleStore, tz: Tz) -> Self {
        let set = store.load();
        Self { store, set, tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Current time in the configured zone.
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    /// Validate and create a new pending schedule.
    pub fn add(
        &mut self,
        account_username: &str,
        video_path: impl Into<PathBuf>,
        scheduled_time: &str,
        caption: Option<String>,
    ) -> Result<Schedule, ScheduleError> {
        let naive = NaiveDateTime::parse_from_str(scheduled_time, SCHEDULE_TIME_FORMAT)
            .map_err(|_| ScheduleError::InvalidTimeFormat(scheduled_time.to_string()))?;
        let now = self.now();
        match self.resolve_local(&naive) {
            Some(local) if local > now => {}
            _ => {
                log::error!(
                    "Rejected schedule for {}: {} is not in the future",
                    account_username,
                    scheduled_time
                );
                return Err(ScheduleError::TimeNotInFuture);
            }
        }

        let schedule = Schedule {
            id: self.set.next_id(),
            account_username: account_username.to_string(),
            video_path: video_path.into(),
            caption,
            scheduled_time: naive,
            status: ScheduleStatus::Pending,
            created_at: now.naive_local(),
            completed_at: None,
            failed_at: None,
            error_message: None,
        };
        self.set.schedules.push(schedule.clone());
        if let Err(e) = self.store.save(&self.set) {
            self.set.schedules.pop();
            return Err(ScheduleError::Store(e));
        }
        log::info!(
            "Added upload schedule (id: {}, account: {}, at: {})",
            schedule.id,
            schedule.account_username,
            scheduled_time
        );
        Ok(schedule)
    }

    /// Schedules matching the optional filters, sorted by scheduled time.
    pub fn list(&self, account: Option<&str>, status: Option<ScheduleStatus>) -> Vec<Schedule> {
        let mut out: Vec<Schedule> = self
            .set
            .schedules
            .iter()
            .filter(|s| account.map_or(true, |a| s.account_username == a))
            .filter(|s| status.map_or(true, |st| s.status == st))
            .cloned()
            .collect();
        out.sort_by_key(|s| s.scheduled_time);
        out
    }

    /// Cancel a pending schedule. Unknown ids and already-terminal
    /// schedules are expected outcomes and return false.
    pub fn cancel(&mut self, id: u64) -> Result<bool, ScheduleError> {
        let Some(schedule) = self.set.find_mut(id) else {
            log::error!("Schedule not found (id: {})", id);
            return Ok(false);
        };
        if schedule.is_terminal() {
            log::warn!(
                "Schedule {} is already {}; cancel is a no-op",
                id,
                schedule.status
            );
            return Ok(false);
        }
        schedule.status = ScheduleStatus::Cancelled;
        if let Err(e) = self.store.save(&self.set) {
            // Keep memory matching the persisted copy.
            if let Some(schedule) = self.set.find_mut(id) {
                schedule.status = ScheduleStatus::Pending;
            }
            return Err(ScheduleError::Store(e));
        }
        log::info!("Upload schedule cancelled (id: {})", id);
        Ok(true)
    }

    /// Pending schedules whose time has arrived, in store order.
    pub fn due_now(&self, now: DateTime<Tz>) -> Vec<Schedule> {
        self.set
            .schedules
            .iter()
            .filter(|s| s.status == ScheduleStatus::Pending)
            .filter(|s| match self.resolve_local(&s.scheduled_time) {
                Some(t) => t <= now,
                // Local times that fall in a DST gap are not yet due.
                None => false,
            })
            .cloned()
            .collect()
    }

    pub fn mark_completed(&mut self, id: u64) -> Result<(), ScheduleError> {
        let now = self.now().naive_local();
        let Some(schedule) = self.set.find_mut(id) else {
            log::error!("Schedule not found (id: {})", id);
            return Ok(());
        };
        if schedule.is_terminal() {
            log::warn!("Schedule {} is already {}; not marking completed", id, schedule.status);
            return Ok(());
        }
        schedule.status = ScheduleStatus::Completed;
        schedule.completed_at = Some(now);
        if let Err(e) = self.store.save(&self.set) {
            if let Some(schedule) = self.set.find_mut(id) {
                schedule.status = ScheduleStatus::Pending;
                schedule.completed_at = None;
            }
            return Err(ScheduleError::Store(e));
        }
        log::info!("Upload marked completed (id: {})", id);
        Ok(())
    }

    pub fn mark_failed(&mut self, id: u64, error_message: &str) -> Result<(), ScheduleError> {
        let now = self.now().naive_local();
        let Some(schedule) = self.set.find_mut(id) else {
            log::error!("Schedule not found (id: {})", id);
            return Ok(());
        };
        if schedule.is_terminal() {
            log::warn!("Schedule {} is already {}; not marking failed", id, schedule.status);
            return Ok(());
        }
        schedule.status = ScheduleStatus::Failed;
        schedule.failed_at = Some(now);
        schedule.error_message = Some(error_message.to_string());
        if let Err(e) = self.store.save(&self.set) {
            if let Some(schedule) = self.set.find_mut(id) {
                schedule.status = ScheduleStatus::Pending;
                schedule.failed_at = None;
                schedule.error_message = None;
            }
            return Err(ScheduleError::Store(e));
        }
        log::info!("Upload marked failed (id: {}): {}", id, error_message);
        Ok(())
    }

    fn resolve_local(&self, naive: &NaiveDateTime) -> Option<DateTime<Tz>> {
        self.tz.from_local_datetime(naive).earliest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn repo(dir: &tempfile::TempDir) -> ScheduleRepository {
        let store = ScheduleStore::new(dir.path().join("schedules.json"));
        ScheduleRepository::new(store, Tz::UTC)
    }

    fn future_time(repo: &ScheduleRepository, minutes: i64) -> String {
        (repo.now() + Duration::minutes(minutes))
            .format(SCHEDULE_TIME_FORMAT)
            .to_string()
    }

    #[test]
    fn add_assigns_monotonic_ids_and_pending_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = repo(&dir);
        let t = future_time(&repo, 10);

        let a = repo.add("alice", "a.mp4", &t, None).unwrap();
        let b = repo.add("alice", "b.mp4", &t, Some("cap".to_string())).unwrap();
        assert_eq!(a.status, ScheduleStatus::Pending);
        assert!(b.id > a.id);
    }

    #[test]
    fn add_rejects_past_time_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = repo(&dir);
        let past = (repo.now() - Duration::minutes(1))
            .format(SCHEDULE_TIME_FORMAT)
            .to_string();

        let err = repo.add("alice", "a.mp4", &past, None).unwrap_err();
        assert!(matches!(err, ScheduleError::TimeNotInFuture));
        assert!(repo.list(None, None).is_empty());
        // Nothing was persisted either.
        let reloaded = ScheduleStore::new(dir.path().join("schedules.json")).load();
        assert!(reloaded.schedules.is_empty());
    }

    #[test]
    fn add_rejects_bad_time_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = repo(&dir);
        let err = repo.add("alice", "a.mp4", "tomorrow at noon", None).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidTimeFormat(_)));
    }

    #[test]
    fn cancel_is_idempotent_in_effect() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = repo(&dir);
        let t = future_time(&repo, 10);
        let id = repo.add("alice", "a.mp4", &t, None).unwrap().id;

        assert!(repo.cancel(id).unwrap());
        assert!(!repo.cancel(id).unwrap());
        assert_eq!(
            repo.list(None, None)[0].status,
            ScheduleStatus::Cancelled
        );
    }

    #[test]
    fn cancel_unknown_id_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = repo(&dir);
        assert!(!repo.cancel(42).unwrap());
    }

    #[test]
    fn cancel_completed_schedule_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = repo(&dir);
        let t = future_time(&repo, 10);
        let id = repo.add("alice", "a.mp4", &t, None).unwrap().id;

        repo.mark_completed(id).unwrap();
        assert!(!repo.cancel(id).unwrap());
        assert_eq!(repo.list(None, None)[0].status, ScheduleStatus::Completed);
    }

    #[test]
    fn due_now_returns_exactly_the_arrived_pending_schedules() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = repo(&dir);
        let soon = repo.add("alice", "a.mp4", &future_time(&repo, 5), None).unwrap();
        let later = repo.add("bob", "b.mp4", &future_time(&repo, 120), None).unwrap();

        assert!(repo.due_now(repo.now()).is_empty());

        let due = repo.due_now(repo.now() + Duration::minutes(30));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, soon.id);

        let due = repo.due_now(repo.now() + Duration::hours(3));
        assert_eq!(due.len(), 2);
        assert_eq!(due[1].id, later.id);
    }

    #[test]
    fn terminal_schedules_never_become_due_again() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = repo(&dir);
        let id = repo.add("alice", "a.mp4", &future_time(&repo, 5), None).unwrap().id;
        let far = repo.now() + Duration::days(365);

        repo.mark_failed(id, "upload failed").unwrap();
        assert!(repo.due_now(far).is_empty());

        let schedules = repo.list(None, None);
        let schedule = &schedules[0];
        assert_eq!(schedule.status, ScheduleStatus::Failed);
        assert!(schedule.failed_at.is_some());
        assert_eq!(schedule.error_message.as_deref(), Some("upload failed"));
    }

    #[test]
    fn mark_completed_on_terminal_schedule_does_not_transition() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = repo(&dir);
        let id = repo.add("alice", "a.mp4", &future_time(&repo, 5), None).unwrap().id;

        repo.mark_failed(id, "boom").unwrap();
        repo.mark_completed(id).unwrap();
        assert_eq!(repo.list(None, None)[0].status, ScheduleStatus::Failed);
    }

    #[test]
    fn mark_on_unknown_id_is_logged_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = repo(&dir);
        repo.mark_completed(99).unwrap();
        repo.mark_failed(99, "nope").unwrap();
        assert!(repo.list(None, None).is_empty());
    }

    #[test]
    fn list_filters_and_sorts_by_scheduled_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = repo(&dir);
        let late = repo.add("alice", "late.mp4", &future_time(&repo, 60), None).unwrap();
        let early = repo.add("alice", "early.mp4", &future_time(&repo, 10), None).unwrap();
        let other = repo.add("bob", "b.mp4", &future_time(&repo, 30), None).unwrap();
        repo.cancel(other.id).unwrap();

        let all = repo.list(None, None);
        assert_eq!(
            all.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![early.id, other.id, late.id]
        );

        let alice = repo.list(Some("alice"), None);
        assert_eq!(alice.len(), 2);

        let cancelled = repo.list(Some("bob"), Some(ScheduleStatus::Cancelled));
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, other.id);
    }

    #[test]
    fn failed_save_rolls_back_in_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("data");
        std::fs::create_dir(&store_dir).unwrap();
        let mut repo =
            ScheduleRepository::new(ScheduleStore::new(store_dir.join("schedules.json")), Tz::UTC);
        let t = future_time(&repo, 10);
        let id = repo.add("alice", "a.mp4", &t, None).unwrap().id;

        // Every save now fails; memory must keep the last persisted state.
        std::fs::remove_dir_all(&store_dir).unwrap();

        assert!(matches!(
            repo.mark_completed(id),
            Err(ScheduleError::Store(_))
        ));
        let schedules = repo.list(None, None);
        assert_eq!(schedules[0].status, ScheduleStatus::Pending);
        assert!(schedules[0].completed_at.is_none());

        assert!(repo.mark_failed(id, "boom").is_err());
        let schedules = repo.list(None, None);
        assert_eq!(schedules[0].status, ScheduleStatus::Pending);
        assert!(schedules[0].failed_at.is_none());
        assert!(schedules[0].error_message.is_none());

        assert!(repo.cancel(id).is_err());
        assert_eq!(repo.list(None, None)[0].status, ScheduleStatus::Pending);
    }

    #[test]
    fn mutations_are_write_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedules.json");
        let mut repo = ScheduleRepository::new(ScheduleStore::new(&path), Tz::UTC);
        let t = future_time(&repo, 10);
        let id = repo.add("alice", "a.mp4", &t, None).unwrap().id;
        repo.mark_completed(id).unwrap();

        // A fresh repository over the same file sees the final state.
        let fresh = ScheduleRepository::new(ScheduleStore::new(&path), Tz::UTC);
        assert_eq!(fresh.list(None, None)[0].status, ScheduleStatus::Completed);
    }
}
