use crate::pacing::PacingPolicy;
use crate::publisher::Publisher;
use anyhow::Result;
use common::config::{Account, Config};
use common::discovery;
use common::repository::ScheduleRepository;
use common::schedule::Schedule;

/// Execution driver: turns due schedules (and, in batch mode, all
/// discovered account/video pairs) into publisher invocations, with
/// randomized pacing between items.
///
/// Uploads run strictly sequentially; parallelism would defeat the
/// pacing policy. One item's failure never aborts a pass; only store
/// I/O errors propagate.
pub struct Uploader<P, D> {
    config: Config,
    repo: ScheduleRepository,
    publisher: P,
    pacing: D,
}

impl<P: Publisher, D: PacingPolicy> Uploader<P, D> {
    pub fn new(config: Config, repo: ScheduleRepository, publisher: P, pacing: D) -> Self {
        Self {
            config,
            repo,
            publisher,
            pacing,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repo(&self) -> &ScheduleRepository {
        &self.repo
    }

    /// One schedule-driven pass over the current due set.
    pub async fn process_scheduled_uploads(&mut self) -> Result<()> {
        let due = self.repo.due_now(self.repo.now());
        if due.is_empty() {
            return Ok(());
        }
        log::info!("Processing {} due schedule(s)", due.len());
        let last = due.len() - 1;
        for (i, schedule) in due.into_iter().enumerate() {
            self.run_scheduled_item(&schedule).await?;
            if i < last {
                self.sleep_between("next scheduled upload").await;
            }
        }
        Ok(())
    }

    async fn run_scheduled_item(&mut self, schedule: &Schedule) -> Result<()> {
        log::info!(
            "Processing scheduled upload (id: {}, account: {}, video: {})",
            schedule.id,
            schedule.account_username,
            schedule.video_name()
        );

        let Some(account) = self.config.find_account(&schedule.account_username).cloned() else {
            let msg = format!("account not found: {}", schedule.account_username);
            log::error!("{} (id: {})", msg, schedule.id);
            self.repo.mark_failed(schedule.id, &msg)?;
            return Ok(());
        };

        if !schedule.video_path.exists() {
            let msg = format!("video file not found: {}", schedule.video_path.display());
            log::error!("{} (id: {})", msg, schedule.id);
            self.repo.mark_failed(schedule.id, &msg)?;
            return Ok(());
        }

        let session = match self.publisher.acquire_session(&account).await {
            Ok(session) => session,
            Err(e) => {
                log::error!("Session acquisition failed (id: {}): {}", schedule.id, e);
                self.repo.mark_failed(schedule.id, &e.to_string())?;
                return Ok(());
            }
        };

        let caption = match &schedule.caption {
            Some(caption) => caption.clone(),
            None => discovery::default_caption(&schedule.video_path, &account.default_tags),
        };

        self.sleep_before_upload().await;
        match self
            .publisher
            .upload(&session, &schedule.video_path, &caption)
            .await
        {
            Ok(media) => {
                log::info!("Upload complete (id: {}, media: {})", schedule.id, media.0);
                self.repo.mark_completed(schedule.id)?;
            }
            Err(e) => {
                log::error!("Upload failed (id: {}): {}", schedule.id, e);
                self.repo.mark_failed(schedule.id, &e.to_string())?;
            }
        }
        Ok(())
    }

    /// Batch mode: upload every not-yet-published video of every
    /// configured account, ignoring the schedule store.
    pub async fn process_all_accounts(&mut self) {
        let accounts = self.config.accounts.clone();
        let last = accounts.len().saturating_sub(1);
        for (i, account) in accounts.iter().enumerate() {
            log::info!("Processing account: {}", account.username);
            if let Err(e) = self.process_account(account).await {
                log::error!("Account {} failed: {}", account.username, e);
            }
            if i < last {
                self.sleep_between("next account").await;
            }
        }
    }

    pub async fn process_account(&mut self, account: &Account) -> Result<()> {
        let videos_dir = self.config.videos_dir(account);
        let captions_dir = self.config.captions_dir(account);
        let videos = discovery::pending_videos(&videos_dir);
        if videos.is_empty() {
            log::info!("No videos to upload for {}", account.username);
            return Ok(());
        }

        let session = self.publisher.acquire_session(account).await?;
        let last = videos.len() - 1;
        for (i, video) in videos.iter().enumerate() {
            let caption = discovery::caption_for(video, &captions_dir, account);
            log::info!("Uploading {}", video.display());
            self.sleep_before_upload().await;
            match self.publisher.upload(&session, video, &caption).await {
                Ok(media) => {
                    log::info!("Upload complete: {} (media: {})", video.display(), media.0)
                }
                Err(e) => log::error!("Upload failed for {}: {}", video.display(), e),
            }
            if i < last {
                self.sleep_between("next video").await;
            }
        }
        Ok(())
    }

    async fn sleep_before_upload(&mut self) {
        let settings = &self.config.upload_settings;
        let delay = self.pacing.next_delay(
            settings.min_delay_before_upload,
            settings.max_delay_before_upload,
        );
        log::info!("Waiting {:.1}s before upload", delay.as_secs_f64());
        tokio::time::sleep(delay).await;
    }

    async fn sleep_between(&mut self, what: &str) {
        let settings = &self.config.upload_settings;
        let delay = self.pacing.next_delay(
            settings.min_delay_between_uploads,
            settings.max_delay_between_uploads,
        );
        log::info!("Waiting {:.1}s before {}", delay.as_secs_f64(), what);
        tokio::time::sleep(delay).await;
    }
}
