use crate::config::Account;
use crate::{UPLOADED_MARKER_SUFFIX, VIDEO_EXTENSIONS};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| {
            VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        })
}

/// Sidecar path marking `video` as already published.
pub fn uploaded_marker(video: &Path) -> PathBuf {
    let mut name = OsString::from(video.as_os_str());
    name.push(UPLOADED_MARKER_SUFFIX);
    PathBuf::from(name)
}

/// Videos in `videos_dir` that have not been published yet, sorted for
/// a deterministic processing order. A missing directory yields an
/// empty list.
pub fn pending_videos(videos_dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(videos_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut videos: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| is_video(p) && !uploaded_marker(p).exists())
        .collect();
    videos.sort();
    videos
}

/// Path of the caption file matching `video` inside `captions_dir`.
pub fn caption_path(video: &Path, captions_dir: &Path) -> PathBuf {
    let stem = video.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    captions_dir.join(format!("{}.txt", stem))
}

/// Caption text for a video: the matching caption file if present,
/// otherwise the generated default.
pub fn caption_for(video: &Path, captions_dir: &Path, account: &Account) -> String {
    match fs::read_to_string(caption_path(video, captions_dir)) {
        Ok(text) => text.trim().to_string(),
        Err(_) => default_caption(video, &account.default_tags),
    }
}

/// Generated fallback caption: marker glyph, video base name, and the
/// account's default tags.
pub fn default_caption(video: &Path, default_tags: &[String]) -> String {
    let name = video.file_stem().and_then(|s| s.to_str()).unwrap_or("video");
    format!("📱 {}\n\n{}", name, default_tags.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(dir: &Path) -> Account {
        Account {
            username: "alice".to_string(),
            password: "pw".to_string(),
            proxy: None,
            account_directory: dir.to_path_buf(),
            default_tags: vec!["#daily".to_string(), "#clip".to_string()],
        }
    }

    #[test]
    fn pending_videos_filters_extensions_and_uploaded_markers() {
        let dir = tempfile::tempdir().unwrap();
        let videos = dir.path();
        for name in ["a.mp4", "b.MOV", "c.avi", "d.mp4", "notes.txt"] {
            fs::write(videos.join(name), b"x").unwrap();
        }
        // d.mp4 has already been published.
        fs::write(videos.join("d.mp4.uploaded"), b"").unwrap();

        let found = pending_videos(videos);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.mp4", "b.MOV", "c.avi"]);
    }

    #[test]
    fn pending_videos_tolerates_missing_directory() {
        assert!(pending_videos(Path::new("/nonexistent/videos")).is_empty());
    }

    #[test]
    fn caption_for_prefers_the_caption_file() {
        let dir = tempfile::tempdir().unwrap();
        let captions = dir.path().join("captions");
        fs::create_dir(&captions).unwrap();
        fs::write(captions.join("clip.txt"), "A day at the beach\n").unwrap();

        let account = account(dir.path());
        let caption = caption_for(Path::new("videos/clip.mp4"), &captions, &account);
        assert_eq!(caption, "A day at the beach");
    }

    #[test]
    fn caption_for_falls_back_to_generated_default() {
        let dir = tempfile::tempdir().unwrap();
        let account = account(dir.path());
        let caption = caption_for(
            Path::new("videos/sunset.mp4"),
            &dir.path().join("captions"),
            &account,
        );
        assert_eq!(caption, "📱 sunset\n\n#daily #clip");
    }
}
