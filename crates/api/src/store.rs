//! On-disk storage for received alert media

use std::path::PathBuf;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

const SCREENSHOTS: &str = "screenshots";
const VIDEOS: &str = "videos";

/// Writes `<root>/screenshots/<ms>_<slot>_<alert>.jpg` and
/// `<root>/videos/<ms>_<slot>_<alert>.mjpeg`
#[derive(Debug, Clone)]
pub struct CaptureStore {
    root: PathBuf,
}

impl CaptureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.root.join(SCREENSHOTS)).await?;
        fs::create_dir_all(self.root.join(VIDEOS)).await
    }

    pub async fn save_snapshot(&self, media: MediaKey<'_>, data: &[u8]) -> std::io::Result<PathBuf> {
        self.write(SCREENSHOTS, media, "jpg", data).await
    }

    pub async fn save_video(&self, media: MediaKey<'_>, data: &[u8]) -> std::io::Result<PathBuf> {
        self.write(VIDEOS, media, "mjpeg", data).await
    }

    async fn write(&self, dir: &str, media: MediaKey<'_>, ext: &str, data: &[u8]) -> std::io::Result<PathBuf> {
        let dir = self.root.join(dir);
        fs::create_dir_all(&dir).await?;

        let path = dir.join(format!(
            "{}_{}_{}.{}",
            media.received_ms,
            file_label(media.slot),
            media.alert_id,
            ext
        ));
        fs::write(&path, data).await?;
        debug!("Stored {} bytes at {}", data.len(), path.display());
        Ok(path)
    }
}

/// Identifies the media of one received alert
#[derive(Debug, Clone, Copy)]
pub struct MediaKey<'a> {
    pub received_ms: i64,
    pub slot: &'a str,
    pub alert_id: Uuid,
}

/// Slot label safe to embed in a file name
fn file_label(slot: &str) -> String {
    let label: String = slot
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();
    if label.is_empty() {
        "unknown".to_string()
    } else {
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_label_sanitised() {
        assert_eq!(file_label("2"), "2");
        assert_eq!(file_label("../../etc/passwd"), "______etc_passwd");
        assert_eq!(file_label(""), "unknown");
    }

    #[tokio::test]
    async fn test_paths_follow_layout() {
        let root = std::env::temp_dir().join(format!("fallwatch-store-{}", uuid::Uuid::new_v4()));
        let store = CaptureStore::new(&root);
        store.ensure_dirs().await.unwrap();

        let alert_id = Uuid::nil();
        let media = MediaKey {
            received_ms: 1700000000000,
            slot: "3",
            alert_id,
        };
        let snapshot = store.save_snapshot(media, b"jpeg").await.unwrap();
        let video = store.save_video(media, b"mjpeg").await.unwrap();

        assert_eq!(
            snapshot,
            root.join(format!("screenshots/1700000000000_3_{}.jpg", alert_id))
        );
        assert_eq!(video, root.join(format!("videos/1700000000000_3_{}.mjpeg", alert_id)));
        assert_eq!(tokio::fs::read(&snapshot).await.unwrap(), b"jpeg");

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_same_millisecond_uploads_kept_apart() {
        let root = std::env::temp_dir().join(format!("fallwatch-store-{}", Uuid::new_v4()));
        let store = CaptureStore::new(&root);

        let first = MediaKey {
            received_ms: 1700000000000,
            slot: "1",
            alert_id: Uuid::new_v4(),
        };
        let second = MediaKey {
            alert_id: Uuid::new_v4(),
            ..first
        };
        let a = store.save_snapshot(first, b"first").await.unwrap();
        let b = store.save_snapshot(second, b"second").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(tokio::fs::read(&a).await.unwrap(), b"first");
        assert_eq!(tokio::fs::read(&b).await.unwrap(), b"second");

        tokio::fs::remove_dir_all(&root).await.ok();
    }
}
