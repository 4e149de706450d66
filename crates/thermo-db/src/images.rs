//! # Image Storage
//!
//! Snapshot and photo files kept next to the database.
//!
//! ## Layout
//! ```text
//! {images_dir}/
//! ├── persons/
//! │   └── 786777.jpeg                         ← registry photo, one per card
//! └── captures/
//!     └── 2020.11.27/                         ← one directory per day
//!         └── 08/                             ← one directory per hour
//!             └── 2020.11.27_08.15.02_786777.jpeg
//! ```
//!
//! The image reference stored in the measurement log is the path below
//! `captures/`, e.g. `2020.11.27/08/2020.11.27_08.15.02_786777.jpeg`.
//! Day directories make retention a directory delete.

use chrono::{NaiveDate, NaiveDateTime};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use thermo_core::CardNumber;

use crate::error::{DbError, DbResult};

const PERSONS_DIR: &str = "persons";
const CAPTURES_DIR: &str = "captures";
const DAY_FORMAT: &str = "%Y.%m.%d";

/// File-system store for kiosk snapshots and registry photos.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ImageStore { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // =========================================================================
    // Person Photos
    // =========================================================================

    /// Path of a card's photo.
    pub fn photo_path(&self, card: CardNumber) -> PathBuf {
        self.root
            .join(PERSONS_DIR)
            .join(format!("{}.jpeg", card.raw()))
    }

    /// Writes (or replaces) a card's photo.
    pub async fn save_photo(&self, card: CardNumber, bytes: &[u8]) -> DbResult<PathBuf> {
        let path = self.photo_path(card);
        write_file(&path, bytes).await?;
        debug!(card = %card, path = %path.display(), "Photo saved");
        Ok(path)
    }

    /// Reads a card's photo if one was saved.
    pub async fn read_photo(&self, card: CardNumber) -> DbResult<Option<Vec<u8>>> {
        read_optional(&self.photo_path(card)).await
    }

    // =========================================================================
    // Capture Snapshots
    // =========================================================================

    /// Image reference for a capture.
    pub fn capture_ref(captured_at: NaiveDateTime, card: CardNumber) -> String {
        format!(
            "{}/{}/{}_{}.jpeg",
            captured_at.format(DAY_FORMAT),
            captured_at.format("%H"),
            captured_at.format("%Y.%m.%d_%H.%M.%S"),
            card.raw()
        )
    }

    /// Absolute path of a capture reference.
    pub fn capture_path(&self, image_ref: &str) -> PathBuf {
        self.root.join(CAPTURES_DIR).join(image_ref)
    }

    /// True when `image_ref` is a relative path that stays below `captures/`.
    pub fn is_capture_ref(image_ref: &str) -> bool {
        !image_ref.is_empty()
            && Path::new(image_ref)
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
    }

    /// Reads a stored snapshot. `None` if it does not exist.
    pub async fn read_capture(&self, image_ref: &str) -> DbResult<Option<Vec<u8>>> {
        if !Self::is_capture_ref(image_ref) {
            return Err(DbError::InvalidRecord(format!("bad image reference {:?}", image_ref)));
        }
        read_optional(&self.capture_path(image_ref)).await
    }

    /// Writes a snapshot and returns its reference.
    ///
    /// A snapshot that already exists is left as is: kiosks occasionally
    /// re-announce the same file.
    pub async fn save_capture(
        &self,
        captured_at: NaiveDateTime,
        card: CardNumber,
        bytes: &[u8],
    ) -> DbResult<String> {
        let image_ref = Self::capture_ref(captured_at, card);
        let path = self.capture_path(&image_ref);

        if fs::try_exists(&path).await? {
            debug!(image_ref = %image_ref, "Snapshot already stored");
            return Ok(image_ref);
        }

        write_file(&path, bytes).await?;
        debug!(image_ref = %image_ref, bytes = bytes.len(), "Snapshot saved");
        Ok(image_ref)
    }

    /// Deletes every day directory strictly older than `cutoff`.
    ///
    /// Directories whose name is not a date are left alone.
    pub async fn prune_captures_before(&self, cutoff: NaiveDate) -> DbResult<usize> {
        let captures = self.root.join(CAPTURES_DIR);
        let mut entries = match fs::read_dir(&captures).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(day) = name
                .to_str()
                .and_then(|n| NaiveDate::parse_from_str(n, DAY_FORMAT).ok())
            else {
                warn!(entry = ?name, "Unexpected entry in captures directory");
                continue;
            };

            if day < cutoff {
                fs::remove_dir_all(entry.path()).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

async fn read_optional(path: &Path) -> DbResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> DbResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 15, 2)
            .unwrap()
    }

    #[test]
    fn test_capture_ref_layout() {
        let image_ref = ImageStore::capture_ref(at(2020, 11, 27, 8), CardNumber::from_raw(786777));
        assert_eq!(image_ref, "2020.11.27/08/2020.11.27_08.15.02_786777.jpeg");
    }

    #[tokio::test]
    async fn test_save_capture_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let card = CardNumber::from_raw(1);

        let first = store.save_capture(at(2021, 1, 5, 9), card, b"first").await.unwrap();
        let second = store.save_capture(at(2021, 1, 5, 9), card, b"second").await.unwrap();
        assert_eq!(first, second);

        let bytes = fs::read(store.capture_path(&first)).await.unwrap();
        assert_eq!(bytes, b"first");
    }

    #[tokio::test]
    async fn test_read_capture_rejects_paths_outside_captures() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let image_ref = store
            .save_capture(at(2021, 3, 4, 10), CardNumber::from_raw(8), b"jpeg")
            .await
            .unwrap();
        store.save_photo(CardNumber::from_raw(8), b"photo").await.unwrap();

        assert_eq!(store.read_capture(&image_ref).await.unwrap().unwrap(), b"jpeg");
        assert!(store.read_capture("2021.03.04/10/missing.jpeg").await.unwrap().is_none());

        for bad in ["", "../persons/8.jpeg", "2021.03.04/../../persons/8.jpeg", "/etc/passwd", "./x.jpeg"] {
            assert!(!ImageStore::is_capture_ref(bad), "{:?} accepted", bad);
            assert!(store.read_capture(bad).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_photo_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let card = CardNumber::from_raw(99);

        assert!(store.read_photo(card).await.unwrap().is_none());
        store.save_photo(card, b"jpeg").await.unwrap();
        assert_eq!(store.read_photo(card).await.unwrap().unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn test_prune_captures_before() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let card = CardNumber::from_raw(3);

        store.save_capture(at(2021, 1, 1, 8), card, b"old").await.unwrap();
        store.save_capture(at(2021, 1, 2, 8), card, b"old").await.unwrap();
        let kept = store.save_capture(at(2021, 2, 1, 8), card, b"new").await.unwrap();

        let removed = store
            .prune_captures_before(NaiveDate::from_ymd_opt(2021, 1, 15).unwrap())
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.capture_path(&kept).exists());
    }

    #[tokio::test]
    async fn test_prune_without_captures_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("missing"));
        let cutoff = NaiveDate::from_ymd_opt(2021, 1, 15).unwrap();
        assert_eq!(store.prune_captures_before(cutoff).await.unwrap(), 0);
    }
}
