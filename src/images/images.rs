use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::fs;
use std::path::PathBuf;

const LEGACY_IMAGE_FILE: &str = "background.image"; // old single-image entry, read-only
const IMAGES_FILE: &str = "background.images.json"; // current entry, JSON array of data URIs

/// What happened to a batch of added images.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AddReport {
    pub stored: usize,
    pub rejected: usize,
    pub evicted: usize,
}

/// Persistent rotating set of background images, stored as data-URI strings
/// in a JSON array on disk. Oversized or malformed items are rejected one by
/// one; when the serialized set outgrows the quota, the oldest entries are
/// evicted until it fits again.
pub struct ImageStore {
    dir: PathBuf,
    images: Vec<String>,
    max_image_bytes: usize,
    max_gif_bytes: usize,
    quota_bytes: usize,
}

impl ImageStore {
    /// Directory: ~/.local/share/focus_it/
    pub fn default_dir() -> PathBuf {
        let mut p = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("focus_it");
        p
    }

    pub fn open(
        dir: PathBuf,
        max_image_bytes: usize,
        max_gif_bytes: usize,
        quota_bytes: usize,
    ) -> Self {
        let images = load_images(&dir);
        ImageStore {
            dir,
            images,
            max_image_bytes,
            max_gif_bytes,
            quota_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Append a batch. Each item is validated independently; a bad item is
    /// skipped with a warning and the rest proceed.
    pub fn add(&mut self, blobs: Vec<String>) -> AddReport {
        let mut report = AddReport::default();
        for blob in blobs {
            match validate_data_uri(&blob, self.max_image_bytes, self.max_gif_bytes) {
                Ok(()) => {
                    self.images.push(blob);
                    report.stored += 1;
                }
                Err(reason) => {
                    log::warn!("Rejected image: {reason}");
                    report.rejected += 1;
                }
            }
        }
        report.evicted = self.save_with_eviction();
        report
    }

    /// Remove everything, the legacy entry included.
    pub fn clear(&mut self) {
        self.images.clear();
        let _ = fs::remove_file(self.dir.join(LEGACY_IMAGE_FILE));
        let _ = fs::remove_file(self.dir.join(IMAGES_FILE));
    }

    pub fn pick_random(&self) -> Option<&str> {
        if self.images.is_empty() {
            return None;
        }
        let mut buf = [0u8; 8];
        let index = match getrandom::fill(&mut buf) {
            Ok(()) => (u64::from_ne_bytes(buf) % self.images.len() as u64) as usize,
            Err(e) => {
                log::warn!("Random source unavailable: {e}");
                0
            }
        };
        self.images.get(index).map(String::as_str)
    }

    /// Evict oldest-first until the serialized set fits the quota (or the
    /// store is empty), then persist. Returns how many were evicted.
    fn save_with_eviction(&mut self) -> usize {
        let mut evicted = 0;
        while !self.images.is_empty() && self.serialized_len() > self.quota_bytes {
            self.images.remove(0);
            evicted += 1;
        }
        if let Err(e) = self.persist() {
            log::error!("Failed to persist image set: {e}");
        }
        evicted
    }

    fn serialized_len(&self) -> usize {
        serde_json::to_string(&self.images)
            .map(|json| json.len())
            .unwrap_or(0)
    }

    fn persist(&self) -> Result<(), Box<dyn std::error::Error>> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string(&self.images)?;
        fs::write(self.dir.join(IMAGES_FILE), json)?;
        Ok(())
    }
}

fn load_images(dir: &std::path::Path) -> Vec<String> {
    match fs::read_to_string(dir.join(IMAGES_FILE)) {
        Ok(json) => serde_json::from_str(&json).unwrap_or_default(),
        // One-way migration: the legacy single-image entry is read here and
        // never written back.
        Err(_) => match fs::read_to_string(dir.join(LEGACY_IMAGE_FILE)) {
            Ok(legacy) if !legacy.trim().is_empty() => vec![legacy.trim().to_string()],
            _ => Vec::new(),
        },
    }
}

fn validate_data_uri(
    blob: &str,
    max_image_bytes: usize,
    max_gif_bytes: usize,
) -> Result<(), String> {
    let rest = blob.strip_prefix("data:").ok_or("not a data URI")?;
    let (header, payload) = rest.split_once(',').ok_or("missing payload")?;
    let mime = header.split(';').next().unwrap_or_default();
    if !mime.starts_with("image/") {
        return Err(format!("unsupported media type {mime:?}"));
    }
    if !header.ends_with(";base64") {
        return Err("payload is not base64-encoded".into());
    }
    let decoded = BASE64
        .decode(payload.as_bytes())
        .map_err(|e| format!("bad base64 payload: {e}"))?;
    let limit = if mime.eq_ignore_ascii_case("image/gif") {
        max_gif_bytes
    } else {
        max_image_bytes
    };
    if decoded.len() > limit {
        return Err(format!(
            "image too large ({} bytes, limit {limit})",
            decoded.len()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!(
            "focus_it_test_{}_{}",
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::SeqCst)
        ))
    }

    fn data_uri(mime: &str, payload_len: usize) -> String {
        let bytes = vec![0xAB; payload_len];
        format!("data:{mime};base64,{}", BASE64.encode(&bytes))
    }

    #[test]
    fn test_add_and_reload() {
        let dir = temp_dir();
        let mut store = ImageStore::open(dir.clone(), 2_000_000, 1_500_000, 5_000_000);
        let report = store.add(vec![data_uri("image/png", 100), data_uri("image/jpeg", 200)]);
        assert_eq!(report, AddReport { stored: 2, rejected: 0, evicted: 0 });
        assert_eq!(store.len(), 2);

        let reopened = ImageStore::open(dir.clone(), 2_000_000, 1_500_000, 5_000_000);
        assert_eq!(reopened.len(), 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_oversized_image_leaves_set_unchanged() {
        let dir = temp_dir();
        let mut store = ImageStore::open(dir.clone(), 1_000, 1_500_000, 5_000_000);
        store.add(vec![data_uri("image/png", 500)]);

        let report = store.add(vec![data_uri("image/png", 2_000)]);
        assert_eq!(report.stored, 0);
        assert_eq!(report.rejected, 1);
        assert_eq!(store.len(), 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_gif_gets_its_own_cap() {
        let dir = temp_dir();
        let mut store = ImageStore::open(dir.clone(), 10_000, 1_000, 5_000_000);
        let report = store.add(vec![
            data_uri("image/gif", 2_000),
            data_uri("image/png", 2_000),
        ]);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.stored, 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_malformed_items_rejected_per_item() {
        let dir = temp_dir();
        let mut store = ImageStore::open(dir.clone(), 2_000_000, 1_500_000, 5_000_000);
        let report = store.add(vec![
            "nonsense".to_string(),
            "data:text/plain;base64,aGVsbG8=".to_string(),
            "data:image/png;base64,!!!not-base64!!!".to_string(),
            "data:image/png,unencoded".to_string(),
            data_uri("image/png", 64),
        ]);
        assert_eq!(report.stored, 1);
        assert_eq!(report.rejected, 4);
        assert_eq!(store.len(), 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_quota_evicts_oldest_first_and_reports_count() {
        let dir = temp_dir();
        // Each entry serializes to a bit over 140 bytes; quota fits two.
        let mut store = ImageStore::open(dir.clone(), 2_000_000, 1_500_000, 320);
        let first = data_uri("image/png", 80);
        store.add(vec![first.clone()]);
        store.add(vec![data_uri("image/jpeg", 80)]);
        let report = store.add(vec![data_uri("image/jpeg", 80)]);

        assert_eq!(report.stored, 1);
        assert_eq!(report.evicted, 1);
        assert_eq!(store.len(), 2);
        // The first-added entry is the one that went.
        assert!(store.images.iter().all(|blob| *blob != first));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_legacy_single_image_migrates_on_load() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        let legacy = data_uri("image/png", 32);
        fs::write(dir.join(LEGACY_IMAGE_FILE), &legacy).unwrap();

        let store = ImageStore::open(dir.clone(), 2_000_000, 1_500_000, 5_000_000);
        assert_eq!(store.len(), 1);
        assert_eq!(store.pick_random(), Some(legacy.as_str()));
        // Migration is read-only: the legacy entry is still there, untouched.
        assert_eq!(fs::read_to_string(dir.join(LEGACY_IMAGE_FILE)).unwrap(), legacy);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_clear_removes_both_entries() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(LEGACY_IMAGE_FILE), data_uri("image/png", 16)).unwrap();
        let mut store = ImageStore::open(dir.clone(), 2_000_000, 1_500_000, 5_000_000);
        store.add(vec![data_uri("image/png", 16)]);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.pick_random(), None);
        assert!(!dir.join(LEGACY_IMAGE_FILE).exists());
        assert!(!dir.join(IMAGES_FILE).exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_pick_random_returns_a_member() {
        let dir = temp_dir();
        let mut store = ImageStore::open(dir.clone(), 2_000_000, 1_500_000, 5_000_000);
        assert_eq!(store.pick_random(), None);
        store.add(vec![data_uri("image/png", 8), data_uri("image/png", 9)]);
        let picked = store.pick_random().unwrap().to_string();
        assert!(store.images.iter().any(|blob| *blob == picked));
        let _ = fs::remove_dir_all(&dir);
    }
}
