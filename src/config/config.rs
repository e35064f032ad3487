use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::countdown::countdown::POLL_INTERVAL_MS;
use crate::session::session::{POMODORO_BREAK_MINUTES, POMODORO_WORK_MINUTES};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub work_minutes: u32,
    pub break_minutes: u32,
    pub poll_interval_ms: u64,
    pub slideshow_interval_secs: u64,
    /// Endpoint for the best-effort session log POST.
    pub log_endpoint: String,
    /// Bind address of the daemon's WebSocket control server.
    pub ws_bind: String,
    /// Per-image decoded size cap, non-GIF.
    pub max_image_bytes: usize,
    /// GIFs are stored as-is and get a tighter cap.
    pub max_gif_bytes: usize,
    /// Serialized size the stored image set may occupy before eviction.
    pub storage_quota_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_minutes: POMODORO_WORK_MINUTES,
            break_minutes: POMODORO_BREAK_MINUTES,
            poll_interval_ms: POLL_INTERVAL_MS,
            slideshow_interval_secs: 60,
            log_endpoint: "http://localhost:8787/notion/log".into(),
            ws_bind: "127.0.0.1:8765".into(),
            max_image_bytes: 2_000_000,
            max_gif_bytes: 1_500_000,
            storage_quota_bytes: 5_000_000,
        }
    }
}

impl Config {
    /// Directory: ~/.config/focus_it/
    fn dir() -> PathBuf {
        let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("focus_it");
        p
    }

    fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from disk, returning defaults if file doesn't exist or is invalid.
    pub fn load() -> Self {
        let path = Self::path();
        match fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let dir = Self::dir();
        fs::create_dir_all(&dir)?;
        let data = serde_json::to_string_pretty(self)?;
        fs::write(Self::path(), data)?;
        Ok(())
    }
}
