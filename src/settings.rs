//! Monitor configuration and its SQLite-backed settings store.
//!
//! Every timing constant of the engine lives in [`MonitorConfig`]. Overrides
//! are kept in a `config` table inside `settings.db` in the data directory,
//! seeded with the defaults (and a description of each key) on first open.

use crate::error::Result;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Default port of the local status API.
pub const DEFAULT_PORT: u16 = 13234;

pub const SETTINGS_FILE_NAME: &str = "settings.db";

/// Seeded rows: (key, default value, description).
const DEFAULTS: &[(&str, &str, &str)] = &[
    ("flush_interval_secs", "60", "Flush / predict cycle length (seconds)"),
    ("unfocus_threshold_secs", "300", "Sustained unfocus before an intervention (seconds)"),
    ("focus_score_threshold", "0.5", "Scores below this count as unfocused"),
    ("keyboard_session_timeout_ms", "1000", "Idle gap that closes a keyboard session (milliseconds)"),
    ("mouse_move_throttle_ms", "500", "Minimum spacing of sampled mouse moves (milliseconds)"),
    ("window_poll_interval_ms", "2000", "Active window polling interval (milliseconds)"),
    ("gaze_poll_interval_ms", "300", "Gaze sampling interval (milliseconds)"),
    ("survey_initial_delay_secs", "1800", "Wait before the first focus survey (seconds)"),
    ("survey_interval_secs", "3600", "Wait between focus surveys (seconds)"),
    ("survey_max_sessions", "15", "Focus surveys per run before prompting stops"),
    ("survey_check_interval_secs", "60", "How often the survey loop checks if a survey is due (seconds)"),
    ("typing_poll_interval_ms", "500", "Poll interval while waiting for typing to stop (milliseconds)"),
    ("focus_label_threshold", "5", "Survey levels above this label a session as focused"),
    ("backend_url", "", "Activity log backend base URL (empty disables upload)"),
    ("server_port", "13234", "Local status API port (0 disables the server)"),
];

/// Timing, threshold and location settings for one monitor run.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub flush_interval: Duration,
    pub unfocus_threshold: Duration,
    pub focus_score_threshold: f64,
    pub keyboard_session_timeout: Duration,
    pub mouse_move_throttle: Duration,
    pub window_poll_interval: Duration,
    pub gaze_poll_interval: Duration,
    pub survey_initial_delay: Duration,
    pub survey_interval: Duration,
    pub survey_max_sessions: u32,
    pub survey_check_interval: Duration,
    pub typing_poll_interval: Duration,
    pub focus_label_threshold: u8,
    pub data_dir: PathBuf,
    pub backend_url: Option<String>,
    pub server_port: u16,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(60),
            unfocus_threshold: Duration::from_secs(300),
            focus_score_threshold: 0.5,
            keyboard_session_timeout: Duration::from_secs(1),
            mouse_move_throttle: Duration::from_millis(500),
            window_poll_interval: Duration::from_secs(2),
            gaze_poll_interval: Duration::from_millis(300),
            survey_initial_delay: Duration::from_secs(30 * 60),
            survey_interval: Duration::from_secs(60 * 60),
            survey_max_sessions: 15,
            survey_check_interval: Duration::from_secs(60),
            typing_poll_interval: Duration::from_millis(500),
            focus_label_threshold: 5,
            data_dir: default_data_dir(),
            backend_url: None,
            server_port: DEFAULT_PORT,
        }
    }
}

impl MonitorConfig {
    /// Builds a config from the store, falling back to defaults for missing
    /// or unparsable keys.
    pub fn from_store(store: &SettingsStore, data_dir: impl Into<PathBuf>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, fallback: Duration| {
            parsed::<u64>(store, key).map_or(fallback, Duration::from_secs)
        };
        let millis = |key: &str, fallback: Duration| {
            parsed::<u64>(store, key).map_or(fallback, Duration::from_millis)
        };

        Self {
            flush_interval: secs("flush_interval_secs", defaults.flush_interval),
            unfocus_threshold: secs("unfocus_threshold_secs", defaults.unfocus_threshold),
            focus_score_threshold: parsed(store, "focus_score_threshold")
                .unwrap_or(defaults.focus_score_threshold),
            keyboard_session_timeout: millis(
                "keyboard_session_timeout_ms",
                defaults.keyboard_session_timeout,
            ),
            mouse_move_throttle: millis("mouse_move_throttle_ms", defaults.mouse_move_throttle),
            window_poll_interval: millis("window_poll_interval_ms", defaults.window_poll_interval),
            gaze_poll_interval: millis("gaze_poll_interval_ms", defaults.gaze_poll_interval),
            survey_initial_delay: secs("survey_initial_delay_secs", defaults.survey_initial_delay),
            survey_interval: secs("survey_interval_secs", defaults.survey_interval),
            survey_max_sessions: parsed(store, "survey_max_sessions")
                .unwrap_or(defaults.survey_max_sessions),
            survey_check_interval: secs(
                "survey_check_interval_secs",
                defaults.survey_check_interval,
            ),
            typing_poll_interval: millis("typing_poll_interval_ms", defaults.typing_poll_interval),
            focus_label_threshold: parsed(store, "focus_label_threshold")
                .unwrap_or(defaults.focus_label_threshold),
            data_dir: data_dir.into(),
            backend_url: store
                .get("backend_url")
                .ok()
                .flatten()
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            server_port: parsed(store, "server_port").unwrap_or(defaults.server_port),
        }
    }
}

fn parsed<T: FromStr>(store: &SettingsStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(value) => value?,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read setting, using default");
            return None;
        }
    };

    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Unparsable setting, using default");
            None
        }
    }
}

/// Returns the default data directory (`<data_dir>/focusmon`).
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("focusmon")
}

/// Key/value settings persisted in SQLite.
pub struct SettingsStore {
    conn: Mutex<Connection>,
}

impl SettingsStore {
    /// Opens or creates `settings.db` in `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| crate::error::MonitorError::persistence(data_dir, e))?;

        let db_path = data_dir.join(SETTINGS_FILE_NAME);
        tracing::info!(path = ?db_path, "Opening settings store");

        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                description TEXT,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;

        // Seed missing keys only, so upgrades add new settings without
        // clobbering user overrides.
        let now = Utc::now().to_rfc3339();
        let mut seeded = 0;
        for (key, value, description) in DEFAULTS {
            seeded += conn.execute(
                "INSERT OR IGNORE INTO config (key, value, description, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![key, value, description, &now],
            )?;
        }
        if seeded > 0 {
            tracing::info!(count = seeded, "Added default config settings");
        }

        Ok(())
    }

    /// Gets a configuration value by key.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        match conn.query_row(
            "SELECT value FROM config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        ) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Sets a configuration value, inserting the key if it is new.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, &now],
        )?;
        Ok(())
    }

    /// Gets all config settings as (key, value, description).
    pub fn all(&self) -> Result<Vec<(String, String, Option<String>)>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare("SELECT key, value, description FROM config ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_seeded() {
        let store = SettingsStore::open_in_memory().unwrap();
        let all = store.all().unwrap();
        assert_eq!(all.len(), DEFAULTS.len());
        assert_eq!(
            store.get("flush_interval_secs").unwrap().as_deref(),
            Some("60")
        );
    }

    #[test]
    fn test_config_from_seeded_store_matches_default() {
        let store = SettingsStore::open_in_memory().unwrap();
        let config = MonitorConfig::from_store(&store, "/tmp/focusmon-test");
        let defaults = MonitorConfig::default();

        assert_eq!(config.flush_interval, defaults.flush_interval);
        assert_eq!(config.unfocus_threshold, defaults.unfocus_threshold);
        assert_eq!(config.keyboard_session_timeout, defaults.keyboard_session_timeout);
        assert_eq!(config.gaze_poll_interval, defaults.gaze_poll_interval);
        assert_eq!(config.survey_initial_delay, Duration::from_secs(1800));
        assert_eq!(config.survey_max_sessions, 15);
        assert_eq!(config.server_port, DEFAULT_PORT);
        assert!(config.backend_url.is_none());
        assert_eq!(config.data_dir, PathBuf::from("/tmp/focusmon-test"));
    }

    #[test]
    fn test_override_and_bad_value_fallback() {
        let store = SettingsStore::open_in_memory().unwrap();
        store.set("flush_interval_secs", "30").unwrap();
        store.set("survey_max_sessions", "not-a-number").unwrap();
        store.set("backend_url", "http://localhost:5000").unwrap();

        let config = MonitorConfig::from_store(&store, ".");
        assert_eq!(config.flush_interval, Duration::from_secs(30));
        assert_eq!(config.survey_max_sessions, 15);
        assert_eq!(config.backend_url.as_deref(), Some("http://localhost:5000"));
    }

    #[test]
    fn test_reseed_keeps_overrides() {
        let store = SettingsStore::open_in_memory().unwrap();
        store.set("unfocus_threshold_secs", "120").unwrap();
        store.init_schema().unwrap();
        assert_eq!(
            store.get("unfocus_threshold_secs").unwrap().as_deref(),
            Some("120")
        );
    }

    #[test]
    fn test_unknown_key_is_none() {
        let store = SettingsStore::open_in_memory().unwrap();
        assert!(store.get("nope").unwrap().is_none());
    }
}
