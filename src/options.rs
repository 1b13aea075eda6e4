//! Startup option table built during the control-channel handshake.
//!
//! The supervisor sends one `<key>: <value>` line per option after the
//! header ack. Keys are unique with last-write-wins on duplicates; the table
//! is built once during the `READING_OPTIONS` phase and is immutable
//! afterwards, with the single exception of the derived `socket_path` key
//! the installer writes back while binding.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::{AppError, Result};

/// Option key naming the application's base directory.
pub const KEY_APP_ROOT: &str = "app_root";
/// Option key naming the entry module inside `app_root`.
pub const KEY_STARTUP_FILE: &str = "startup_file";
/// Option key naming the supervisor's socket generation directory.
pub const KEY_GENERATION_DIR: &str = "generation_dir";
/// Option key overriding the maximum socket path length.
pub const KEY_UNIX_PATH_MAX: &str = "UNIX_PATH_MAX";
/// Derived key recording the bound socket path.
pub const KEY_SOCKET_PATH: &str = "socket_path";

/// Entry module name used when the supervisor sends no `startup_file`.
pub const DEFAULT_STARTUP_FILE: &str = "app.js";
/// Socket path length cap used when the supervisor sends no `UNIX_PATH_MAX`.
pub const DEFAULT_UNIX_PATH_MAX: usize = 100;

/// Configuration key/value pairs received from the supervisor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsTable {
    entries: HashMap<String, String>,
}

impl OptionsTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key/value pair. Duplicate keys overwrite the earlier value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Parse one `<key>: <value>` option line and insert it.
    ///
    /// The key is everything before the first colon with trailing spaces
    /// trimmed; the value is everything after it with leading spaces trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when the line contains no colon.
    pub fn insert_line(&mut self, line: &str) -> Result<()> {
        let (raw_key, raw_value) = line
            .split_once(':')
            .ok_or_else(|| AppError::Protocol(format!("malformed option line: {line:?}")))?;
        self.insert(
            raw_key.trim_end_matches(' '),
            raw_value.trim_start_matches(' '),
        );
        Ok(())
    }

    /// Look up an option value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of stored options.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all key/value pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    // ── Typed accessors ──────────────────────────────────────────────────────

    /// Application base directory, when the supervisor sent one.
    #[must_use]
    pub fn app_root(&self) -> Option<&str> {
        self.get(KEY_APP_ROOT)
    }

    /// Entry module name; [`DEFAULT_STARTUP_FILE`] when absent.
    #[must_use]
    pub fn startup_file(&self) -> &str {
        self.get(KEY_STARTUP_FILE).unwrap_or(DEFAULT_STARTUP_FILE)
    }

    /// Resolved startup path: `app_root` joined with `startup_file`.
    ///
    /// Relative to the process working directory when no `app_root` was sent.
    #[must_use]
    pub fn startup_path(&self) -> PathBuf {
        let mut path = self.app_root().map(PathBuf::from).unwrap_or_default();
        path.push(self.startup_file());
        path
    }

    /// Supervisor-designated socket generation directory, when configured.
    #[must_use]
    pub fn generation_dir(&self) -> Option<&str> {
        self.get(KEY_GENERATION_DIR)
    }

    /// Maximum socket path length in characters.
    ///
    /// Unparsable values fall back to [`DEFAULT_UNIX_PATH_MAX`].
    #[must_use]
    pub fn unix_path_max(&self) -> usize {
        self.get(KEY_UNIX_PATH_MAX)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_UNIX_PATH_MAX)
    }

    /// Bound socket path recorded by the installer, once binding has started.
    #[must_use]
    pub fn socket_path(&self) -> Option<&str> {
        self.get(KEY_SOCKET_PATH)
    }

    /// Record the active socket path candidate.
    pub fn set_socket_path(&mut self, path: impl Into<String>) {
        self.insert(KEY_SOCKET_PATH, path.into());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
