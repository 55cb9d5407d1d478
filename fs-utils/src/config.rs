//! Configuration types for file operations and directory watching.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::matcher::{FileMatch, IntoFileMatch};

/// Permission bits used when creating directories (`rwxr-xr-x`).
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Default debounce window for change notifications.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Configuration for [`crate::FileOps`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsConfig {
    /// Mode applied to directories created by `mkdir` and friends.
    pub dir_mode: u32,

    /// Emit a trace event for every filesystem call.
    pub debug: bool,
}

impl FsConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            dir_mode: DEFAULT_DIR_MODE,
            debug: false,
        }
    }

    /// Set the directory creation mode.
    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    /// Enable per-call tracing.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Default for FsConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for a single tree scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Root that relative paths are computed against. Defaults to the
    /// directory the scan starts in.
    pub root_dir: Option<PathBuf>,

    /// Leave directory entries out of the results.
    pub skip_dirs: bool,

    /// Leave file entries out of the results.
    pub skip_files: bool,

    /// Subtrees whose full path matches are neither listed nor descended into.
    pub ignore: Option<FileMatch>,

    /// Emit a trace event for every visited entry.
    pub debug: bool,
}

impl ScanOptions {
    /// Create empty scan options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor relative paths to `root`.
    pub fn with_root_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root.into());
        self
    }

    /// Omit directories from the results.
    pub fn skip_dirs(mut self) -> Self {
        self.skip_dirs = true;
        self
    }

    /// Omit files from the results.
    pub fn skip_files(mut self) -> Self {
        self.skip_files = true;
        self
    }

    /// Ignore subtrees matching `matcher`.
    pub fn with_ignore(mut self, matcher: FileMatch) -> Self {
        self.ignore = Some(matcher);
        self
    }

    /// Ignore subtrees matching a glob, a glob list, or a compiled matcher.
    pub fn with_ignore_globs(self, ignore: impl IntoFileMatch) -> Result<Self> {
        Ok(self.with_ignore(ignore.into_file_match()?))
    }

    /// Enable per-entry tracing.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Configuration for [`crate::DirWatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce window per watched directory, in milliseconds.
    pub debounce_ms: u64,

    /// Capacity of the channel between the notifier thread and the handler task.
    pub channel_capacity: usize,

    /// Emit a trace event for every raw notification.
    pub debug: bool,
}

impl WatchConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            channel_capacity: 1000,
            debug: false,
        }
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Enable per-notification tracing.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// The debounce window as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fs_config_defaults() {
        let config = FsConfig::default();
        assert_eq!(config.dir_mode, 0o755);
        assert!(!config.debug);
    }

    #[test]
    fn test_watch_config_builder() {
        let config = WatchConfig::new()
            .with_debounce(Duration::from_millis(250))
            .with_channel_capacity(16)
            .with_debug(true);

        assert_eq!(config.debounce(), Duration::from_millis(250));
        assert_eq!(config.channel_capacity, 16);
        assert!(config.debug);
    }

    #[test]
    fn test_watch_config_deserialize() {
        let config: WatchConfig =
            serde_json::from_str(r#"{"debounce_ms": 100, "channel_capacity": 8, "debug": false}"#)
                .unwrap();
        assert_eq!(config.debounce(), Duration::from_millis(100));
    }

    #[test]
    fn test_debounce_saturates() {
        let config = WatchConfig::new().with_debounce(Duration::MAX);
        assert_eq!(config.debounce_ms, u64::MAX);
    }

    #[test]
    fn test_scan_options_ignore_globs() {
        let options = ScanOptions::new()
            .with_ignore_globs(["node_modules", "*.tmp"])
            .unwrap();
        let ignore = options.ignore.unwrap();
        assert!(ignore.test("/repo/node_modules"));
        assert!(ignore.test("/repo/a.tmp"));
        assert!(!ignore.test("/repo/src"));

        let single = ScanOptions::new().with_ignore_globs("sub").unwrap();
        assert!(single.ignore.unwrap().test("/repo/sub"));
    }

    #[test]
    fn test_scan_options_builder() {
        let options = ScanOptions::new().with_root_dir("/srv").skip_dirs();
        assert_eq!(options.root_dir, Some(PathBuf::from("/srv")));
        assert!(options.skip_dirs);
        assert!(!options.skip_files);
        assert!(options.ignore.is_none());
    }
}
