//! # Filesystem Utilities
//!
//! Small filesystem helpers used across Codex: file operations that create
//! parent directories on demand, glob matching, depth-first tree scans and
//! debounced directory watching.
//!
//! Every operation exists in an `async` form and a `_blocking` form.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Filesystem Utilities                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  glob list ──► FileMatch ──► scan() ──► DirWatcher ──► handler  │
//! │                                 │            │                  │
//! │                                 ▼            ▼                  │
//! │                           Vec<ScanEntry>  FileEvent             │
//! │                                                                 │
//! │  FileOps: copy / read / write / append / replace / rmdir ...    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod matcher;
pub mod ops;
pub mod scanner;
pub mod watcher;

pub use config::{FsConfig, ScanOptions, WatchConfig};
pub use error::{FsError, Result};
pub use event::{FileEvent, FileEventKind};
pub use matcher::{FileMatch, IntoFileMatch, compile};
pub use ops::FileOps;
pub use scanner::{ScanEntry, scan, scan_blocking};
pub use watcher::DirWatcher;
