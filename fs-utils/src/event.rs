//! Change events delivered to watch handlers.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A debounced change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEvent {
    /// The kind of event.
    pub kind: FileEventKind,

    /// Full path of the changed entry.
    pub path: PathBuf,

    /// When the notification was received.
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    /// Create a new file event stamped with the current time.
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Kind of file event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    /// Entry was created.
    Created,

    /// Entry contents changed.
    Modified,

    /// Entry was deleted.
    Deleted,

    /// Entry was renamed (old path).
    RenamedFrom,

    /// Entry was renamed (new path).
    RenamedTo,

    /// Entry metadata changed.
    MetadataChanged,

    /// Entry was accessed.
    Accessed,

    /// Unknown event type.
    Unknown,
}

impl From<notify::EventKind> for FileEventKind {
    fn from(kind: notify::EventKind) -> Self {
        use notify::event::{ModifyKind, RenameMode};

        match kind {
            notify::EventKind::Create(_) => Self::Created,
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Self::RenamedFrom,
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Self::RenamedTo,
            notify::EventKind::Modify(ModifyKind::Metadata(_)) => Self::MetadataChanged,
            notify::EventKind::Modify(_) => Self::Modified,
            notify::EventKind::Remove(_) => Self::Deleted,
            notify::EventKind::Access(_) => Self::Accessed,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind, RenameMode};
    use std::path::Path;

    #[test]
    fn test_file_event_creation() {
        let event = FileEvent::new(FileEventKind::Created, "/test/file.txt");
        assert_eq!(event.kind, FileEventKind::Created);
        assert_eq!(event.path, Path::new("/test/file.txt"));
    }

    #[test]
    fn test_kind_from_notify() {
        use notify::EventKind;

        assert_eq!(
            FileEventKind::from(EventKind::Create(CreateKind::File)),
            FileEventKind::Created
        );
        assert_eq!(
            FileEventKind::from(EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            FileEventKind::Modified
        );
        assert_eq!(
            FileEventKind::from(EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            FileEventKind::RenamedTo
        );
        assert_eq!(
            FileEventKind::from(EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            FileEventKind::Modified
        );
        assert_eq!(
            FileEventKind::from(EventKind::Modify(ModifyKind::Metadata(
                MetadataKind::Permissions
            ))),
            FileEventKind::MetadataChanged
        );
        assert_eq!(
            FileEventKind::from(EventKind::Remove(RemoveKind::Folder)),
            FileEventKind::Deleted
        );
        assert_eq!(FileEventKind::from(EventKind::Any), FileEventKind::Unknown);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FileEventKind::RenamedFrom).unwrap();
        assert_eq!(json, "\"renamed_from\"");
    }
}
