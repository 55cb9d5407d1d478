//! Debounced directory watching.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::{ScanOptions, WatchConfig};
use crate::error::{FsError, Result};
use crate::event::{FileEvent, FileEventKind};
use crate::matcher::FileMatch;
use crate::scanner::{ScanEntry, scan, scan_blocking};

/// Watches a snapshot of a directory tree and forwards debounced events.
///
/// The tree is scanned once when the watch starts; every directory found
/// gets its own non-recursive subscription. Directories created later are
/// not picked up. Dropping the watcher ends all subscriptions.
pub struct DirWatcher {
    /// Canonical root of the watched tree.
    root: PathBuf,

    /// Directories with an active subscription.
    watched: Vec<PathBuf>,

    /// Internal notify watcher.
    _watcher: RecommendedWatcher,

    /// Delivers events to the handler.
    worker: Worker,
}

enum Worker {
    Task(tokio::task::JoinHandle<()>),
    Thread(std::thread::JoinHandle<()>),
}

impl DirWatcher {
    /// Scan `dir` and watch every directory in it.
    ///
    /// `handler` runs on a tokio task, once per debounce window per watched
    /// directory. Must be called from within a tokio runtime.
    pub async fn watch<F>(
        dir: impl AsRef<Path>,
        matcher: Option<&FileMatch>,
        config: WatchConfig,
        handler: F,
    ) -> Result<Self>
    where
        F: FnMut(FileEvent) + Send + 'static,
    {
        let dir = dir.as_ref();
        let root = resolve_root(dir, fs::canonicalize(dir).await)?;
        ensure_dir(&root, fs::metadata(&root).await)?;

        let options = ScanOptions::new().with_debug(config.debug);
        let entries = scan(&root, matcher, &options).await?;
        let (watcher, mut rx, watched) = subscribe(&root, &entries, &config)?;

        let mut dispatcher = Dispatcher::new(&watched, &config, handler);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                dispatcher.dispatch(event);
            }
            debug!("Watch channel closed");
        });

        info!("Watching {} directories under {}", watched.len(), root.display());
        Ok(Self {
            root,
            watched,
            _watcher: watcher,
            worker: Worker::Task(task),
        })
    }

    /// Blocking variant of [`DirWatcher::watch`]. The handler runs on a
    /// dedicated thread, so no runtime is required.
    pub fn watch_blocking<F>(
        dir: impl AsRef<Path>,
        matcher: Option<&FileMatch>,
        config: WatchConfig,
        handler: F,
    ) -> Result<Self>
    where
        F: FnMut(FileEvent) + Send + 'static,
    {
        let dir = dir.as_ref();
        let root = resolve_root(dir, std::fs::canonicalize(dir))?;
        ensure_dir(&root, std::fs::metadata(&root))?;

        let options = ScanOptions::new().with_debug(config.debug);
        let entries = scan_blocking(&root, matcher, &options)?;
        let (watcher, mut rx, watched) = subscribe(&root, &entries, &config)?;

        let mut dispatcher = Dispatcher::new(&watched, &config, handler);
        let thread = std::thread::Builder::new()
            .name("fs-utils-watch".to_string())
            .spawn(move || {
                while let Some(event) = rx.blocking_recv() {
                    dispatcher.dispatch(event);
                }
                debug!("Watch channel closed");
            })?;

        info!("Watching {} directories under {}", watched.len(), root.display());
        Ok(Self {
            root,
            watched,
            _watcher: watcher,
            worker: Worker::Thread(thread),
        })
    }

    /// Canonical root of the watched tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directories with an active subscription, root first.
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Whether the handler worker is still alive.
    pub fn is_running(&self) -> bool {
        match &self.worker {
            Worker::Task(task) => !task.is_finished(),
            Worker::Thread(thread) => !thread.is_finished(),
        }
    }

    /// Stop watching. Equivalent to dropping the watcher.
    pub fn stop(self) {
        info!("Stopped watching {}", self.root.display());
    }
}

fn resolve_root(dir: &Path, canonical: std::io::Result<PathBuf>) -> Result<PathBuf> {
    match canonical {
        Ok(root) => Ok(root),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(FsError::DirectoryNotFound(dir.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

fn ensure_dir(root: &Path, metadata: std::io::Result<std::fs::Metadata>) -> Result<()> {
    if metadata?.is_dir() {
        Ok(())
    } else {
        Err(FsError::NotADirectory(root.to_path_buf()))
    }
}

type Subscription = (
    RecommendedWatcher,
    mpsc::Receiver<FileEvent>,
    Vec<PathBuf>,
);

/// Register a non-recursive watch on `root` and every directory entry.
fn subscribe(root: &Path, entries: &[ScanEntry], config: &WatchConfig) -> Result<Subscription> {
    let (event_tx, event_rx) = mpsc::channel(config.channel_capacity.max(1));
    let debug_events = config.debug;

    let mut watcher = notify::recommended_watcher(
        move |res: std::result::Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                let kind = FileEventKind::from(event.kind);
                for path in event.paths {
                    if debug_events {
                        debug!("Raw notification {kind:?} for {}", path.display());
                    }
                    if let Err(e) = event_tx.blocking_send(FileEvent::new(kind, path)) {
                        error!("Failed to send file event: {e}");
                    }
                }
            }
            Err(e) => {
                error!("Watch error: {e}");
            }
        },
    )?;

    let watched: Vec<PathBuf> = std::iter::once(root.to_path_buf())
        .chain(
            entries
                .iter()
                .filter(|entry| entry.is_dir)
                .map(|entry| entry.path.clone()),
        )
        .collect();

    for dir in &watched {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        debug!("Started watching: {}", dir.display());
    }

    Ok((watcher, event_rx, watched))
}

/// Collapses bursts of notifications into one per window per key.
#[derive(Debug)]
pub(crate) struct Debouncer {
    window: Duration,
    open_until: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            open_until: HashMap::new(),
        }
    }

    /// Returns `true` if a notification for `key` at `now` should go through,
    /// opening a new window for it.
    pub(crate) fn admit(&mut self, key: &Path, now: Instant) -> bool {
        if let Some(until) = self.open_until.get(key) {
            if now < *until {
                return false;
            }
        }
        self.open_until.insert(key.to_path_buf(), now + self.window);
        true
    }
}

/// Owns the handler and the debounce state for one watch.
struct Dispatcher<F> {
    watched: HashSet<PathBuf>,
    debouncer: Debouncer,
    handler: F,
    debug: bool,
}

impl<F: FnMut(FileEvent)> Dispatcher<F> {
    fn new(watched: &[PathBuf], config: &WatchConfig, handler: F) -> Self {
        Self {
            watched: watched.iter().cloned().collect(),
            debouncer: Debouncer::new(config.debounce()),
            handler,
            debug: config.debug,
        }
    }

    fn dispatch(&mut self, event: FileEvent) {
        let owner = self.owner(&event.path).to_path_buf();
        if !self.debouncer.admit(&owner, Instant::now()) {
            if self.debug {
                debug!("Debounced {:?} for {}", event.kind, event.path.display());
            }
            return;
        }
        (self.handler)(event);
    }

    /// The watched directory a notification belongs to: the parent when it
    /// is watched, else the path itself.
    fn owner<'a>(&self, path: &'a Path) -> &'a Path {
        match path.parent() {
            Some(parent) if self.watched.contains(parent) => parent,
            _ => path,
        }
    }
}
