//! File operations that create missing parent directories on demand.
//!
//! Every operation comes in two forms: an `async` method running on tokio's
//! filesystem API and a `_blocking` method running on `std::fs`. Text is
//! always UTF-8.

use std::path::{Component, Path, PathBuf};

use futures::FutureExt;
use futures::future::BoxFuture;
use regex::{NoExpand, Regex};
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::FsConfig;
use crate::error::{FsError, Result};

/// Filesystem helpers configured by [`FsConfig`].
#[derive(Debug, Clone, Default)]
pub struct FileOps {
    config: FsConfig,
}

impl FileOps {
    /// Create file operations with the given configuration.
    pub fn new(config: FsConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// Whether `path` can be stat-ed. Any failure counts as absent.
    pub async fn exists(&self, path: impl AsRef<Path>) -> bool {
        fs::metadata(path.as_ref()).await.is_ok()
    }

    /// Blocking variant of [`FileOps::exists`].
    pub fn exists_blocking(&self, path: impl AsRef<Path>) -> bool {
        std::fs::metadata(path.as_ref()).is_ok()
    }

    /// Create `path` and every missing ancestor, one component at a time.
    pub async fn mkdir(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut current = PathBuf::new();
        for component in path.as_ref().components() {
            current.push(component);
            if !matches!(component, Component::Normal(_)) || self.exists(&current).await {
                continue;
            }

            self.trace("mkdir", &current);
            let mut builder = fs::DirBuilder::new();
            #[cfg(unix)]
            builder.mode(self.config.dir_mode);
            tolerate_existing(builder.create(&current).await)?;
        }
        Ok(())
    }

    /// Blocking variant of [`FileOps::mkdir`].
    pub fn mkdir_blocking(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut current = PathBuf::new();
        for component in path.as_ref().components() {
            current.push(component);
            if !matches!(component, Component::Normal(_)) || self.exists_blocking(&current) {
                continue;
            }

            self.trace("mkdir", &current);
            let mut builder = std::fs::DirBuilder::new();
            #[cfg(unix)]
            std::os::unix::fs::DirBuilderExt::mode(&mut builder, self.config.dir_mode);
            tolerate_existing(builder.create(&current))?;
        }
        Ok(())
    }

    /// Copy the bytes of `src` to `dest`, creating `dest`'s parent.
    pub async fn copy(&self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<()> {
        let (src, dest) = (src.as_ref(), dest.as_ref());
        self.trace("copy", src);

        let bytes = fs::read(src).await?;
        self.ensure_parent(dest).await?;
        fs::write(dest, bytes).await?;
        Ok(())
    }

    /// Blocking variant of [`FileOps::copy`].
    pub fn copy_blocking(&self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<()> {
        let (src, dest) = (src.as_ref(), dest.as_ref());
        self.trace("copy", src);

        let bytes = std::fs::read(src)?;
        self.ensure_parent_blocking(dest)?;
        std::fs::write(dest, bytes)?;
        Ok(())
    }

    /// Link `dest` to `src`. Returns `false` without linking when `src` is
    /// missing.
    pub async fn symlink(&self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<bool> {
        let (src, dest) = (src.as_ref(), dest.as_ref());
        self.ensure_parent(dest).await?;
        if !self.exists(src).await {
            debug!("Not linking {}: source missing", src.display());
            return Ok(false);
        }

        self.trace("symlink", dest);
        #[cfg(unix)]
        fs::symlink(src, dest).await?;
        #[cfg(windows)]
        if fs::metadata(src).await?.is_dir() {
            fs::symlink_dir(src, dest).await?;
        } else {
            fs::symlink_file(src, dest).await?;
        }
        Ok(true)
    }

    /// Blocking variant of [`FileOps::symlink`].
    pub fn symlink_blocking(&self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<bool> {
        let (src, dest) = (src.as_ref(), dest.as_ref());
        self.ensure_parent_blocking(dest)?;
        if !self.exists_blocking(src) {
            debug!("Not linking {}: source missing", src.display());
            return Ok(false);
        }

        self.trace("symlink", dest);
        #[cfg(unix)]
        std::os::unix::fs::symlink(src, dest)?;
        #[cfg(windows)]
        if std::fs::metadata(src)?.is_dir() {
            std::os::windows::fs::symlink_dir(src, dest)?;
        } else {
            std::os::windows::fs::symlink_file(src, dest)?;
        }
        Ok(true)
    }

    /// Read `path` as UTF-8 text.
    pub async fn read(&self, path: impl AsRef<Path>) -> Result<String> {
        self.trace("read", path.as_ref());
        Ok(fs::read_to_string(path.as_ref()).await?)
    }

    /// Blocking variant of [`FileOps::read`].
    pub fn read_blocking(&self, path: impl AsRef<Path>) -> Result<String> {
        self.trace("read", path.as_ref());
        Ok(std::fs::read_to_string(path.as_ref())?)
    }

    /// Read `path` and parse it as JSON.
    pub async fn read_json<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> Result<T> {
        let text = self.read(path).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Blocking variant of [`FileOps::read_json`].
    pub fn read_json_blocking<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> Result<T> {
        let text = self.read_blocking(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write `contents` to `path`, replacing it and creating its parent.
    pub async fn write(&self, path: impl AsRef<Path>, contents: &str) -> Result<()> {
        let path = path.as_ref();
        self.ensure_parent(path).await?;
        self.trace("write", path);
        fs::write(path, contents).await?;
        Ok(())
    }

    /// Blocking variant of [`FileOps::write`].
    pub fn write_blocking(&self, path: impl AsRef<Path>, contents: &str) -> Result<()> {
        let path = path.as_ref();
        self.ensure_parent_blocking(path)?;
        self.trace("write", path);
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Append `contents` to `path`, creating the file and its parent.
    pub async fn append(&self, path: impl AsRef<Path>, contents: &str) -> Result<()> {
        let path = path.as_ref();
        self.ensure_parent(path).await?;
        self.trace("append", path);

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Blocking variant of [`FileOps::append`].
    pub fn append_blocking(&self, path: impl AsRef<Path>, contents: &str) -> Result<()> {
        use std::io::Write;

        let path = path.as_ref();
        self.ensure_parent_blocking(path)?;
        self.trace("append", path);

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    /// Rewrite `path`, replacing every match of each pattern with its value.
    ///
    /// Patterns are regular expressions applied in iteration order, each one
    /// to the output of the previous. Values are inserted literally.
    pub async fn replace<I, K, V>(&self, path: impl AsRef<Path>, mapping: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let path = path.as_ref();
        let source = self.read(path).await?;
        let replaced = substitute(source, mapping)?;
        self.write(path, &replaced).await
    }

    /// Blocking variant of [`FileOps::replace`].
    pub fn replace_blocking<I, K, V>(&self, path: impl AsRef<Path>, mapping: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let path = path.as_ref();
        let source = self.read_blocking(path)?;
        let replaced = substitute(source, mapping)?;
        self.write_blocking(path, &replaced)
    }

    /// Remove `path` and everything beneath it without following links.
    /// Returns whether `path` existed.
    pub async fn rmdir(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let Ok(metadata) = fs::symlink_metadata(path).await else {
            return Ok(false);
        };

        self.trace("rmdir", path);
        if metadata.is_dir() {
            remove_tree(path.to_path_buf()).await?;
        } else {
            remove_link_or_file(path).await?;
        }
        Ok(true)
    }

    /// Blocking variant of [`FileOps::rmdir`].
    pub fn rmdir_blocking(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        if std::fs::symlink_metadata(path).is_err() {
            return Ok(false);
        }

        self.trace("rmdir", path);
        let walker = WalkDir::new(path)
            .contents_first(true)
            .follow_links(false)
            .follow_root_links(false);

        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_dir() {
                std::fs::remove_dir(entry.path())?;
            } else {
                remove_link_or_file_blocking(entry.path())?;
            }
        }
        Ok(true)
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        match parent_of(path) {
            Some(parent) if !self.exists(parent).await => self.mkdir(parent).await,
            _ => Ok(()),
        }
    }

    fn ensure_parent_blocking(&self, path: &Path) -> Result<()> {
        match parent_of(path) {
            Some(parent) if !self.exists_blocking(parent) => self.mkdir_blocking(parent),
            _ => Ok(()),
        }
    }

    fn trace(&self, op: &str, path: &Path) {
        if self.config.debug {
            debug!("{op} {}", path.display());
        }
    }
}

fn parent_of(path: &Path) -> Option<&Path> {
    path.parent().filter(|parent| !parent.as_os_str().is_empty())
}

/// A directory that appeared between the existence check and the create
/// call is not an error.
fn tolerate_existing(result: std::io::Result<()>) -> Result<()> {
    match result {
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e.into()),
        Ok(()) => Ok(()),
    }
}

fn substitute<I, K, V>(mut source: String, mapping: I) -> Result<String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    for (pattern, value) in mapping {
        let pattern = pattern.as_ref();
        let regex = Regex::new(pattern).map_err(|e| FsError::invalid_pattern(pattern, e))?;
        source = regex
            .replace_all(&source, NoExpand(value.as_ref()))
            .into_owned();
    }
    Ok(source)
}

fn remove_tree(dir: PathBuf) -> BoxFuture<'static, Result<()>> {
    async move {
        let mut listing = fs::read_dir(&dir).await?;
        while let Some(child) = listing.next_entry().await? {
            let path = child.path();
            let file_type = child.file_type().await?;
            if file_type.is_dir() && !file_type.is_symlink() {
                remove_tree(path).await?;
            } else {
                remove_link_or_file(&path).await?;
            }
        }
        fs::remove_dir(&dir).await?;
        Ok(())
    }
    .boxed()
}

async fn remove_link_or_file(path: &Path) -> Result<()> {
    #[cfg(windows)]
    if fs::remove_dir(path).await.is_ok() {
        return Ok(());
    }
    fs::remove_file(path).await?;
    Ok(())
}

fn remove_link_or_file_blocking(path: &Path) -> Result<()> {
    #[cfg(windows)]
    if std::fs::remove_dir(path).is_ok() {
        return Ok(());
    }
    std::fs::remove_file(path)?;
    Ok(())
}
