use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

pub type FileRef = Arc<dyn FileHandle>;

/// A file or folder a job operates on.
///
/// Attribute lookups may hit the filesystem on every call; jobs wrap their
/// handles in [`CachedFile`] so repeated lookups stay cheap.
pub trait FileHandle: fmt::Debug + Send + Sync {
    fn path(&self) -> &Path;

    fn name(&self) -> String {
        self.path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path().to_string_lossy().into_owned())
    }

    fn exists(&self) -> bool;
    fn size(&self) -> u64;
    fn modified(&self) -> Option<SystemTime>;
    fn is_dir(&self) -> bool;
    fn parent(&self) -> Option<FileRef>;
    fn children(&self) -> io::Result<Vec<FileRef>>;

    fn is_cached(&self) -> bool {
        false
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn shared(path: impl Into<PathBuf>) -> FileRef {
        Arc::new(Self::new(path))
    }
}

impl FileHandle for LocalFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn exists(&self) -> bool {
        fs::symlink_metadata(&self.path).is_ok()
    }

    fn size(&self) -> u64 {
        fs::metadata(&self.path)
            .map(|metadata| metadata.len())
            .unwrap_or(0)
    }

    fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path)
            .and_then(|metadata| metadata.modified())
            .ok()
    }

    fn is_dir(&self) -> bool {
        fs::symlink_metadata(&self.path).is_ok_and(|metadata| metadata.is_dir())
    }

    fn parent(&self) -> Option<FileRef> {
        self.path.parent().map(Self::shared)
    }

    fn children(&self) -> io::Result<Vec<FileRef>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            children.push(Self::shared(entry?.path()));
        }
        children.sort_by(|left, right| left.path().cmp(right.path()));
        Ok(children)
    }
}

/// Memoizes the attributes of another handle for the lifetime of a job.
///
/// Cached values do not follow later changes to the underlying file.
/// Parents and children derived from a cached handle are cached as well.
#[derive(Debug)]
pub struct CachedFile {
    inner: FileRef,
    exists: OnceLock<bool>,
    size: OnceLock<u64>,
    modified: OnceLock<Option<SystemTime>>,
    is_dir: OnceLock<bool>,
    parent: OnceLock<Option<FileRef>>,
}

impl CachedFile {
    /// Returns `file` unchanged when it is already cached.
    pub fn wrap(file: FileRef) -> FileRef {
        if file.is_cached() {
            return file;
        }
        Arc::new(Self {
            inner: file,
            exists: OnceLock::new(),
            size: OnceLock::new(),
            modified: OnceLock::new(),
            is_dir: OnceLock::new(),
            parent: OnceLock::new(),
        })
    }

    pub fn inner(&self) -> &FileRef {
        &self.inner
    }
}

impl FileHandle for CachedFile {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn name(&self) -> String {
        self.inner.name()
    }

    fn exists(&self) -> bool {
        *self.exists.get_or_init(|| self.inner.exists())
    }

    fn size(&self) -> u64 {
        *self.size.get_or_init(|| self.inner.size())
    }

    fn modified(&self) -> Option<SystemTime> {
        *self.modified.get_or_init(|| self.inner.modified())
    }

    fn is_dir(&self) -> bool {
        *self.is_dir.get_or_init(|| self.inner.is_dir())
    }

    fn parent(&self) -> Option<FileRef> {
        self.parent
            .get_or_init(|| self.inner.parent().map(CachedFile::wrap))
            .clone()
    }

    // Listings are not memoized: jobs that delete or create entries need
    // fresh contents.
    fn children(&self) -> io::Result<Vec<FileRef>> {
        Ok(self
            .inner
            .children()?
            .into_iter()
            .map(CachedFile::wrap)
            .collect())
    }

    fn is_cached(&self) -> bool {
        true
    }
}

/// The ordered top-level targets of a job plus the folder they live in.
#[derive(Clone, Debug, Default)]
pub struct FileSet {
    base_folder: Option<FileRef>,
    files: Vec<FileRef>,
}

impl FileSet {
    pub fn new(base_folder: Option<FileRef>, files: Vec<FileRef>) -> Self {
        Self { base_folder, files }
    }

    pub fn from_paths<I, P>(base_folder: Option<PathBuf>, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            base_folder: base_folder.map(LocalFile::shared),
            files: paths.into_iter().map(LocalFile::shared).collect(),
        }
    }

    pub fn push(&mut self, file: FileRef) {
        self.files.push(file);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FileRef> {
        self.files.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRef> {
        self.files.iter()
    }

    pub fn base_folder(&self) -> Option<&FileRef> {
        self.base_folder.as_ref()
    }

    /// Wraps every element and the base folder in [`CachedFile`].
    pub fn cached(self) -> Self {
        Self {
            base_folder: self.base_folder.map(CachedFile::wrap),
            files: self.files.into_iter().map(CachedFile::wrap).collect(),
        }
    }
}
