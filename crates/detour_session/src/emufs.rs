//! Emulated filesystem.
//!
//! Files that existed during recording but are not available live are
//! backed by emulated files. Tasks hold the strong references, through the
//! descriptors that name them; the filesystem only indexes them, so an entry
//! disappears from [`EmuFs::size`] when the last task holding it goes away.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::{Rc, Weak};

/// Identity of a recorded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileKey {
    /// Device number
    pub device: u64,
    /// Inode number
    pub inode: u64,
}

impl FileKey {
    /// Create a key
    #[must_use]
    pub const fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.inode)
    }
}

/// An emulated file
#[derive(Debug, PartialEq, Eq)]
pub struct EmuFile {
    key: FileKey,
    name: String,
    size: u64,
}

impl EmuFile {
    /// Identity of the recorded file
    #[must_use]
    pub fn key(&self) -> FileKey {
        self.key
    }

    /// Path the file was recorded under
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Index of live emulated files
#[derive(Debug, Default)]
pub struct EmuFs {
    files: IndexMap<FileKey, Weak<EmuFile>>,
}

impl EmuFs {
    /// Create an empty filesystem
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The live file for `key`, creating it if no task references one
    pub fn get_or_create(&mut self, key: FileKey, name: &str, size: u64) -> Rc<EmuFile> {
        if let Some(file) = self.find(key) {
            return file;
        }
        let file = Rc::new(EmuFile {
            key,
            name: name.to_string(),
            size,
        });
        self.files.insert(key, Rc::downgrade(&file));
        file
    }

    /// The live file for `key`, if any
    #[must_use]
    pub fn find(&self, key: FileKey) -> Option<Rc<EmuFile>> {
        self.files.get(&key).and_then(Weak::upgrade)
    }

    /// Number of files still referenced
    #[must_use]
    pub fn size(&self) -> usize {
        self.files.values().filter(|f| f.strong_count() > 0).count()
    }

    /// Number of entries held, including ones no task references
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.files.len()
    }

    /// Forget entries no task references any more
    pub fn gc(&mut self) {
        self.files.retain(|_, f| f.strong_count() > 0);
    }
}
