// Input Catalog
// Prepared input files of a parameter set, used as the workflow's replica catalog

use crate::error::{ServiceError, ServiceResult};
use crate::workflow::models::FileRef;

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

/// The files present in a parameter set's input directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputCatalog {
    dir: PathBuf,
    files: BTreeSet<String>,
}

impl InputCatalog {
    /// Catalog the regular files directly inside `dir`
    pub fn scan(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        let mut files = BTreeSet::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    files.insert(name.to_string());
                }
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
        })
    }

    /// Build a catalog from known file names without touching the filesystem
    pub fn from_files<I, S>(dir: impl Into<PathBuf>, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dir: dir.into(),
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains(name)
    }

    /// All cataloged files, sorted by name
    pub fn files(&self) -> Vec<FileRef> {
        self.files.iter().map(FileRef::new).collect()
    }

    /// Physical location of a cataloged file
    pub fn pfn(&self, file: &FileRef) -> PathBuf {
        self.dir.join(file.lfn())
    }

    /// Look up a file the workflow depends on
    pub fn require(&self, name: &str, workflow: &str) -> ServiceResult<FileRef> {
        if self.contains(name) {
            Ok(FileRef::new(name))
        } else {
            Err(ServiceError::MissingInput {
                workflow: workflow.to_string(),
                file: name.to_string(),
                dir: self.dir.clone(),
            })
        }
    }
}
