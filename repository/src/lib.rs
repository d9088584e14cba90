// Copyright 2026 The Cimreader Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements read-only access to a WMI CIM repository.
//!
//! A CIM repository is a directory of paged binary files holding
//! class definitions, instance records and registrations, keyed by a
//! hierarchical namespace. Four files matter here, discovered by
//! case-insensitive name: the index binary tree (`Index.btr`) and its
//! mappings file (`Index.map`), and the objects data file
//! (`Objects.data`) and its mappings file (`Objects.map`).
//! Repositories without the bare mapping files carry generation-aware
//! `Mapping<N>.map` files instead, selected through `Mapping.ver`.
//!
//! [`CimRepository`] binds the four files together and exposes the
//! two core operations: enumerating every key in the repository, and
//! retrieving the raw record bytes a key points at. Decoding a
//! record's internal structure is left to the caller.
//!
//! ```no_run
//! use repository::CimRepository;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), repository::OpenError> {
//! let mut repository = CimRepository::open(Path::new("Repository"))?;
//! let keys: Vec<String> = repository.keys().collect();
//! for key in keys {
//!     if let Some(record) = repository.record_by_key(&key) {
//!         println!("{}: {} ({} bytes)", key, record.data_type, record.data.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(clippy::float_arithmetic)]
#![deny(clippy::missing_panics_doc)]
#![deny(clippy::panic)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(deprecated_in_future)]
#![deny(keyword_idents)]
#![deny(macro_use_extern_crate)]
#![deny(missing_abi)]
#![forbid(unsafe_code)]
#![deny(unused_crate_dependencies)]

use btree::{IndexFile, PageError};
use log::debug;
use objects::{ObjectsFile, RecordError};
use pagemap::{MappingError, MappingFile};
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use btree::Keys;
pub use objects::ObjectRecord;

/// Indicates an error encountered while opening a CIM
/// repository.
///
#[derive(Debug, Error)]
pub enum OpenError {
    /// A required repository file is missing.
    #[error("no file named {name} in {path:?}")]
    MissingFile {
        /// The repository directory.
        path: PathBuf,
        /// The name that was searched for, case-insensitively.
        name: &'static str,
    },

    /// A mappings file could not be parsed.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// The index binary-tree file could not be opened.
    #[error(transparent)]
    Index(#[from] PageError),

    /// The objects data file could not be opened.
    #[error(transparent)]
    Objects(#[from] RecordError),
}

/// A read-only CIM repository.
///
#[derive(Debug)]
pub struct CimRepository {
    index: IndexFile<File>,
    objects: ObjectsFile<File>,
}

impl CimRepository {
    /// Opens the CIM repository in the given directory.
    ///
    /// When bare `Index.map` and `Objects.map` files are both
    /// present they provide the page mappings; otherwise the
    /// current `Mapping<N>.map` generation is selected, through
    /// `Mapping.ver` if present. Structural failures in any of
    /// the four files abort the open.
    ///
    pub fn open(path: &Path) -> Result<Self, OpenError> {
        let index_mapping_path = pagemap::find_file(path, "index.map");
        let objects_mapping_path = pagemap::find_file(path, "objects.map");

        let (objects_mapping, index_mapping) = match (objects_mapping_path, index_mapping_path) {
            (Some(objects_path), Some(index_path)) => {
                debug!("reading mappings: {}", objects_path.display());
                let objects_mapping = MappingFile::open(&objects_path)?;

                debug!("reading mappings: {}", index_path.display());
                let index_mapping = MappingFile::open(&index_path)?;

                (objects_mapping, index_mapping)
            }
            _ => {
                debug!("no bare mapping files, selecting the current generation");
                pagemap::current_mapping(path)?
            }
        };

        let index_path = find_required(path, "Index.btr")?;
        debug!("reading index binary tree: {}", index_path.display());
        let index = IndexFile::open(&index_path, index_mapping)?;

        let objects_path = find_required(path, "Objects.data")?;
        debug!("reading objects data: {}", objects_path.display());
        let objects = ObjectsFile::open(&objects_path, objects_mapping)?;

        Ok(CimRepository { index, objects })
    }

    /// Returns an iterator over every key in the repository.
    ///
    /// Keys are yielded in index document order, depth-first.
    /// The sequence is finite and deterministic; invoking `keys`
    /// again starts a fresh enumeration.
    ///
    pub fn keys(&mut self) -> Keys<'_, File> {
        self.index.keys()
    }

    /// Retrieves the object record named by the given key, or
    /// `None`, with a warning, if the key does not resolve to a
    /// readable record.
    ///
    pub fn record_by_key(&mut self, key: &str) -> Option<ObjectRecord> {
        self.objects.record_by_key(key)
    }

    /// Closes the repository, releasing all four file handles.
    ///
    pub fn close(self) {}
}

/// Returns the path matching the given name case-insensitively,
/// or an error naming the missing file.
///
fn find_required(path: &Path, name: &'static str) -> Result<PathBuf, OpenError> {
    pagemap::find_file(path, name).ok_or_else(|| OpenError::MissingFile {
        path: path.to_path_buf(),
        name,
    })
}
