// Copyright 2026 The Cimreader Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements the page mapping layer of a CIM repository.
//!
//! The two paged files of a repository (the index binary tree and the
//! objects data file) never reference their pages directly. Instead the
//! data structures name *logical* page numbers, and a mappings file
//! (`*.map`) translates each logical page number into the *physical*
//! page number whose file offset is `physical × 8192`. The sentinel
//! `0xffffffff` marks a logical page with no backing physical page.
//!
//! A mappings file is a contiguous record: a signed header, the primary
//! page-number table, a secondary table whose semantics are unknown (it
//! is parsed only to advance past it), and a signed footer. A single
//! physical file may hold two such records back to back, the objects
//! record first; [`MappingFile::data_size`] reports how many bytes a
//! record consumed so that the caller can parse the next one at that
//! offset.
//!
//! Repositories with generation-aware mappings store the records in
//! `Mapping<N>.map` files, with the active generation `N` named by the
//! first four bytes of `Mapping.ver`. [`current_mapping`] implements
//! that selection.

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

use cursor::{Cursor, ReadError};
use log::warn;
use std::fs::File;
use std::io;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The sentinel physical page number marking an unallocated
/// logical page.
///
pub const UNALLOCATED_PAGE: u32 = 0xffff_ffff;

/// The signature opening a mappings record.
const HEADER_SIGNATURE: u32 = 0x0000_abcd;

/// The signature closing a mappings record.
const FOOTER_SIGNATURE: u32 = 0x0000_dcba;

/// The number of mapping file generations probed when no
/// `Mapping.ver` file names the active one.
const FALLBACK_GENERATIONS: u32 = 3;

/// Indicates an error encountered while parsing a mappings file.
///
#[derive(Debug, Error)]
pub enum MappingError {
    /// The file could not be opened.
    #[error("failed to open {path:?}: {source}")]
    Open {
        /// The path that could not be opened.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The underlying source could not be read.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The record did not open with the expected header signature.
    #[error("bad mappings header signature 0x{found:08x} at offset 0x{offset:08x}")]
    HeaderSignature {
        /// The offset of the record.
        offset: u64,
        /// The signature found instead of `0x0000abcd`.
        found: u32,
    },

    /// The record did not close with the expected footer signature.
    #[error("bad mappings footer signature 0x{found:08x} at offset 0x{offset:08x}")]
    FooterSignature {
        /// The offset of the footer.
        offset: u64,
        /// The signature found instead of `0x0000dcba`.
        found: u32,
    },

    /// No usable mapping file was found in the repository
    /// directory.
    #[error("no usable mapping file in {path:?}")]
    NoCurrentMapping {
        /// The repository directory that was searched.
        path: PathBuf,
    },
}

/// A parsed mappings record, translating logical page numbers
/// into physical page numbers.
///
#[derive(Debug)]
pub struct MappingFile {
    format_version: u32,
    number_of_pages: u32,
    mappings: Vec<u32>,
    data_size: u64,
}

impl MappingFile {
    /// Parses the mappings record at the start of the given file.
    ///
    pub fn open(path: &Path) -> Result<Self, MappingError> {
        MappingFile::open_at(path, 0)
    }

    /// Parses the mappings record at the given offset of the
    /// given file.
    ///
    /// Passing the [`data_size`](MappingFile::data_size) of a
    /// record parsed at offset 0 reads the second of two
    /// back-to-back records.
    ///
    pub fn open_at(path: &Path, file_offset: u64) -> Result<Self, MappingError> {
        let file = File::open(path).map_err(|source| MappingError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut cursor = Cursor::new(file);
        MappingFile::read(&mut cursor, file_offset)
    }

    /// Parses a mappings record at the given offset of a
    /// seekable byte source.
    ///
    pub fn read<R: Read + Seek>(
        cursor: &mut Cursor<R>,
        file_offset: u64,
    ) -> Result<Self, MappingError> {
        cursor.seek_to(file_offset)?;

        let signature = cursor.read_u32_le()?;
        if signature != HEADER_SIGNATURE {
            return Err(MappingError::HeaderSignature {
                offset: file_offset,
                found: signature,
            });
        }

        let format_version = cursor.read_u32_le()?;
        let number_of_pages = cursor.read_u32_le()?;

        let mappings = read_page_number_table(cursor)?;

        // The secondary table's semantics are unknown. It is
        // parsed only so the cursor lands on the footer.
        let _ = read_page_number_table(cursor)?;

        let footer_offset = cursor.position();
        let signature = cursor.read_u32_le()?;
        if signature != FOOTER_SIGNATURE {
            return Err(MappingError::FooterSignature {
                offset: footer_offset,
                found: signature,
            });
        }

        let data_size = cursor.position() - file_offset;

        Ok(MappingFile {
            format_version,
            number_of_pages,
            mappings,
            data_size,
        })
    }

    /// Resolves a logical page number to a physical page number.
    ///
    /// Returns `None` if the logical page number is outside the
    /// mapping table or maps to [`UNALLOCATED_PAGE`].
    ///
    pub fn resolve(&self, logical: u32) -> Option<u32> {
        self.mappings
            .get(logical as usize)
            .copied()
            .filter(|&physical| physical != UNALLOCATED_PAGE)
    }

    /// Returns the number of entries in the mapping table.
    ///
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Returns whether the mapping table is empty.
    ///
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Returns the number of bytes the record consumed,
    /// including the header and footer.
    ///
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Returns the format version declared in the record header.
    ///
    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    /// Returns the number of pages declared in the record header.
    ///
    pub fn number_of_pages(&self) -> u32 {
        self.number_of_pages
    }
}

/// Reads a page-number table: a `u32` entry count followed by
/// that many `u32` page numbers.
///
fn read_page_number_table<R: Read + Seek>(
    cursor: &mut Cursor<R>,
) -> Result<Vec<u32>, MappingError> {
    let count = cursor.read_u32_le()?;

    let mut entries = Vec::with_capacity(count.min(0x0010_0000) as usize);
    for _ in 0..count {
        entries.push(cursor.read_u32_le()?);
    }

    Ok(entries)
}

/// Returns the path of the directory entry whose name matches
/// the given name case-insensitively, if any.
///
/// When several entries match, the lexicographically smallest
/// path wins, so the choice does not depend on directory
/// enumeration order.
///
pub fn find_file(directory: &Path, name: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(directory).ok()?;

    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|file_name| file_name.eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
        .map(|entry| entry.path())
        .collect();

    matches.sort();
    matches.into_iter().next()
}

/// Selects and parses the repository's current mapping file,
/// returning the objects mappings record and the index mappings
/// record it contains, in that order.
///
/// If a `Mapping.ver` file exists, its first four bytes name the
/// active generation `N` and `Mapping<N>.map` must parse.
/// Otherwise `Mapping1.map` through `Mapping3.map` are probed in
/// order and the first file whose records both parse cleanly is
/// used; candidates that fail to parse are skipped with a
/// warning. All file name matches are case-insensitive.
///
pub fn current_mapping(directory: &Path) -> Result<(MappingFile, MappingFile), MappingError> {
    if let Some(ver_path) = find_file(directory, "mapping.ver") {
        let file = File::open(&ver_path).map_err(|source| MappingError::Open {
            path: ver_path.clone(),
            source,
        })?;

        let generation = Cursor::new(file).read_u32_le()?;
        let name = format!("mapping{}.map", generation);

        let path = find_file(directory, &name).ok_or_else(|| MappingError::NoCurrentMapping {
            path: directory.to_path_buf(),
        })?;

        return read_mapping_pair(&path);
    }

    for generation in 1..=FALLBACK_GENERATIONS {
        let name = format!("mapping{}.map", generation);
        let path = match find_file(directory, &name) {
            Some(path) => path,
            None => continue,
        };

        match read_mapping_pair(&path) {
            Ok(pair) => return Ok(pair),
            Err(err) => {
                warn!("skipping mapping file {}: {}", path.display(), err);
            }
        }
    }

    Err(MappingError::NoCurrentMapping {
        path: directory.to_path_buf(),
    })
}

/// Parses the two back-to-back mappings records of a mapping
/// file: the objects record at offset 0, then the index record.
///
fn read_mapping_pair(path: &Path) -> Result<(MappingFile, MappingFile), MappingError> {
    let objects = MappingFile::open(path)?;
    let index = MappingFile::open_at(path, objects.data_size())?;

    Ok((objects, index))
}
