// Copyright 2026 The Cimreader Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements the index binary tree (`Index.btr`) of a CIM repository.
//!
//! The index is a B-tree over fixed 8192-byte pages. Each page carries
//! its keys as sequences of indices into a per-page string table, so a
//! key such as `\NS_1\ROOT\CIMV2` is stored once per page as segment
//! indices plus a value blob of NUL-terminated ASCII strings. Child
//! pages are named by logical page numbers, which resolve to physical
//! pages through the index mappings file.
//!
//! The tree's entry point is indirect as well: logical page 0 is the
//! administrative page, and its `root_page_number` field names the
//! logical page holding the root of the tree.
//!
//! [`IndexPage::read`] decodes a single page. [`IndexFile`] binds a
//! page source to its mappings file and exposes [`IndexFile::keys`],
//! a depth-first iterator over every key in the tree.

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

use byteorder::{ByteOrder, LittleEndian};
use cursor::{Cursor, ReadError};
use log::warn;
use pagemap::MappingFile;
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The size of an index page in bytes.
///
pub const PAGE_SIZE: usize = 8192;

/// The separator between the segments of a reconstructed key.
///
pub const KEY_SEPARATOR: char = '\\';

const PAGE_TYPE_ACTIVE: u32 = 0xaccc;
const PAGE_TYPE_ADMINISTRATIVE: u32 = 0xaddd;
const PAGE_TYPE_DELETED: u32 = 0xbadd;

/// The child page number sentinels meaning "no child".
const NO_CHILD: [u32; 2] = [0, 0xffff_ffff];

/// The type of an index page.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// An active page, carrying live keys.
    Active,

    /// The administrative page naming the root of the tree.
    Administrative,

    /// A deleted page. Its content parses but is no longer live.
    Deleted,

    /// A page type this implementation does not know.
    Unknown(u32),
}

impl From<u32> for PageType {
    fn from(page_type: u32) -> Self {
        match page_type {
            PAGE_TYPE_ACTIVE => PageType::Active,
            PAGE_TYPE_ADMINISTRATIVE => PageType::Administrative,
            PAGE_TYPE_DELETED => PageType::Deleted,
            other => PageType::Unknown(other),
        }
    }
}

/// Indicates an error encountered while decoding an index page.
///
#[derive(Debug, Error)]
pub enum PageError {
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

    /// A structure within the page extends past the page
    /// boundary.
    #[error("page at 0x{page_offset:08x}: {what} extends past the page boundary at byte {at}")]
    Overrun {
        /// The file offset of the page.
        page_offset: u64,
        /// The structure being decoded.
        what: &'static str,
        /// The byte offset within the page where decoding stopped.
        at: usize,
    },

    /// A key offset points outside the page's key data blob.
    #[error("page at 0x{page_offset:08x}: key {index} at word offset {offset} is outside the key data")]
    KeyOutOfRange {
        /// The file offset of the page.
        page_offset: u64,
        /// The key's index in the key offsets table.
        index: usize,
        /// The key's offset in 16-bit words.
        offset: u16,
    },

    /// A key segment names a value index the page does not have.
    #[error("page at 0x{page_offset:08x}: key {index} segment {segment} is outside the value table of {values} entries")]
    SegmentOutOfRange {
        /// The file offset of the page.
        page_offset: u64,
        /// The key's index in the key offsets table.
        index: usize,
        /// The out-of-range segment value.
        segment: u16,
        /// The number of entries in the value table.
        values: usize,
    },

    /// A value offset points outside the page's value data blob.
    #[error("page at 0x{page_offset:08x}: value {index} at byte offset {offset} is outside the value data")]
    ValueOutOfRange {
        /// The file offset of the page.
        page_offset: u64,
        /// The value's index in the value offsets table.
        index: usize,
        /// The value's byte offset into the value data.
        offset: u16,
    },

    /// A value is not a NUL-terminated ASCII string.
    #[error("page at 0x{page_offset:08x}: value {index} at byte offset {offset} is not NUL-terminated ASCII")]
    ValueString {
        /// The file offset of the page.
        page_offset: u64,
        /// The value's index in the value offsets table.
        index: usize,
        /// The value's byte offset into the value data.
        offset: u16,
    },
}

/// A decoded index binary-tree page.
///
#[derive(Debug, Clone)]
pub struct IndexPage {
    /// The page's type tag.
    pub page_type: PageType,

    /// The logical page number the page records for itself.
    pub mapped_page_number: u32,

    /// The logical page number of the tree's root page. Only
    /// meaningful on the administrative page.
    pub root_page_number: u32,

    /// The page's keys, reconstructed in document order. Each
    /// key starts with `\` and joins its segments with `\`.
    pub keys: Vec<String>,

    /// The logical page numbers of the page's children, in array
    /// order, with "no child" sentinels removed.
    pub sub_pages: Vec<u32>,
}

/// A bounds-checked reader over one page's bytes.
///
/// All offsets in errors are relative to the page, with the
/// page's file offset carried alongside.
struct PageReader<'data> {
    page: &'data [u8],
    position: usize,
    page_offset: u64,
}

impl<'data> PageReader<'data> {
    fn new(page: &'data [u8], page_offset: u64) -> Self {
        PageReader {
            page,
            position: 0,
            page_offset,
        }
    }

    fn take(&mut self, count: usize, what: &'static str) -> Result<&'data [u8], PageError> {
        let end = self.position.checked_add(count).filter(|&end| end <= self.page.len());
        match end {
            Some(end) => {
                let slice = &self.page[self.position..end];
                self.position = end;
                Ok(slice)
            }
            None => Err(PageError::Overrun {
                page_offset: self.page_offset,
                what,
                at: self.position,
            }),
        }
    }

    fn read_u16(&mut self, what: &'static str) -> Result<u16, PageError> {
        Ok(LittleEndian::read_u16(self.take(2, what)?))
    }

    fn read_u32(&mut self, what: &'static str) -> Result<u32, PageError> {
        Ok(LittleEndian::read_u32(self.take(4, what)?))
    }
}

impl IndexPage {
    /// Reads and decodes the index page at the given file offset.
    ///
    /// The full 8192-byte page is consumed; bytes past the
    /// decoded structures are ignored.
    ///
    pub fn read<R: Read + Seek>(
        cursor: &mut Cursor<R>,
        file_offset: u64,
    ) -> Result<Self, PageError> {
        cursor.seek_to(file_offset)?;

        let mut page = vec![0u8; PAGE_SIZE];
        cursor.read_exact(&mut page)?;

        IndexPage::decode(&page, file_offset)
    }

    /// Decodes an index page from its raw bytes.
    ///
    fn decode(page: &[u8], page_offset: u64) -> Result<Self, PageError> {
        let mut reader = PageReader::new(page, page_offset);

        let page_type = PageType::from(reader.read_u32("page header")?);
        let mapped_page_number = reader.read_u32("page header")?;
        let _unknown1 = reader.read_u32("page header")?;
        let root_page_number = reader.read_u32("page header")?;
        let number_of_keys = reader.read_u32("page header")? as usize;

        // An array of number_of_keys u32 values follows the
        // header. Its semantics are unknown; it is consumed only
        // to land on the child pointer array.
        if number_of_keys > 0 {
            reader.take(number_of_keys.saturating_mul(4), "unknown array")?;
        }

        let mut sub_pages = Vec::with_capacity(number_of_keys + 1);
        for _ in 0..number_of_keys + 1 {
            let child = reader.read_u32("child page numbers")?;
            if !NO_CHILD.contains(&child) {
                sub_pages.push(child);
            }
        }

        let mut key_offsets = Vec::with_capacity(number_of_keys);
        for _ in 0..number_of_keys {
            key_offsets.push(reader.read_u16("key offsets")?);
        }

        let key_data_words = reader.read_u16("key data size")? as usize;
        let key_data = reader.take(key_data_words * 2, "key data")?;

        let number_of_values = reader.read_u16("value offsets count")? as usize;
        let mut value_offsets = Vec::with_capacity(number_of_values);
        for _ in 0..number_of_values {
            value_offsets.push(reader.read_u16("value offsets")?);
        }

        let value_data_size = reader.read_u16("value data size")? as usize;
        let value_data = reader.take(value_data_size, "value data")?;

        let values = decode_values(value_data, &value_offsets, page_offset)?;
        let keys = decode_keys(key_data, &key_offsets, &values, page_offset)?;

        Ok(IndexPage {
            page_type,
            mapped_page_number,
            root_page_number,
            keys,
            sub_pages,
        })
    }
}

/// Decodes the page's value table: NUL-terminated ASCII strings
/// at the given byte offsets into the value data blob.
///
fn decode_values(
    value_data: &[u8],
    value_offsets: &[u16],
    page_offset: u64,
) -> Result<Vec<String>, PageError> {
    let mut values = Vec::with_capacity(value_offsets.len());
    for (index, &offset) in value_offsets.iter().enumerate() {
        let start = offset as usize;
        if start > value_data.len() {
            return Err(PageError::ValueOutOfRange {
                page_offset,
                index,
                offset,
            });
        }

        let tail = &value_data[start..];
        let terminator = tail.iter().position(|&byte| byte == 0);
        let bytes = match terminator {
            Some(end) => &tail[..end],
            None => {
                return Err(PageError::ValueString {
                    page_offset,
                    index,
                    offset,
                });
            }
        };

        if !bytes.is_ascii() {
            return Err(PageError::ValueString {
                page_offset,
                index,
                offset,
            });
        }

        // ASCII bytes are valid UTF-8.
        values.push(String::from_utf8_lossy(bytes).into_owned());
    }

    Ok(values)
}

/// Decodes the page's keys: each key offset (in 16-bit words)
/// names a segment count followed by that many segment indices
/// into the value table. The reconstructed key is `\` followed
/// by the segment values joined with `\`.
///
fn decode_keys(
    key_data: &[u8],
    key_offsets: &[u16],
    values: &[String],
    page_offset: u64,
) -> Result<Vec<String>, PageError> {
    let mut keys = Vec::with_capacity(key_offsets.len());
    for (index, &offset) in key_offsets.iter().enumerate() {
        let out_of_range = || PageError::KeyOutOfRange {
            page_offset,
            index,
            offset,
        };

        let start = (offset as usize) * 2;
        let end = start.checked_add(2).filter(|&end| end <= key_data.len());
        let number_of_segments = match end {
            Some(end) => LittleEndian::read_u16(&key_data[start..end]) as usize,
            None => return Err(out_of_range()),
        };

        let segments_start = start + 2;
        let segments_end = segments_start
            .checked_add(number_of_segments * 2)
            .filter(|&end| end <= key_data.len());
        let segments_data = match segments_end {
            Some(end) => &key_data[segments_start..end],
            None => return Err(out_of_range()),
        };

        let mut key = String::new();
        for chunk in segments_data.chunks_exact(2) {
            let segment = LittleEndian::read_u16(chunk);
            let value = values.get(segment as usize).ok_or(PageError::SegmentOutOfRange {
                page_offset,
                index,
                segment,
                values: values.len(),
            })?;

            key.push(KEY_SEPARATOR);
            key.push_str(value);
        }

        keys.push(key);
    }

    Ok(keys)
}

/// An index binary-tree file, bound to its mappings file.
///
#[derive(Debug)]
pub struct IndexFile<R> {
    cursor: Cursor<R>,
    file_size: u64,
    mapping: MappingFile,
    first_mapped_page: Option<IndexPage>,
    root_page: Option<IndexPage>,
}

impl IndexFile<File> {
    /// Opens the index binary-tree file at the given path.
    ///
    pub fn open(path: &Path, mapping: MappingFile) -> Result<Self, PageError> {
        let file = File::open(path).map_err(|source| PageError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        IndexFile::new(file, mapping)
    }
}

impl<R: Read + Seek> IndexFile<R> {
    /// Returns an index file over the given byte source.
    ///
    pub fn new(reader: R, mapping: MappingFile) -> Result<Self, PageError> {
        let mut cursor = Cursor::new(reader);
        let file_size = cursor.stream_len()?;

        Ok(IndexFile {
            cursor,
            file_size,
            mapping,
            first_mapped_page: None,
            root_page: None,
        })
    }

    /// Reads the page at the given physical page number, or
    /// `None` if the page falls outside the file.
    ///
    fn page_at(&mut self, physical: u32) -> Result<Option<IndexPage>, PageError> {
        let file_offset = physical as u64 * PAGE_SIZE as u64;
        if file_offset >= self.file_size {
            return Ok(None);
        }

        IndexPage::read(&mut self.cursor, file_offset).map(Some)
    }

    /// Reads the page at the given logical page number.
    ///
    /// Returns `None`, with a warning, if the logical page has no
    /// physical mapping or the physical page falls outside the
    /// file. Decode failures are returned as errors.
    ///
    pub fn mapped_page(&mut self, logical: u32) -> Result<Option<IndexPage>, PageError> {
        let physical = match self.mapping.resolve(logical) {
            Some(physical) => physical,
            None => {
                warn!("index logical page {} has no physical mapping", logical);
                return Ok(None);
            }
        };

        let page = self.page_at(physical)?;
        if page.is_none() {
            warn!(
                "index logical page {} maps to physical page {} outside the file",
                logical, physical
            );
        }

        Ok(page)
    }

    /// Returns the first mapped page (logical page 0), which must
    /// be the administrative page.
    ///
    /// Returns `None`, with a warning, if the page is missing or
    /// is not administrative.
    ///
    pub fn first_mapped_page(&mut self) -> Result<Option<&IndexPage>, PageError> {
        if self.first_mapped_page.is_none() {
            let page = match self.mapped_page(0)? {
                Some(page) => page,
                None => return Ok(None),
            };

            if page.page_type != PageType::Administrative {
                warn!(
                    "first mapped index page has type {:?}, not administrative",
                    page.page_type
                );
                return Ok(None);
            }

            self.first_mapped_page = Some(page);
        }

        Ok(self.first_mapped_page.as_ref())
    }

    /// Returns the root page of the tree, named by the
    /// administrative page's root page number.
    ///
    pub fn root_page(&mut self) -> Result<Option<IndexPage>, PageError> {
        if let Some(cached) = &self.root_page {
            return Ok(Some(cached.clone()));
        }

        let root_number = match self.first_mapped_page()? {
            Some(first) => first.root_page_number,
            None => return Ok(None),
        };

        let page = self.mapped_page(root_number)?;
        match &page {
            Some(page) => self.root_page = Some(page.clone()),
            None => warn!("unable to read index root page {}", root_number),
        }

        Ok(page)
    }

    /// Returns an iterator over every key in the tree.
    ///
    /// Keys are yielded in document order within a page, then
    /// depth-first into the page's children in array order. The
    /// iterator is finite and guards against cycles in malformed
    /// trees; unreadable pages are skipped with a warning.
    ///
    pub fn keys(&mut self) -> Keys<'_, R> {
        let mut pending = VecDeque::new();
        let mut stack = Vec::new();
        let mut visited = HashSet::new();

        let root_number = match self.first_mapped_page() {
            Ok(Some(first)) => Some(first.root_page_number),
            Ok(None) => None,
            Err(err) => {
                warn!("unable to read administrative index page: {}", err);
                None
            }
        };

        if let Some(root_number) = root_number {
            visited.insert(root_number);
            match self.root_page() {
                Ok(Some(root)) => {
                    pending.extend(root.keys);
                    stack.extend(root.sub_pages.iter().rev().copied());
                }
                Ok(None) => {}
                Err(err) => warn!("unable to read index root page: {}", err),
            }
        }

        Keys {
            file: self,
            pending,
            stack,
            visited,
        }
    }
}

/// An iterator over the keys of an index binary tree, in
/// document order and depth-first.
///
pub struct Keys<'index, R> {
    file: &'index mut IndexFile<R>,
    pending: VecDeque<String>,
    stack: Vec<u32>,
    visited: HashSet<u32>,
}

impl<'index, R: Read + Seek> Iterator for Keys<'index, R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(key) = self.pending.pop_front() {
                return Some(key);
            }

            let logical = self.stack.pop()?;
            if !self.visited.insert(logical) {
                warn!("index page cycle at logical page {}", logical);
                continue;
            }

            match self.file.mapped_page(logical) {
                Ok(Some(page)) => {
                    self.pending.extend(page.keys);
                    self.stack.extend(page.sub_pages.iter().rev().copied());
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("skipping unreadable index page {}: {}", logical, err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Builds one 8192-byte index page. Each key is a sequence of
    // indices into values.
    fn build_page(
        page_type: u32,
        root: u32,
        children: &[u32],
        keys: &[&[u16]],
        values: &[&str],
    ) -> Vec<u8> {
        assert_eq!(children.len(), keys.len() + 1);

        let mut page = Vec::new();
        for field in [page_type, 0, 0, root, keys.len() as u32].iter() {
            page.extend_from_slice(&field.to_le_bytes());
        }

        // Unknown array.
        for _ in 0..keys.len() {
            page.extend_from_slice(&0u32.to_le_bytes());
        }

        for child in children {
            page.extend_from_slice(&child.to_le_bytes());
        }

        // Key blob plus the per-key word offsets into it.
        let mut key_offsets = Vec::new();
        let mut key_blob = Vec::new();
        for segments in keys {
            key_offsets.push((key_blob.len() / 2) as u16);
            key_blob.extend_from_slice(&(segments.len() as u16).to_le_bytes());
            for segment in segments.iter() {
                key_blob.extend_from_slice(&segment.to_le_bytes());
            }
        }

        for offset in &key_offsets {
            page.extend_from_slice(&offset.to_le_bytes());
        }
        page.extend_from_slice(&((key_blob.len() / 2) as u16).to_le_bytes());
        page.extend_from_slice(&key_blob);

        // Value blob plus the per-value byte offsets into it.
        let mut value_offsets = Vec::new();
        let mut value_blob = Vec::new();
        for value in values {
            value_offsets.push(value_blob.len() as u16);
            value_blob.extend_from_slice(value.as_bytes());
            value_blob.push(0);
        }

        page.extend_from_slice(&(value_offsets.len() as u16).to_le_bytes());
        for offset in &value_offsets {
            page.extend_from_slice(&offset.to_le_bytes());
        }
        page.extend_from_slice(&(value_blob.len() as u16).to_le_bytes());
        page.extend_from_slice(&value_blob);

        assert!(page.len() <= PAGE_SIZE);
        page.resize(PAGE_SIZE, 0);
        page
    }

    fn mapping_from(mappings: &[u32]) -> MappingFile {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0000_abcdu32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&(mappings.len() as u32).to_le_bytes());
        data.extend_from_slice(&(mappings.len() as u32).to_le_bytes());
        for &mapping in mappings {
            data.extend_from_slice(&mapping.to_le_bytes());
        }
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0x0000_dcbau32.to_le_bytes());

        let mut cursor = Cursor::new(io::Cursor::new(data));
        MappingFile::read(&mut cursor, 0).unwrap()
    }

    fn page_source(pages: Vec<Vec<u8>>) -> io::Cursor<Vec<u8>> {
        let mut data = Vec::new();
        for page in pages {
            data.extend_from_slice(&page);
        }
        io::Cursor::new(data)
    }

    #[test]
    fn administrative_page_with_no_keys() {
        let page = build_page(PAGE_TYPE_ADMINISTRATIVE, 1, &[0], &[], &[]);
        let mut cursor = Cursor::new(page_source(vec![page]));

        let decoded = IndexPage::read(&mut cursor, 0).unwrap();
        assert_eq!(decoded.page_type, PageType::Administrative);
        assert_eq!(decoded.root_page_number, 1);
        assert!(decoded.keys.is_empty());
        assert!(decoded.sub_pages.is_empty());
    }

    #[test]
    fn page_keys_reconstruct_from_value_table() {
        let values = ["ROOT", "CIMV2", "NS_ABCD.2.7.64"];
        let page = build_page(
            PAGE_TYPE_ACTIVE,
            0,
            &[5, 0xffff_ffff, 6],
            &[&[0, 1], &[0, 1, 2]],
            &values,
        );
        let mut cursor = Cursor::new(page_source(vec![page]));

        let decoded = IndexPage::read(&mut cursor, 0).unwrap();
        assert_eq!(decoded.keys.len(), 2);
        assert_eq!(decoded.keys[0], "\\ROOT\\CIMV2");
        assert_eq!(decoded.keys[1], "\\ROOT\\CIMV2\\NS_ABCD.2.7.64");

        // Sentinel children are dropped, live ones keep order.
        assert_eq!(decoded.sub_pages, vec![5, 6]);
    }

    #[test]
    fn deleted_and_unknown_page_types() {
        let page = build_page(PAGE_TYPE_DELETED, 0, &[0], &[], &[]);
        let mut cursor = Cursor::new(page_source(vec![page]));
        let decoded = IndexPage::read(&mut cursor, 0).unwrap();
        assert_eq!(decoded.page_type, PageType::Deleted);

        let page = build_page(0x1234, 0, &[0], &[], &[]);
        let mut cursor = Cursor::new(page_source(vec![page]));
        let decoded = IndexPage::read(&mut cursor, 0).unwrap();
        assert_eq!(decoded.page_type, PageType::Unknown(0x1234));
    }

    #[test]
    fn segment_out_of_range_fails() {
        let page = build_page(PAGE_TYPE_ACTIVE, 0, &[0, 0], &[&[4]], &["ONLY"]);
        let mut cursor = Cursor::new(page_source(vec![page]));

        let err = IndexPage::read(&mut cursor, 0).unwrap_err();
        assert!(matches!(
            err,
            PageError::SegmentOutOfRange {
                segment: 4,
                values: 1,
                ..
            }
        ));
    }

    #[test]
    fn truncated_page_fails() {
        let mut cursor = Cursor::new(page_source(vec![vec![0u8; 100]]));
        let err = IndexPage::read(&mut cursor, 0).unwrap_err();
        assert!(matches!(err, PageError::Read(ReadError::ShortRead { .. })));
    }

    // A two-level tree: logical 0 is the administrative page,
    // logical 1 the root, logicals 2 and 3 its children. The
    // physical layout shuffles the pages to exercise the mapping.
    fn two_level_tree() -> IndexFile<io::Cursor<Vec<u8>>> {
        let admin = build_page(PAGE_TYPE_ADMINISTRATIVE, 1, &[0], &[], &[]);
        let root = build_page(
            PAGE_TYPE_ACTIVE,
            0,
            &[2, 3, 0],
            &[&[0], &[1]],
            &["MIDDLE", "ZULU"],
        );
        let left = build_page(PAGE_TYPE_ACTIVE, 0, &[0, 0], &[&[0, 1]], &["ALPHA", "LEAF"]);
        let right = build_page(PAGE_TYPE_ACTIVE, 0, &[0, 0], &[&[0]], &["OMEGA"]);

        // Physical order: root, admin, right, left.
        let source = page_source(vec![root, admin, right, left]);
        let mapping = mapping_from(&[1, 0, 3, 2]);

        IndexFile::new(source, mapping).unwrap()
    }

    #[test]
    fn keys_walk_depth_first_in_document_order() {
        let mut index = two_level_tree();

        let keys: Vec<String> = index.keys().collect();
        assert_eq!(
            keys,
            vec!["\\MIDDLE", "\\ZULU", "\\ALPHA\\LEAF", "\\OMEGA"]
        );
    }

    #[test]
    fn keys_enumerate_identically_twice() {
        let mut index = two_level_tree();

        let first: Vec<String> = index.keys().collect();
        let second: Vec<String> = index.keys().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn keys_skip_unmapped_children() {
        let admin = build_page(PAGE_TYPE_ADMINISTRATIVE, 1, &[0], &[], &[]);
        // Logical child 2 is unallocated in the mapping.
        let root = build_page(PAGE_TYPE_ACTIVE, 0, &[2, 0], &[&[0]], &["HERE"]);

        let source = page_source(vec![admin, root]);
        let mapping = mapping_from(&[0, 1, 0xffff_ffff]);
        let mut index = IndexFile::new(source, mapping).unwrap();

        let keys: Vec<String> = index.keys().collect();
        assert_eq!(keys, vec!["\\HERE"]);
    }

    #[test]
    fn keys_terminate_on_cycles() {
        let admin = build_page(PAGE_TYPE_ADMINISTRATIVE, 1, &[0], &[], &[]);
        // The root's child points back at the root.
        let root = build_page(PAGE_TYPE_ACTIVE, 0, &[1, 0], &[&[0]], &["LOOP"]);

        let source = page_source(vec![admin, root]);
        let mapping = mapping_from(&[0, 1]);
        let mut index = IndexFile::new(source, mapping).unwrap();

        let keys: Vec<String> = index.keys().collect();
        assert_eq!(keys, vec!["\\LOOP"]);
    }

    #[test]
    fn first_mapped_page_must_be_administrative() {
        let not_admin = build_page(PAGE_TYPE_ACTIVE, 1, &[0], &[], &[]);
        let source = page_source(vec![not_admin]);
        let mapping = mapping_from(&[0]);
        let mut index = IndexFile::new(source, mapping).unwrap();

        assert!(index.first_mapped_page().unwrap().is_none());
        assert!(index.keys().next().is_none());
    }
}
