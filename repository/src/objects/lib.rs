// Copyright 2026 The Cimreader Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements the objects data file (`Objects.data`) of a CIM
//! repository.
//!
//! Object records live in fixed 8192-byte pages. A page opens with a
//! table of 16-byte object descriptors, terminated by an all-zero
//! descriptor; each descriptor names a record by identifier and points
//! at its bytes within the page. A record larger than the space left
//! on its first page simply continues at offset 0 of the following
//! logical pages, which are read in "data page" mode without a
//! descriptor table.
//!
//! An index key locates a record with its trailing
//! `<name>.<page>.<id>.<size>` segment: the logical objects page, the
//! descriptor identifier, and the record's total size.
//! [`RecordLocator::parse`] decodes that segment and
//! [`ObjectsFile::record_by_key`] reassembles the record's bytes.

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
use std::fs::File;
use std::io;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The size of an objects data page in bytes.
///
pub const PAGE_SIZE: usize = 8192;

/// The size of an object descriptor in bytes.
const DESCRIPTOR_SIZE: usize = 16;

/// The separator between the segments of a CIM key.
const KEY_SEPARATOR: char = '\\';

/// The separator between the fields of a key's locator segment.
const LOCATOR_SEPARATOR: char = '.';

/// Indicates an error encountered while reading an object
/// record.
///
#[derive(Debug, Error)]
pub enum RecordError {
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

    /// The key does not end in a `NAME.PAGE.ID.SIZE` locator.
    #[error("key {key:?} has an unsupported locator: {reason}")]
    Locator {
        /// The key whose locator could not be parsed.
        key: String,
        /// The way in which the locator is malformed.
        reason: &'static str,
    },

    /// A logical page has no usable physical page.
    #[error("objects logical page {logical} is missing")]
    MissingPage {
        /// The logical page number.
        logical: u32,
    },

    /// A page's descriptor table is not terminated within the
    /// page.
    #[error("page at 0x{page_offset:08x}: descriptor table has no terminator")]
    UnterminatedDescriptors {
        /// The file offset of the page.
        page_offset: u64,
    },

    /// No descriptor on the page carries the requested
    /// identifier.
    #[error("no object descriptor with identifier {identifier}")]
    DescriptorNotFound {
        /// The requested record identifier.
        identifier: u32,
    },

    /// The matching descriptor declares a different record size
    /// than the key's locator.
    #[error("object descriptor {identifier} has data size {found}, expected {expected}")]
    DescriptorSizeMismatch {
        /// The requested record identifier.
        identifier: u32,
        /// The size named by the key's locator.
        expected: u32,
        /// The size the descriptor declares.
        found: u32,
    },

    /// A page contributed no bytes while record data was still
    /// outstanding.
    #[error("object record {identifier} segment {segment} is empty")]
    EmptySegment {
        /// The requested record identifier.
        identifier: u32,
        /// The index of the record's page segment.
        segment: usize,
    },
}

/// A 16-byte object descriptor: the index entry of one record
/// on an objects data page.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectDescriptor {
    /// The record's identifier, unique within the page.
    pub identifier: u32,

    /// The offset of the record's bytes within the page.
    pub data_offset: u32,

    /// The record's total size in bytes, which may exceed the
    /// space left on the page.
    pub data_size: u32,

    /// A checksum over the record's data. Read but not verified;
    /// the algorithm is unspecified.
    pub data_checksum: u32,
}

impl ObjectDescriptor {
    fn decode(data: &[u8; DESCRIPTOR_SIZE]) -> Self {
        ObjectDescriptor {
            identifier: LittleEndian::read_u32(&data[0..4]),
            data_offset: LittleEndian::read_u32(&data[4..8]),
            data_size: LittleEndian::read_u32(&data[8..12]),
            data_checksum: LittleEndian::read_u32(&data[12..16]),
        }
    }

    fn is_terminator(data: &[u8; DESCRIPTOR_SIZE]) -> bool {
        data.iter().all(|&byte| byte == 0)
    }
}

/// One page of the objects data file.
///
/// In descriptor mode the page's descriptor table is decoded;
/// in data-page mode the whole page is treated as the raw
/// continuation of a record that started on an earlier page.
///
pub struct ObjectsPage {
    page_offset: u64,
    data: Vec<u8>,
    descriptors: Vec<ObjectDescriptor>,
}

impl ObjectsPage {
    /// Reads the objects data page at the given file offset.
    ///
    pub fn read<R: Read + Seek>(
        cursor: &mut Cursor<R>,
        file_offset: u64,
        data_page: bool,
    ) -> Result<Self, RecordError> {
        cursor.seek_to(file_offset)?;

        let mut data = vec![0u8; PAGE_SIZE];
        cursor.read_exact(&mut data)?;

        let mut page = ObjectsPage {
            page_offset: file_offset,
            data,
            descriptors: Vec::new(),
        };

        if !data_page {
            page.read_descriptors()?;
        }

        Ok(page)
    }

    /// Parses the page's descriptor table, up to the all-zero
    /// terminator.
    ///
    fn read_descriptors(&mut self) -> Result<(), RecordError> {
        let mut buf = [0u8; DESCRIPTOR_SIZE];
        for chunk in self.data.chunks_exact(DESCRIPTOR_SIZE) {
            buf.copy_from_slice(chunk);
            if ObjectDescriptor::is_terminator(&buf) {
                return Ok(());
            }

            self.descriptors.push(ObjectDescriptor::decode(&buf));
        }

        Err(RecordError::UnterminatedDescriptors {
            page_offset: self.page_offset,
        })
    }

    /// Returns the page's descriptors, in table order.
    ///
    pub fn descriptors(&self) -> &[ObjectDescriptor] {
        &self.descriptors
    }

    /// Returns the descriptor with the given identifier, whose
    /// declared size must equal the expected size.
    ///
    pub fn descriptor(
        &self,
        identifier: u32,
        expected_size: u32,
    ) -> Result<&ObjectDescriptor, RecordError> {
        let descriptor = self
            .descriptors
            .iter()
            .find(|descriptor| descriptor.identifier == identifier)
            .ok_or(RecordError::DescriptorNotFound { identifier })?;

        if descriptor.data_size != expected_size {
            return Err(RecordError::DescriptorSizeMismatch {
                identifier,
                expected: expected_size,
                found: descriptor.data_size,
            });
        }

        Ok(descriptor)
    }

    /// Returns up to `wanted` bytes of record data starting at
    /// the given offset within the page.
    ///
    /// The slice ends at the page boundary; the record's
    /// remaining bytes continue on the next logical page.
    ///
    pub fn record_data(&self, data_offset: u32, wanted: usize) -> &[u8] {
        let start = (data_offset as usize).min(self.data.len());
        let end = start + wanted.min(self.data.len() - start);

        &self.data[start..end]
    }
}

/// The record locator parsed from the final segment of a CIM
/// key: `<name>.<page>.<id>.<size>`.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLocator {
    /// The locator's name field, e.g. `CD_ABCDEF0123456789`.
    pub name: String,

    /// The logical objects page the record starts on.
    pub logical_page: u32,

    /// The record's descriptor identifier.
    pub record_identifier: u32,

    /// The record's total size in bytes.
    pub data_size: u32,
}

impl RecordLocator {
    /// Parses the locator from the final segment of a key.
    ///
    pub fn parse(key: &str) -> Result<Self, RecordError> {
        let locator_error = |reason| RecordError::Locator {
            key: key.to_string(),
            reason,
        };

        let segment = key.rsplit(KEY_SEPARATOR).next().unwrap_or(key);

        let fields: Vec<&str> = segment.split(LOCATOR_SEPARATOR).collect();
        if fields.len() != 4 {
            return Err(locator_error("expected 4 dot-separated fields"));
        }

        let logical_page = fields[1]
            .parse::<u32>()
            .map_err(|_| locator_error("page number is not a decimal integer"))?;
        let record_identifier = fields[2]
            .parse::<u32>()
            .map_err(|_| locator_error("record identifier is not a decimal integer"))?;
        let data_size = fields[3]
            .parse::<u32>()
            .map_err(|_| locator_error("data size is not a decimal integer"))?;

        Ok(RecordLocator {
            name: fields[0].to_string(),
            logical_page,
            record_identifier,
            data_size,
        })
    }

    /// Returns the record's data-type tag: the part of the name
    /// before the first underscore.
    ///
    pub fn data_type(&self) -> &str {
        self.name.split('_').next().unwrap_or(&self.name)
    }
}

/// The raw bytes of one object record, tagged with its
/// data type.
///
/// The record's internal structure (class definition, instance,
/// registration) is left to the caller.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// The record's data-type tag, typically `CD`, `I`, `IL`
    /// or `R`.
    pub data_type: String,

    /// The record's bytes.
    pub data: Vec<u8>,
}

/// An objects data file, bound to its mappings file.
///
#[derive(Debug)]
pub struct ObjectsFile<R> {
    cursor: Cursor<R>,
    file_size: u64,
    mapping: MappingFile,
}

impl ObjectsFile<File> {
    /// Opens the objects data file at the given path.
    ///
    pub fn open(path: &Path, mapping: MappingFile) -> Result<Self, RecordError> {
        let file = File::open(path).map_err(|source| RecordError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        ObjectsFile::new(file, mapping)
    }
}

impl<R: Read + Seek> ObjectsFile<R> {
    /// Returns an objects data file over the given byte source.
    ///
    pub fn new(reader: R, mapping: MappingFile) -> Result<Self, RecordError> {
        let mut cursor = Cursor::new(reader);
        let file_size = cursor.stream_len()?;

        Ok(ObjectsFile {
            cursor,
            file_size,
            mapping,
        })
    }

    /// Reads the page at the given physical page number, or
    /// `None` if the page falls outside the file.
    ///
    fn page_at(&mut self, physical: u32, data_page: bool) -> Result<Option<ObjectsPage>, RecordError> {
        let file_offset = physical as u64 * PAGE_SIZE as u64;
        if file_offset >= self.file_size {
            return Ok(None);
        }

        ObjectsPage::read(&mut self.cursor, file_offset, data_page).map(Some)
    }

    /// Reads the page at the given logical page number.
    ///
    /// Returns `None`, with a warning, if the logical page has no
    /// physical mapping or the physical page falls outside the
    /// file.
    ///
    pub fn mapped_page(
        &mut self,
        logical: u32,
        data_page: bool,
    ) -> Result<Option<ObjectsPage>, RecordError> {
        let physical = match self.mapping.resolve(logical) {
            Some(physical) => physical,
            None => {
                warn!("objects logical page {} has no physical mapping", logical);
                return Ok(None);
            }
        };

        let page = self.page_at(physical, data_page)?;
        if page.is_none() {
            warn!(
                "objects logical page {} maps to physical page {} outside the file",
                logical, physical
            );
        }

        Ok(page)
    }

    /// Reassembles the record named by the given locator.
    ///
    /// The first page is read in descriptor mode and must carry
    /// a descriptor matching the locator's identifier and size;
    /// any following pages are read in data-page mode and
    /// contribute their bytes from offset 0.
    ///
    pub fn record(&mut self, locator: &RecordLocator) -> Result<ObjectRecord, RecordError> {
        let mut data = Vec::new();
        let mut remaining = locator.data_size as usize;
        let mut logical = locator.logical_page;
        let mut data_page = false;
        let mut segment_index = 0;

        while remaining > 0 {
            let page = self
                .mapped_page(logical, data_page)?
                .ok_or(RecordError::MissingPage { logical })?;

            let data_offset = if data_page {
                0
            } else {
                page.descriptor(locator.record_identifier, locator.data_size)?
                    .data_offset
            };

            let segment = page.record_data(data_offset, remaining);
            if segment.is_empty() {
                return Err(RecordError::EmptySegment {
                    identifier: locator.record_identifier,
                    segment: segment_index,
                });
            }

            data.extend_from_slice(segment);
            remaining -= segment.len();
            segment_index += 1;
            data_page = true;

            logical = match logical.checked_add(1) {
                Some(next) => next,
                None => {
                    if remaining > 0 {
                        return Err(RecordError::MissingPage { logical });
                    }
                    logical
                }
            };
        }

        Ok(ObjectRecord {
            data_type: locator.data_type().to_string(),
            data,
        })
    }

    /// Retrieves the record named by the given CIM key.
    ///
    /// All failures — a malformed locator, a missing page, a
    /// missing or mismatched descriptor, a short read — are
    /// reported as a warning and `None`.
    ///
    pub fn record_by_key(&mut self, key: &str) -> Option<ObjectRecord> {
        let locator = match RecordLocator::parse(key) {
            Ok(locator) => locator,
            Err(err) => {
                warn!("{}", err);
                return None;
            }
        };

        match self.record(&locator) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("unable to read object record for key {:?}: {}", key, err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_bytes(identifier: u32, data_offset: u32, data_size: u32) -> Vec<u8> {
        let mut data = Vec::new();
        for field in [identifier, data_offset, data_size, 0].iter() {
            data.extend_from_slice(&field.to_le_bytes());
        }
        data
    }

    // Builds one 8192-byte objects page from descriptor triples
    // and (offset, bytes) record data runs.
    fn build_page(descriptors: &[(u32, u32, u32)], runs: &[(usize, &[u8])]) -> Vec<u8> {
        let mut page = Vec::new();
        for &(identifier, data_offset, data_size) in descriptors {
            page.extend_from_slice(&descriptor_bytes(identifier, data_offset, data_size));
        }
        page.extend_from_slice(&[0u8; DESCRIPTOR_SIZE]);
        page.resize(PAGE_SIZE, 0);

        for &(offset, bytes) in runs {
            page[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
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

    fn objects_file(pages: Vec<Vec<u8>>, mappings: &[u32]) -> ObjectsFile<io::Cursor<Vec<u8>>> {
        let mut data = Vec::new();
        for page in pages {
            data.extend_from_slice(&page);
        }

        ObjectsFile::new(io::Cursor::new(data), mapping_from(mappings)).unwrap()
    }

    #[test]
    fn descriptor_table_stops_at_terminator() {
        let page_data = build_page(&[(1, 64, 16), (2, 80, 100)], &[(64, b"0123456789abcdef")]);
        let mut cursor = Cursor::new(io::Cursor::new(page_data));

        let page = ObjectsPage::read(&mut cursor, 0, false).unwrap();
        assert_eq!(page.descriptors().len(), 2);
        assert_eq!(page.descriptors()[0].identifier, 1);
        assert_eq!(page.descriptors()[1].data_size, 100);

        // Record data stays addressable past the terminator.
        assert_eq!(page.record_data(64, 16), b"0123456789abcdef");
    }

    #[test]
    fn data_page_skips_descriptor_parse() {
        let page_data = vec![0xaa; PAGE_SIZE];
        let mut cursor = Cursor::new(io::Cursor::new(page_data));

        let page = ObjectsPage::read(&mut cursor, 0, true).unwrap();
        assert!(page.descriptors().is_empty());
        assert_eq!(page.record_data(0, 4), &[0xaa; 4][..]);
    }

    #[test]
    fn descriptor_lookup_checks_identifier_and_size() {
        let page_data = build_page(&[(7, 64, 32)], &[]);
        let mut cursor = Cursor::new(io::Cursor::new(page_data));
        let page = ObjectsPage::read(&mut cursor, 0, false).unwrap();

        assert_eq!(page.descriptor(7, 32).unwrap().data_offset, 64);
        assert!(matches!(
            page.descriptor(8, 32),
            Err(RecordError::DescriptorNotFound { identifier: 8 })
        ));
        assert!(matches!(
            page.descriptor(7, 33),
            Err(RecordError::DescriptorSizeMismatch {
                expected: 33,
                found: 32,
                ..
            })
        ));
    }

    #[test]
    fn locator_parses_the_final_key_segment() {
        let locator =
            RecordLocator::parse("\\NS\\A\\B\\C\\NS_0123456789ABCDEF.3.17.8192").unwrap();
        assert_eq!(locator.name, "NS_0123456789ABCDEF");
        assert_eq!(locator.logical_page, 3);
        assert_eq!(locator.record_identifier, 17);
        assert_eq!(locator.data_size, 8192);
        assert_eq!(locator.data_type(), "NS");
    }

    #[test]
    fn locator_rejects_malformed_segments() {
        for key in [
            "\\A\\B",
            "\\A\\NAME.1.2",
            "\\A\\NAME.1.2.3.4",
            "\\A\\NAME.x.2.3",
            "\\A\\NAME.1.x.3",
            "\\A\\NAME.1.2.x",
        ]
        .iter()
        {
            assert!(
                matches!(RecordLocator::parse(key), Err(RecordError::Locator { .. })),
                "key {:?} should not parse",
                key
            );
        }
    }

    #[test]
    fn data_type_without_underscore_is_the_whole_name() {
        let locator = RecordLocator::parse("R.1.2.3").unwrap();
        assert_eq!(locator.data_type(), "R");
        assert_eq!(locator.name, "R");
    }

    #[test]
    fn single_page_record() {
        let payload = vec![0x5a; 64];
        let page = build_page(&[(17, 128, 64)], &[(128, &payload)]);
        let mut file = objects_file(vec![page], &[0]);

        let record = file
            .record_by_key("\\NS\\CD_ABCD.0.17.64")
            .expect("record should reassemble");
        assert_eq!(record.data_type, "CD");
        assert_eq!(record.data, payload);
    }

    #[test]
    fn multi_page_record_continues_on_data_pages() {
        // 12288 bytes starting at offset 4096: 4096 bytes on the
        // first page, 8192 on the next logical page.
        let first_run = vec![0x11; 4096];
        let second_run = vec![0x22; PAGE_SIZE];

        let first = build_page(&[(9, 4096, 12288)], &[(4096, &first_run)]);
        let second = second_run.clone();
        let mut file = objects_file(vec![first, second], &[0, 1]);

        let record = file
            .record_by_key("\\NS\\I_FEDC.0.9.12288")
            .expect("record should reassemble");
        assert_eq!(record.data.len(), 12288);
        assert_eq!(&record.data[..4096], &first_run[..]);
        assert_eq!(&record.data[4096..], &second_run[..]);
    }

    #[test]
    fn missing_mapped_page_yields_no_record() {
        let page = build_page(&[(1, 64, 16)], &[]);
        let mut file = objects_file(vec![page], &[0xffff_ffff]);

        assert!(file.record_by_key("\\NS\\CD_AB.0.1.16").is_none());

        let locator = RecordLocator::parse("\\NS\\CD_AB.0.1.16").unwrap();
        assert!(matches!(
            file.record(&locator),
            Err(RecordError::MissingPage { logical: 0 })
        ));
    }

    #[test]
    fn descriptor_mismatch_yields_no_record() {
        let page = build_page(&[(1, 64, 16)], &[]);
        let mut file = objects_file(vec![page], &[0]);

        // Wrong identifier, then wrong size.
        assert!(file.record_by_key("\\NS\\CD_AB.0.2.16").is_none());
        assert!(file.record_by_key("\\NS\\CD_AB.0.1.32").is_none());
    }

    #[test]
    fn zero_sized_record_is_empty() {
        let page = build_page(&[(1, 64, 0)], &[]);
        let mut file = objects_file(vec![page], &[0]);

        let record = file.record_by_key("\\NS\\CD_AB.0.1.0").unwrap();
        assert_eq!(record.data_type, "CD");
        assert!(record.data.is_empty());
    }

    #[test]
    fn truncated_continuation_yields_no_record() {
        // The record claims more bytes than the file holds.
        let page = build_page(&[(3, 8000, 1000)], &[]);
        let mut file = objects_file(vec![page], &[0, 1]);

        assert!(file.record_by_key("\\NS\\CD_AB.0.3.1000").is_none());
    }
}
