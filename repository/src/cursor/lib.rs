// Copyright 2026 The Cimreader Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements a binary cursor for reading structured data from a
//! seekable byte source.
//!
//! The repository's on-disk formats are decoded by seeking to a known
//! offset and consuming little-endian fields one after another. The
//! [`Cursor`] tracks the current offset so that every failure can name
//! the exact position at which it occurred, and a read that returns
//! fewer bytes than requested is reported as an explicit
//! [`ReadError::ShortRead`] rather than silently truncated data.

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
use std::io;
use std::io::{Read, Seek, SeekFrom};
use thiserror::Error;

/// Indicates an error encountered while reading from a byte source.
///
#[derive(Debug, Error)]
pub enum ReadError {
    /// The underlying source returned an I/O error.
    #[error("read failed at offset 0x{offset:08x}: {source}")]
    Io {
        /// The offset at which the read was attempted.
        offset: u64,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The source ended before the requested number of bytes
    /// could be read.
    #[error("short read at offset 0x{offset:08x}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        /// The offset at which the read started.
        offset: u64,
        /// The number of bytes requested.
        wanted: usize,
        /// The number of bytes actually available.
        got: usize,
    },
}

/// A read cursor over a seekable byte source, tracking the
/// current offset.
///
#[derive(Debug)]
pub struct Cursor<R> {
    inner: R,
    position: u64,
}

impl<R: Read + Seek> Cursor<R> {
    /// Returns a new cursor at offset 0.
    ///
    /// The source is not seeked until the first read or
    /// [`seek_to`](Cursor::seek_to).
    ///
    pub fn new(inner: R) -> Self {
        Cursor { inner, position: 0 }
    }

    /// Returns the current offset, relative to the start of
    /// the source.
    ///
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Moves the cursor to the given offset.
    ///
    pub fn seek_to(&mut self, offset: u64) -> Result<(), ReadError> {
        self.inner
            .seek(SeekFrom::Start(offset))
            .map_err(|source| ReadError::Io { offset, source })?;
        self.position = offset;

        Ok(())
    }

    /// Advances the cursor by the given number of bytes without
    /// reading them.
    ///
    pub fn skip(&mut self, count: u64) -> Result<(), ReadError> {
        let offset = self.position.saturating_add(count);
        self.seek_to(offset)
    }

    /// Returns the total size of the source in bytes.
    ///
    /// The cursor's position is left unchanged.
    ///
    pub fn stream_len(&mut self) -> Result<u64, ReadError> {
        let position = self.position;
        let len = self
            .inner
            .seek(SeekFrom::End(0))
            .map_err(|source| ReadError::Io { offset: position, source })?;
        self.seek_to(position)?;

        Ok(len)
    }

    /// Fills the given buffer, failing with
    /// [`ReadError::ShortRead`] if the source ends first.
    ///
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ReadError> {
        let offset = self.position;
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(ReadError::ShortRead {
                        offset,
                        wanted: buf.len(),
                        got: filled,
                    });
                }
                Ok(n) => {
                    filled += n;
                    self.position += n as u64;
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => {
                    return Err(ReadError::Io {
                        offset: self.position,
                        source,
                    });
                }
            }
        }

        Ok(())
    }

    /// Reads the given number of bytes into a new buffer.
    ///
    pub fn read_vec(&mut self, count: usize) -> Result<Vec<u8>, ReadError> {
        let mut buf = vec![0u8; count];
        self.read_exact(&mut buf)?;

        Ok(buf)
    }

    /// Reads a single byte.
    ///
    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;

        Ok(buf[0])
    }

    /// Reads a little-endian `u16`.
    ///
    pub fn read_u16_le(&mut self) -> Result<u16, ReadError> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;

        Ok(LittleEndian::read_u16(&buf))
    }

    /// Reads a little-endian `u32`.
    ///
    pub fn read_u32_le(&mut self) -> Result<u32, ReadError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;

        Ok(LittleEndian::read_u32(&buf))
    }

    /// Consumes the cursor, returning the underlying source.
    ///
    pub fn into_inner(self) -> R {
        self.inner
    }
}
