//! Session facade
//!
//! [`BlfReader`] owns everything an open trace needs: the underlying input,
//! the container index, the cache, the interface registry, and the two
//! cursors of the sequential read loop. Records can be pulled sequentially
//! with [`BlfReader::next_record`] (or the [`BlfReader::records`] iterator)
//! and re-read at a saved locator with [`BlfReader::read_record_at`].

use std::io::{Cursor, Read, Seek, SeekFrom};

use binrw::BinRead;
use chrono::NaiveDate;

use crate::container::{read_fully, ContainerIndex};
use crate::format::{BlfDate, FileHeader};
use crate::interface::InterfaceRegistry;
use crate::objects::{next_object, DecodeContext};
use crate::types::{BlfError, FileEncap, InterfaceDescriptor, PacketRecord, Result};

/// Reader over one open BLF trace
///
/// All state is private to the instance; two readers over the same file do
/// not share caches. Dropping the reader releases the index, the container
/// caches, and the interface registry.
pub struct BlfReader<R> {
    fh: R,
    header: FileHeader,
    containers: ContainerIndex,
    interfaces: InterfaceRegistry,
    start_offset_ns: u64,
    current_virt: u64,
    start_of_last_obj: u64,
}

impl<R: Read + Seek> BlfReader<R> {
    /// Open a trace: validate the magic, index the log containers, and
    /// convert the start date into the capture's nanosecond epoch
    ///
    /// Inputs too short for a file header, or with the wrong magic, fail
    /// with [`BlfError::NotMine`].
    pub fn open(mut fh: R) -> Result<Self> {
        let mut raw = [0u8; FileHeader::SIZE];
        if read_fully(&mut fh, &mut raw)? < raw.len() {
            log::debug!("input shorter than a BLF file header");
            return Err(BlfError::NotMine);
        }
        let header = match FileHeader::read(&mut Cursor::new(&raw[..])) {
            Ok(header) => header,
            Err(binrw::Error::BadMagic { .. }) => return Err(BlfError::NotMine),
            Err(e) => return Err(BlfError::BadFile(format!("unreadable file header: {e}"))),
        };

        // Skip the reserved part of the header.
        fh.seek(SeekFrom::Start(header.header_length as u64))?;

        let start_offset_ns = start_offset_ns(&header.start_date);
        let containers = ContainerIndex::scan(&mut fh)?;
        log::debug!(
            "opened BLF trace: {} objects declared, {} virtual bytes",
            header.object_count,
            containers.virtual_len()
        );

        Ok(BlfReader {
            fh,
            header,
            containers,
            interfaces: InterfaceRegistry::new(),
            start_offset_ns,
            current_virt: 0,
            start_of_last_obj: 0,
        })
    }

    /// Decode the next record in virtual-offset order
    ///
    /// Returns `Ok(None)` at the clean end of the stream. A decode error
    /// does not poison the reader: the cursor has already moved past the
    /// failing object, so the next call continues behind it.
    pub fn next_record(&mut self) -> Result<Option<PacketRecord>> {
        let mut ctx = DecodeContext {
            fh: &mut self.fh,
            containers: &mut self.containers,
            interfaces: &mut self.interfaces,
            start_offset_ns: self.start_offset_ns,
        };
        let mut cursor = self.current_virt;
        let result = next_object(&mut ctx, self.current_virt, &mut cursor);
        // The cursor is already past the object just looked at, even when
        // its decoder failed, so the next call continues behind it.
        self.current_virt = cursor;
        match result? {
            None => Ok(None),
            Some(record) => {
                self.start_of_last_obj = record.object_start;
                Ok(Some(record))
            }
        }
    }

    /// Decode the record at a saved locator without touching the
    /// sequential cursor
    ///
    /// `virt_off` is the `object_start` of a previously returned record.
    /// Reads at the same offset are idempotent.
    pub fn read_record_at(&mut self, virt_off: u64) -> Result<Option<PacketRecord>> {
        let mut ctx = DecodeContext {
            fh: &mut self.fh,
            containers: &mut self.containers,
            interfaces: &mut self.interfaces,
            start_offset_ns: self.start_offset_ns,
        };
        let mut cursor = virt_off;
        Ok(next_object(&mut ctx, virt_off, &mut cursor)?)
    }

    /// Iterator over the remaining records
    pub fn records(&mut self) -> Records<'_, R> {
        Records { reader: self }
    }

    /// Interfaces materialized so far, in id order
    ///
    /// The list grows as records are decoded; APP_TEXT channel descriptions
    /// may add named interfaces before any data record references them.
    pub fn interfaces(&self) -> &[InterfaceDescriptor] {
        self.interfaces.descriptors()
    }

    /// File-wide encapsulation summary over the interfaces seen so far
    pub fn file_encap(&self) -> FileEncap {
        self.interfaces.file_encap()
    }

    /// The file header read at open
    pub fn file_header(&self) -> &FileHeader {
        &self.header
    }

    /// Capture start in nanoseconds since the Unix epoch
    pub fn start_offset_ns(&self) -> u64 {
        self.start_offset_ns
    }

    /// Virtual offset of the most recently emitted object
    pub fn start_of_last_obj(&self) -> u64 {
        self.start_of_last_obj
    }
}

/// Iterator adapter over [`BlfReader::next_record`]
///
/// Decode errors are yielded as items; iteration continues behind the
/// failing object.
pub struct Records<'a, R> {
    reader: &'a mut BlfReader<R>,
}

impl<R: Read + Seek> Iterator for Records<'_, R> {
    type Item = Result<PacketRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Convert the file-header start date into nanoseconds since the epoch
///
/// The date is taken as UTC. Years up to 1970 clamp to 1970; a date the
/// calendar rejects degrades to offset zero.
fn start_offset_ns(date: &BlfDate) -> u64 {
    let year = if date.year > 1970 { date.year as i32 } else { 1970 };
    let ns = NaiveDate::from_ymd_opt(year, date.month as u32, date.day as u32)
        .and_then(|d| {
            d.and_hms_milli_opt(
                date.hour as u32,
                date.mins as u32,
                date.sec as u32,
                date.ms as u32,
            )
        })
        .and_then(|dt| dt.and_utc().timestamp_nanos_opt());
    match ns {
        Some(ns) if ns >= 0 => ns as u64,
        _ => {
            log::warn!("file start date not representable, capture offset set to zero");
            0
        }
    }
}
