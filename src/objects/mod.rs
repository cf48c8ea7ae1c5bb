//! Object demultiplexer
//!
//! Walks the virtual byte stream object by object: finds the next `LOBJ`
//! block header (resyncing one byte at a time over stray padding), reads the
//! matching log object header variant, and dispatches to the per-type
//! decoder. Unknown object types are skipped; APP_TEXT metadata sequences
//! are accumulated across objects before a single record is emitted.

use std::io::{Cursor, Read, Seek};

use binrw::BinRead;

use crate::container::ContainerIndex;
use crate::format::{
    BlockHeader, LogObjectHeader, LogObjectHeader2, LogObjectHeader3, HEADER_TYPE_2,
    HEADER_TYPE_3, HEADER_TYPE_DEFAULT, OBJTYPE_APP_TEXT, OBJTYPE_CAN_ERROR,
    OBJTYPE_CAN_ERROR_EXT, OBJTYPE_CAN_FD_ERROR_64, OBJTYPE_CAN_FD_MESSAGE,
    OBJTYPE_CAN_FD_MESSAGE_64, OBJTYPE_CAN_MESSAGE, OBJTYPE_CAN_MESSAGE2,
    OBJTYPE_ETHERNET_FRAME, OBJTYPE_ETHERNET_FRAME_EX, OBJTYPE_ETHERNET_STATUS,
    OBJTYPE_FLEXRAY_DATA, OBJTYPE_FLEXRAY_MESSAGE, OBJTYPE_FLEXRAY_RCVMESSAGE,
    OBJTYPE_FLEXRAY_RCVMESSAGE_EX, OBJTYPE_LIN_MESSAGE, OBJTYPE_LOG_CONTAINER,
    OBJTYPE_WLAN_FRAME,
};
use crate::interface::InterfaceRegistry;
use crate::types::{BlfError, PacketRecord, Result};

pub(crate) mod can;
pub(crate) mod ethernet;
pub(crate) mod flexray;
pub(crate) mod lin;
pub(crate) mod status;
pub(crate) mod text;

/// Everything a per-type decoder needs to pull bytes and emit records
pub(crate) struct DecodeContext<'a, R> {
    pub fh: &'a mut R,
    pub containers: &'a mut ContainerIndex,
    pub interfaces: &'a mut InterfaceRegistry,
    pub start_offset_ns: u64,
}

impl<R: Read + Seek> DecodeContext<'_, R> {
    /// Fetch exactly `len` bytes at a virtual offset
    pub fn fetch(&mut self, virt: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.containers.read_exact_at(self.fh, virt, &mut buf)?;
        Ok(buf)
    }
}

/// The decoder precondition shared by every object type: the declared
/// object length must cover the per-type header
pub(crate) fn require_in_object(
    object_length: u64,
    block_start: u64,
    data_start: u64,
    header_size: usize,
    what: &str,
) -> Result<()> {
    if object_length < (data_start - block_start) + header_size as u64 {
        return Err(BlfError::BadFile(format!(
            "{what}: not enough bytes for header in object"
        )));
    }
    Ok(())
}

/// Decode the next record at or after `start_pos`
///
/// Objects that do not produce a record (log-skipped types, APP_TEXT channel
/// descriptions, metadata continuations) advance the position and loop.
/// `Ok(None)` is the clean end of the virtual stream.
///
/// `cursor` always ends up past the last object looked at, including a
/// failing one, so a sequential caller can continue behind a decode error.
pub(crate) fn next_object<R: Read + Seek>(
    ctx: &mut DecodeContext<'_, R>,
    mut start_pos: u64,
    cursor: &mut u64,
) -> Result<Option<PacketRecord>> {
    let mut metadata_buf: Vec<u8> = Vec::new();
    let mut metadata_active = false;
    let mut last_metadata_start: u64 = 0;

    loop {
        // Find the next LOBJ magic, moving one byte at a time over padding.
        let header = loop {
            let mut raw = [0u8; BlockHeader::SIZE];
            match ctx.containers.read_or_eof(ctx.fh, start_pos, &mut raw) {
                Ok(true) => {}
                Ok(false) => return Ok(None),
                Err(BlfError::ShortRead) => return Ok(None),
                Err(e) => return Err(e),
            }
            match BlockHeader::read(&mut Cursor::new(&raw[..])) {
                Ok(header) => break header,
                Err(binrw::Error::BadMagic { .. }) => {
                    log::debug!("object magic is not LOBJ (virtual pos {start_pos:#x})");
                    start_pos += 1;
                }
                Err(e) => {
                    return Err(BlfError::BadFile(format!("unreadable block header: {e}")));
                }
            }
        };

        let object_start = start_pos;
        let header2_start = start_pos + BlockHeader::SIZE as u64;
        let data_start = start_pos + header.header_length as u64;
        let object_length = header.object_length as u64;

        let Some((flags, object_timestamp)) =
            read_timestamp_header(ctx, header.header_type, header2_start, data_start)?
        else {
            return Ok(None);
        };

        // The cursor moves past this object no matter how decoding goes.
        let next_virt = start_pos + header.skip_length();
        *cursor = next_virt;

        if metadata_active && header.object_type != OBJTYPE_APP_TEXT {
            // A foreign object interrupts a metadata sequence; drop the
            // incomplete accumulation and start fresh.
            metadata_active = false;
            last_metadata_start = 0;
            metadata_buf.clear();
        }

        let decoded = match header.object_type {
            OBJTYPE_LOG_CONTAINER => {
                return Err(BlfError::Unsupported(
                    "log container nested in log container".into(),
                ));
            }
            OBJTYPE_ETHERNET_FRAME => Some(ethernet::decode_frame(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
            )?),
            OBJTYPE_ETHERNET_FRAME_EX => Some(ethernet::decode_frame_ex(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
            )?),
            OBJTYPE_WLAN_FRAME => Some(ethernet::decode_wlan_frame(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
            )?),
            OBJTYPE_CAN_MESSAGE => Some(can::decode_message(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
                false,
            )?),
            OBJTYPE_CAN_MESSAGE2 => Some(can::decode_message(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
                true,
            )?),
            OBJTYPE_CAN_ERROR => Some(can::decode_error(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
            )?),
            OBJTYPE_CAN_ERROR_EXT => Some(can::decode_error_ext(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
            )?),
            OBJTYPE_CAN_FD_MESSAGE => Some(can::decode_fd_message(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
            )?),
            OBJTYPE_CAN_FD_MESSAGE_64 => Some(can::decode_fd_message64(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
            )?),
            OBJTYPE_CAN_FD_ERROR_64 => Some(can::decode_fd_error64(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
            )?),
            OBJTYPE_FLEXRAY_DATA => Some(flexray::decode_data(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
            )?),
            OBJTYPE_FLEXRAY_MESSAGE => Some(flexray::decode_message(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
            )?),
            OBJTYPE_FLEXRAY_RCVMESSAGE => Some(flexray::decode_rcv_message(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
                false,
            )?),
            OBJTYPE_FLEXRAY_RCVMESSAGE_EX => Some(flexray::decode_rcv_message(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
                true,
            )?),
            OBJTYPE_LIN_MESSAGE => Some(lin::decode_message(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
            )?),
            OBJTYPE_ETHERNET_STATUS => Some(status::decode_ethernet_status(
                ctx,
                object_start,
                data_start,
                object_length,
                flags,
                object_timestamp,
            )?),
            OBJTYPE_APP_TEXT => {
                match text::decode_app_text(
                    ctx,
                    object_start,
                    data_start,
                    object_length,
                    flags,
                    object_timestamp,
                    &mut metadata_buf,
                    metadata_active,
                )? {
                    text::AppTextOutcome::Continue => {
                        if !metadata_active {
                            metadata_active = true;
                            last_metadata_start = object_start;
                        }
                        None
                    }
                    text::AppTextOutcome::Metadata(mut record) => {
                        if metadata_active {
                            // The record spans back to the first object of
                            // the sequence so a re-seek replays all of it.
                            record.object_start = last_metadata_start;
                        } else {
                            record.object_start = object_start;
                        }
                        return Ok(Some(record));
                    }
                    text::AppTextOutcome::Record(mut record) => {
                        metadata_buf.clear();
                        record.object_start = object_start;
                        return Ok(Some(record));
                    }
                    text::AppTextOutcome::Skip => {
                        metadata_active = false;
                        last_metadata_start = 0;
                        metadata_buf.clear();
                        None
                    }
                }
            }
            other => {
                log::debug!("unknown object type {other:#06x}, skipping");
                None
            }
        };

        match decoded {
            Some(mut record) => {
                record.object_start = object_start;
                return Ok(Some(record));
            }
            None => start_pos = next_virt,
        }
    }
}

/// Read the log object header variant selected by the block header
///
/// Returns `Ok(None)` when the header lies beyond the virtual stream, which
/// the caller treats as end of file.
fn read_timestamp_header<R: Read + Seek>(
    ctx: &mut DecodeContext<'_, R>,
    header_type: u16,
    header2_start: u64,
    data_start: u64,
) -> Result<Option<(u32, u64)>> {
    let size = match header_type {
        HEADER_TYPE_DEFAULT => LogObjectHeader::SIZE,
        HEADER_TYPE_2 => LogObjectHeader2::SIZE,
        HEADER_TYPE_3 => LogObjectHeader3::SIZE,
        other => {
            return Err(BlfError::Unsupported(format!(
                "unknown object header type {other}"
            )));
        }
    };

    // The header must fit between the block header and the object data.
    if data_start < header2_start + size as u64 {
        return Err(BlfError::BadFile(
            "not enough bytes for log object header".into(),
        ));
    }

    let mut raw = vec![0u8; size];
    if !ctx.containers.read_or_eof(ctx.fh, header2_start, &mut raw)? {
        log::debug!("log object header lies past the end of the stream");
        return Ok(None);
    }

    let parsed = match header_type {
        HEADER_TYPE_DEFAULT => LogObjectHeader::read(&mut Cursor::new(&raw[..]))
            .map(|h| (h.flags, h.object_timestamp)),
        HEADER_TYPE_2 => LogObjectHeader2::read(&mut Cursor::new(&raw[..]))
            .map(|h| (h.flags, h.object_timestamp)),
        _ => LogObjectHeader3::read(&mut Cursor::new(&raw[..]))
            .map(|h| (h.flags, h.object_timestamp)),
    };
    parsed
        .map(Some)
        .map_err(|e| BlfError::BadFile(format!("unreadable log object header: {e}")))
}
