//! LIN message decoder
//!
//! LIN objects embed their payload inside the fixed-size message structure,
//! so decoding needs no second read: the frame is an 8-byte synthetic
//! header (format revision, packed DLC, masked frame id, checksum) followed
//! by up to 8 payload bytes taken from the structure itself.

use std::io::{Cursor, Read, Seek};

use binrw::BinRead;

use crate::format::LinMessageHeader;
use crate::record::build_record;
use crate::types::{BlfError, LinkLayer, PacketDirection, PacketRecord, Result, HW_CHANNEL_NONE};

use super::{require_in_object, DecodeContext};

pub(crate) fn decode_message<R: Read + Seek>(
    ctx: &mut DecodeContext<'_, R>,
    block_start: u64,
    data_start: u64,
    object_length: u64,
    flags: u32,
    object_timestamp: u64,
) -> Result<PacketRecord> {
    require_in_object(
        object_length,
        block_start,
        data_start,
        LinMessageHeader::SIZE,
        "LIN_MESSAGE",
    )?;

    let raw = ctx.fetch(data_start, LinMessageHeader::SIZE)?;
    let header = LinMessageHeader::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("LIN_MESSAGE: {e}")))?;

    let dlc = header.dlc & 0x0f;
    let id = header.id & 0x3f;
    let payload_length = dlc.min(8) as usize;

    let mut data = Vec::with_capacity(8 + payload_length);
    data.push(1); // message format revision
    data.extend_from_slice(&[0, 0, 0]);
    data.push(dlc << 4); // dlc (4 bit) | type (2 bit) | checksum type (2 bit)
    data.push(id); // parity (2 bit) | id (6 bit)
    data.push((header.crc & 0xff) as u8);
    data.push(0); // errors
    data.extend_from_slice(&header.data[..payload_length]);

    let len = data.len() as u32;
    let mut record = build_record(
        ctx.interfaces,
        ctx.start_offset_ns,
        flags,
        object_timestamp,
        LinkLayer::Lin,
        header.channel,
        HW_CHANNEL_NONE,
        len,
        len,
        data,
    );
    record.direction = Some(PacketDirection::from_blf(header.direction as u16));
    Ok(record)
}
