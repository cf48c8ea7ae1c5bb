//! FlexRay decoders
//!
//! All four FlexRay object flavors normalize to the same shape: a 7-byte
//! measurement header (channel flag, error flags, packed frame header with
//! frame id, payload length, header CRC and cycle) followed by the payload.

use std::io::{Cursor, Read, Seek};

use binrw::BinRead;

use crate::format::{
    FlexRayDataHeader, FlexRayMessageHeader, FlexRayRcvMessageHeader, FLEXRAYMESSAGE_STATE_NFI,
    FLEXRAYMESSAGE_STATE_PPI, FLEXRAYMESSAGE_STATE_SFI, FLEXRAYMESSAGE_STATE_STFI,
    FLEXRAYRCVMSG_CHANNELMASK_A, FLEXRAYRCVMSG_DATA_FLAG_NULL_FRAME,
    FLEXRAYRCVMSG_DATA_FLAG_PAYLOAD_PREAM, FLEXRAYRCVMSG_DATA_FLAG_STARTUP,
    FLEXRAYRCVMSG_DATA_FLAG_SYNC, FLEXRAY_CHANNEL_B, FLEXRAY_FRAME, FLEXRAY_HDR_NFI,
    FLEXRAY_HDR_PPI, FLEXRAY_HDR_SFI, FLEXRAY_HDR_STFI,
};
use crate::record::build_record;
use crate::types::{BlfError, LinkLayer, PacketDirection, PacketRecord, Result, HW_CHANNEL_NONE};

use super::{require_in_object, DecodeContext};

/// Bytes 3 to 6 of the measurement header, identical for every variant
fn measurement_tail(frame_id: u16, payload_len: u8, header_crc: u16, cycle: u8) -> [u8; 4] {
    [
        (frame_id & 0x00ff) as u8,
        (payload_len & 0xfe) | ((header_crc & 0x0400) >> 10) as u8,
        ((header_crc & 0x03fc) >> 2) as u8,
        (((header_crc & 0x0003) << 6) as u8) | (cycle & 0x3f),
    ]
}

/// Assemble the record from a finished measurement header and the payload
#[allow(clippy::too_many_arguments)]
fn flexray_record<R: Read + Seek>(
    ctx: &mut DecodeContext<'_, R>,
    measurement: [u8; 7],
    payload_length: u16,
    payload_length_valid: u16,
    payload_start: u64,
    flags: u32,
    object_timestamp: u64,
    channel: u16,
    direction: u16,
) -> Result<PacketRecord> {
    let mut data = Vec::with_capacity(7 + payload_length_valid as usize);
    data.extend_from_slice(&measurement);
    if payload_length_valid > 0 {
        let start = data.len();
        data.resize(start + payload_length_valid as usize, 0);
        ctx.containers
            .read_exact_at(ctx.fh, payload_start, &mut data[start..])?;
    }

    let capture_len = 7 + payload_length_valid as u32;
    let wire_len = 7 + payload_length as u32;
    let mut record = build_record(
        ctx.interfaces,
        ctx.start_offset_ns,
        flags,
        object_timestamp,
        LinkLayer::FlexRay,
        channel,
        HW_CHANNEL_NONE,
        capture_len,
        wire_len,
        data,
    );
    record.direction = Some(PacketDirection::from_blf(direction));
    Ok(record)
}

pub(crate) fn decode_data<R: Read + Seek>(
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
        FlexRayDataHeader::SIZE,
        "FLEXRAY_DATA",
    )?;

    let raw = ctx.fetch(data_start, FlexRayDataHeader::SIZE)?;
    let header = FlexRayDataHeader::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("FLEXRAY_DATA: {e}")))?;

    let payload_length = header.len as u16;
    if header.len & 0x01 == 0x01 {
        log::debug!("odd FlexRay payload length");
    }

    let mut payload_length_valid = payload_length;
    let available = object_length - (data_start - block_start) - FlexRayDataHeader::SIZE as u64;
    if payload_length_valid as u64 > available {
        log::debug!("shortening FlexRay payload because the object is too short");
        payload_length_valid = available as u16;
    }

    if header.channel != 0 && header.channel != 1 {
        log::debug!("FlexRay supports only two channels");
    }

    let mut measurement = [0u8; 7];
    measurement[0] = if header.channel == 0 {
        FLEXRAY_FRAME
    } else {
        FLEXRAY_FRAME | FLEXRAY_CHANNEL_B
    };
    measurement[1] = 0;
    measurement[2] = FLEXRAY_HDR_PPI | ((header.message_id & 0x0700) >> 8) as u8;
    measurement[3..7].copy_from_slice(&measurement_tail(
        header.message_id,
        header.len,
        header.crc,
        header.mux,
    ));

    flexray_record(
        ctx,
        measurement,
        payload_length,
        payload_length_valid,
        data_start + FlexRayDataHeader::SIZE as u64,
        flags,
        object_timestamp,
        header.channel,
        header.direction as u16,
    )
}

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
        FlexRayMessageHeader::SIZE,
        "FLEXRAY_MESSAGE",
    )?;

    let raw = ctx.fetch(data_start, FlexRayMessageHeader::SIZE)?;
    let header = FlexRayMessageHeader::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("FLEXRAY_MESSAGE: {e}")))?;

    let payload_length = header.length as u16;
    if header.length & 0x01 == 0x01 {
        log::debug!("odd FlexRay payload length");
    }

    let mut payload_length_valid = payload_length;
    let available =
        object_length - (data_start - block_start) - FlexRayMessageHeader::SIZE as u64;
    if payload_length_valid as u64 > available {
        log::debug!("shortening FlexRay payload because the object is too short");
        payload_length_valid = available as u16;
    }

    if header.channel != 0 && header.channel != 1 {
        log::debug!("FlexRay supports only two channels");
    }

    let mut measurement = [0u8; 7];
    measurement[0] = if header.channel == 0 {
        FLEXRAY_FRAME
    } else {
        FLEXRAY_FRAME | FLEXRAY_CHANNEL_B
    };
    measurement[1] = 0;
    measurement[2] = ((header.frame_id & 0x0700) >> 8) as u8;
    if header.frame_state & FLEXRAYMESSAGE_STATE_PPI == FLEXRAYMESSAGE_STATE_PPI {
        measurement[2] |= FLEXRAY_HDR_PPI;
    }
    if header.frame_state & FLEXRAYMESSAGE_STATE_SFI == FLEXRAYMESSAGE_STATE_SFI {
        measurement[2] |= FLEXRAY_HDR_SFI;
    }
    if header.frame_state & FLEXRAYMESSAGE_STATE_NFI != FLEXRAYMESSAGE_STATE_NFI {
        // The null-frame indicator is stored inverted.
        measurement[2] |= FLEXRAY_HDR_NFI;
    }
    if header.frame_state & FLEXRAYMESSAGE_STATE_STFI == FLEXRAYMESSAGE_STATE_STFI {
        measurement[2] |= FLEXRAY_HDR_STFI;
    }
    measurement[3..7].copy_from_slice(&measurement_tail(
        header.frame_id,
        header.length,
        header.header_crc,
        header.cycle,
    ));

    flexray_record(
        ctx,
        measurement,
        payload_length,
        payload_length_valid,
        data_start + FlexRayMessageHeader::SIZE as u64,
        flags,
        object_timestamp,
        header.channel,
        header.direction as u16,
    )
}

pub(crate) fn decode_rcv_message<R: Read + Seek>(
    ctx: &mut DecodeContext<'_, R>,
    block_start: u64,
    data_start: u64,
    object_length: u64,
    flags: u32,
    object_timestamp: u64,
    ext: bool,
) -> Result<PacketRecord> {
    let header_size = if ext {
        FlexRayRcvMessageHeader::SIZE + FlexRayRcvMessageHeader::EX_EXTRA
    } else {
        FlexRayRcvMessageHeader::SIZE
    };
    let what = if ext {
        "FLEXRAY_RCVMESSAGE_EX"
    } else {
        "FLEXRAY_RCVMESSAGE"
    };
    require_in_object(object_length, block_start, data_start, header_size, what)?;

    let raw = ctx.fetch(data_start, FlexRayRcvMessageHeader::SIZE)?;
    let mut header = FlexRayRcvMessageHeader::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("{what}: {e}")))?;

    if !ext {
        header.direction &= 0xff;
        header.cycle &= 0xff;
    }

    let payload_length = header.payload_length;
    let mut payload_length_valid = header.payload_length_valid;

    if header.payload_length & 0x01 == 0x01 {
        log::debug!("odd FlexRay payload length");
    }

    let available = object_length - (data_start - block_start) - header_size as u64;
    if payload_length_valid as u64 > available {
        log::debug!("shortening FlexRay payload because the object is too short");
        payload_length_valid = available as u16;
    }

    let mut measurement = [0u8; 7];
    measurement[0] = if header.channel_mask == FLEXRAYRCVMSG_CHANNELMASK_A {
        FLEXRAY_FRAME
    } else {
        FLEXRAY_FRAME | FLEXRAY_CHANNEL_B
    };
    measurement[1] = 0;
    measurement[2] = ((header.frame_id & 0x0700) >> 8) as u8;
    if header.data & FLEXRAYRCVMSG_DATA_FLAG_PAYLOAD_PREAM == FLEXRAYRCVMSG_DATA_FLAG_PAYLOAD_PREAM
    {
        measurement[2] |= FLEXRAY_HDR_PPI;
    }
    if header.data & FLEXRAYRCVMSG_DATA_FLAG_SYNC == FLEXRAYRCVMSG_DATA_FLAG_SYNC {
        measurement[2] |= FLEXRAY_HDR_SFI;
    }
    if header.data & FLEXRAYRCVMSG_DATA_FLAG_NULL_FRAME != FLEXRAYRCVMSG_DATA_FLAG_NULL_FRAME {
        // The null-frame indicator is stored inverted.
        measurement[2] |= FLEXRAY_HDR_NFI;
    }
    if header.data & FLEXRAYRCVMSG_DATA_FLAG_STARTUP == FLEXRAYRCVMSG_DATA_FLAG_STARTUP {
        measurement[2] |= FLEXRAY_HDR_STFI;
    }
    measurement[3..7].copy_from_slice(&measurement_tail(
        header.frame_id,
        header.payload_length as u8,
        header.header_crc1,
        header.cycle as u8,
    ));

    flexray_record(
        ctx,
        measurement,
        payload_length,
        payload_length_valid,
        data_start + header_size as u64,
        flags,
        object_timestamp,
        header.channel_mask,
        header.direction,
    )
}
