//! CAN decoders: classic messages, CAN FD, and error frames
//!
//! Every emitted frame is shaped like a SocketCAN frame regardless of the
//! host: a 4-byte big-endian id (with EFF/RTR/ERR flag bits folded in), a
//! length byte, three zero bytes, then the payload. Error objects become
//! fixed 16-byte SocketCAN error frames with the Vector CAN-core error code
//! mapped onto the SocketCAN protocol-error classes.

use std::io::{Cursor, Read, Seek};

use binrw::BinRead;

use crate::format::{
    CanErrorExtHeader, CanErrorHeader, CanFdError64Header, CanFdMessage64Header,
    CanFdMessageHeader, CanMessage2Trailer, CanMessageHeader, CANERROREXT_ECC_MEANING_BIT_ERROR,
    CANERROREXT_ECC_MEANING_CRC_ERROR, CANERROREXT_ECC_MEANING_FORM_ERROR,
    CANERROREXT_ECC_MEANING_NACK_ERROR, CANERROREXT_ECC_MEANING_OVERLOAD,
    CANERROREXT_ECC_MEANING_STUFF_ERROR, CANERROREXT_EXTECC_NOT_ACK, CANERROREXT_EXTECC_TX,
    CANERROREXT_FLAG_CANCORE, CANFDMESSAGE64_FLAG_EDL, CANFDMESSAGE64_FLAG_REMOTE_FRAME,
    CANFDMESSAGE_CANFDFLAG_EDL, CANMESSAGE_FLAG_RTR, CANMESSAGE_FLAG_TX, CANFD_DLC_TO_LENGTH,
    CAN_DLC_TO_LENGTH, CAN_ERR_ACK, CAN_ERR_DLC, CAN_ERR_FLAG, CAN_ERR_PROT,
    CAN_ERR_PROT_BIT, CAN_ERR_PROT_FORM, CAN_ERR_PROT_LOC_ACK, CAN_ERR_PROT_LOC_CRC_SEQ,
    CAN_ERR_PROT_OVERLOAD, CAN_ERR_PROT_STUFF, CAN_ERR_PROT_UNSPEC, CAN_RTR_FLAG, DIR_RX,
    DIR_TX,
};
use crate::record::build_record;
use crate::types::{BlfError, LinkLayer, PacketDirection, PacketRecord, Result, HW_CHANNEL_NONE};

use super::{require_in_object, DecodeContext};

/// Build the SocketCAN frame and wrap it in a record
///
/// `payload_length` is what the frame claims, `payload_length_valid` is how
/// much is actually copied out of the object; a truncated object yields a
/// partial frame with `wire_len` still reflecting the claim.
#[allow(clippy::too_many_arguments)]
fn can_record<R: Read + Seek>(
    ctx: &mut DecodeContext<'_, R>,
    can_id: u32,
    payload_length: u8,
    payload_length_valid: u8,
    payload_start: u64,
    flags: u32,
    object_timestamp: u64,
    channel: u16,
) -> Result<PacketRecord> {
    let mut data = Vec::with_capacity(8 + payload_length_valid as usize);
    data.extend_from_slice(&can_id.to_be_bytes());
    data.push(payload_length);
    data.extend_from_slice(&[0, 0, 0]);

    if payload_length_valid > 0 {
        let start = data.len();
        data.resize(start + payload_length_valid as usize, 0);
        ctx.containers
            .read_exact_at(ctx.fh, payload_start, &mut data[start..])?;
    }

    let capture_len = 8 + payload_length_valid as u32;
    let wire_len = 8 + payload_length as u32;
    Ok(build_record(
        ctx.interfaces,
        ctx.start_offset_ns,
        flags,
        object_timestamp,
        LinkLayer::SocketCan,
        channel,
        HW_CHANNEL_NONE,
        capture_len,
        wire_len,
        data,
    ))
}

pub(crate) fn decode_message<R: Read + Seek>(
    ctx: &mut DecodeContext<'_, R>,
    block_start: u64,
    data_start: u64,
    object_length: u64,
    flags: u32,
    object_timestamp: u64,
    can_message2: bool,
) -> Result<PacketRecord> {
    let what = if can_message2 { "CAN_MESSAGE2" } else { "CAN_MESSAGE" };
    require_in_object(object_length, block_start, data_start, CanMessageHeader::SIZE, what)?;

    let raw = ctx.fetch(data_start, CanMessageHeader::SIZE)?;
    let header = CanMessageHeader::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("{what}: {e}")))?;

    let dlc = header.dlc & 0x0f;
    let mut payload_length = dlc;
    if payload_length > 8 {
        log::debug!("classic CAN claims more than 8 bytes, cutting to 8");
        payload_length = 8;
    }

    let mut can_id = header.id;
    if header.flags & CANMESSAGE_FLAG_RTR == CANMESSAGE_FLAG_RTR {
        can_id |= CAN_RTR_FLAG;
        payload_length = 0;
    }

    let mut record = can_record(
        ctx,
        can_id,
        payload_length,
        payload_length,
        data_start + CanMessageHeader::SIZE as u64,
        flags,
        object_timestamp,
        header.channel,
    )?;

    if can_message2 {
        let trailer_start = data_start + CanMessageHeader::SIZE as u64 + 8;
        if object_length
            < (data_start - block_start)
                + (CanMessageHeader::SIZE + 8 + CanMessage2Trailer::SIZE) as u64
        {
            return Err(BlfError::BadFile(
                "CAN_MESSAGE2: not enough bytes for trailer".into(),
            ));
        }
        let raw_trailer = ctx.fetch(trailer_start, CanMessage2Trailer::SIZE)?;
        let _trailer = CanMessage2Trailer::read(&mut Cursor::new(&raw_trailer[..]))
            .map_err(|e| BlfError::BadFile(format!("CAN_MESSAGE2: {e}")))?;
    }

    let dir = if header.flags & CANMESSAGE_FLAG_TX == CANMESSAGE_FLAG_TX {
        DIR_TX
    } else {
        DIR_RX
    };
    record.direction = Some(PacketDirection::from_blf(dir));
    Ok(record)
}

pub(crate) fn decode_fd_message<R: Read + Seek>(
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
        CanFdMessageHeader::SIZE,
        "CAN_FD_MESSAGE",
    )?;

    let raw = ctx.fetch(data_start, CanFdMessageHeader::SIZE)?;
    let header = CanFdMessageHeader::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("CAN_FD_MESSAGE: {e}")))?;

    let dlc = header.dlc & 0x0f;
    let canfd = header.canfd_flags & CANFDMESSAGE_CANFDFLAG_EDL == CANFDMESSAGE_CANFDFLAG_EDL;
    let mut payload_length = if canfd {
        CANFD_DLC_TO_LENGTH[dlc as usize]
    } else {
        if dlc > 8 {
            log::debug!("classic CAN claims more than 8 bytes");
        }
        CAN_DLC_TO_LENGTH[dlc as usize]
    };

    if payload_length > header.valid_data_bytes {
        log::debug!("shortening CAN FD payload to the valid data bytes");
        payload_length = header.valid_data_bytes;
    }

    let mut can_id = header.id;
    if !canfd && header.flags & CANMESSAGE_FLAG_RTR == CANMESSAGE_FLAG_RTR {
        can_id |= CAN_RTR_FLAG;
        payload_length = 0;
    }

    let mut payload_length_valid = payload_length;
    let remaining = object_length - (data_start - block_start);
    if payload_length_valid as u64 > remaining {
        log::debug!("shortening CAN FD payload because the object is too short");
        payload_length_valid = remaining as u8;
    }

    let mut record = can_record(
        ctx,
        can_id,
        payload_length,
        payload_length_valid,
        data_start + CanFdMessageHeader::SIZE as u64,
        flags,
        object_timestamp,
        header.channel,
    )?;
    let dir = if header.flags & CANMESSAGE_FLAG_TX == CANMESSAGE_FLAG_TX {
        DIR_TX
    } else {
        DIR_RX
    };
    record.direction = Some(PacketDirection::from_blf(dir));
    Ok(record)
}

pub(crate) fn decode_fd_message64<R: Read + Seek>(
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
        CanFdMessage64Header::SIZE,
        "CAN_FD_MESSAGE_64",
    )?;

    let raw = ctx.fetch(data_start, CanFdMessage64Header::SIZE)?;
    let header = CanFdMessage64Header::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("CAN_FD_MESSAGE_64: {e}")))?;

    let dlc = header.dlc & 0x0f;
    let canfd = header.flags & CANFDMESSAGE64_FLAG_EDL == CANFDMESSAGE64_FLAG_EDL;
    let mut payload_length = if canfd {
        CANFD_DLC_TO_LENGTH[dlc as usize]
    } else {
        if dlc > 8 {
            log::debug!("classic CAN claims more than 8 bytes");
        }
        CAN_DLC_TO_LENGTH[dlc as usize]
    };

    if payload_length > header.valid_data_bytes {
        log::debug!("shortening CAN FD payload to the valid data bytes");
        payload_length = header.valid_data_bytes;
    }

    let mut can_id = header.id;
    if !canfd && header.flags & CANFDMESSAGE64_FLAG_REMOTE_FRAME == CANFDMESSAGE64_FLAG_REMOTE_FRAME
    {
        can_id |= CAN_RTR_FLAG;
        payload_length = 0;
    }

    let mut payload_length_valid = payload_length;
    let remaining = object_length - (data_start - block_start);
    if payload_length_valid as u64 > remaining {
        log::debug!("shortening CAN FD payload because the object is too short");
        payload_length_valid = remaining as u8;
    }

    let mut record = can_record(
        ctx,
        can_id,
        payload_length,
        payload_length_valid,
        data_start + CanFdMessage64Header::SIZE as u64,
        flags,
        object_timestamp,
        header.channel as u16,
    )?;
    record.direction = Some(PacketDirection::from_blf(header.direction as u16));
    Ok(record)
}

pub(crate) fn decode_error<R: Read + Seek>(
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
        CanErrorHeader::SIZE,
        "CAN_ERROR",
    )?;

    let raw = ctx.fetch(data_start, CanErrorHeader::SIZE)?;
    let header = CanErrorHeader::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("CAN_ERROR: {e}")))?;

    let mut frame = [0u8; 16];
    frame[..4].copy_from_slice(&CAN_ERR_FLAG.to_be_bytes());
    frame[4] = CAN_ERR_DLC;

    Ok(build_record(
        ctx.interfaces,
        ctx.start_offset_ns,
        flags,
        object_timestamp,
        LinkLayer::SocketCan,
        header.channel,
        HW_CHANNEL_NONE,
        frame.len() as u32,
        frame.len() as u32,
        frame.to_vec(),
    ))
}

/// Map a Vector CAN-core extended error code onto the SocketCAN error frame
///
/// Fills payload bytes 10 and 11 and reports which id-level error classes
/// (protocol, acknowledgement) apply.
fn map_can_core_error(error_code_ext: u16, frame: &mut [u8; 16]) -> (bool, bool) {
    let mut err_prot = false;
    let mut err_ack = false;

    match (error_code_ext >> 6) & 0x3f {
        CANERROREXT_ECC_MEANING_BIT_ERROR => {
            err_prot = true;
            frame[10] = CAN_ERR_PROT_BIT;
        }
        CANERROREXT_ECC_MEANING_FORM_ERROR => {
            err_prot = true;
            frame[10] = CAN_ERR_PROT_FORM;
        }
        CANERROREXT_ECC_MEANING_STUFF_ERROR => {
            err_prot = true;
            frame[10] = CAN_ERR_PROT_STUFF;
        }
        CANERROREXT_ECC_MEANING_CRC_ERROR => {
            err_prot = true;
            frame[11] = CAN_ERR_PROT_LOC_CRC_SEQ;
        }
        CANERROREXT_ECC_MEANING_NACK_ERROR => {
            err_ack = true;
            frame[11] = CAN_ERR_PROT_LOC_ACK;
        }
        CANERROREXT_ECC_MEANING_OVERLOAD => {
            err_prot = true;
            frame[10] = CAN_ERR_PROT_OVERLOAD;
        }
        _ => {
            err_prot = true;
            frame[10] = CAN_ERR_PROT_UNSPEC;
        }
    }

    err_ack = err_ack || error_code_ext & CANERROREXT_EXTECC_NOT_ACK == 0;
    if err_ack {
        // Acknowledgement errors do not carry the protocol error class.
        err_prot = false;
    }
    (err_prot, err_ack)
}

fn can_error_frame(err_prot: bool, err_ack: bool, frame: &mut [u8; 16]) {
    let mut can_id = CAN_ERR_FLAG;
    if err_prot {
        can_id |= CAN_ERR_PROT;
    }
    if err_ack {
        can_id |= CAN_ERR_ACK;
    }
    frame[..4].copy_from_slice(&can_id.to_be_bytes());
    frame[4] = CAN_ERR_DLC;
}

pub(crate) fn decode_error_ext<R: Read + Seek>(
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
        CanErrorExtHeader::SIZE,
        "CAN_ERROR_EXT",
    )?;

    let raw = ctx.fetch(data_start, CanErrorExtHeader::SIZE)?;
    let header = CanErrorExtHeader::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("CAN_ERROR_EXT: {e}")))?;

    let mut frame = [0u8; 16];
    let mut err_prot = false;
    let mut err_ack = false;
    if header.flags & CANERROREXT_FLAG_CANCORE == CANERROREXT_FLAG_CANCORE {
        (err_prot, err_ack) = map_can_core_error(header.error_code_ext, &mut frame);
    }
    can_error_frame(err_prot, err_ack, &mut frame);

    let mut record = build_record(
        ctx.interfaces,
        ctx.start_offset_ns,
        flags,
        object_timestamp,
        LinkLayer::SocketCan,
        header.channel,
        HW_CHANNEL_NONE,
        frame.len() as u32,
        frame.len() as u32,
        frame.to_vec(),
    );
    if header.flags & CANERROREXT_FLAG_CANCORE == CANERROREXT_FLAG_CANCORE {
        let dir = if header.error_code_ext & CANERROREXT_EXTECC_TX == CANERROREXT_EXTECC_TX {
            DIR_TX
        } else {
            DIR_RX
        };
        record.direction = Some(PacketDirection::from_blf(dir));
    }
    Ok(record)
}

pub(crate) fn decode_fd_error64<R: Read + Seek>(
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
        CanFdError64Header::SIZE,
        "CAN_FD_ERROR_64",
    )?;

    let raw = ctx.fetch(data_start, CanFdError64Header::SIZE)?;
    let header = CanFdError64Header::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("CAN_FD_ERROR_64: {e}")))?;

    let mut frame = [0u8; 16];
    let mut err_prot = false;
    let mut err_ack = false;
    if header.flags as u32 & CANERROREXT_FLAG_CANCORE == CANERROREXT_FLAG_CANCORE {
        (err_prot, err_ack) = map_can_core_error(header.error_code_ext, &mut frame);
    }
    can_error_frame(err_prot, err_ack, &mut frame);

    let mut record = build_record(
        ctx.interfaces,
        ctx.start_offset_ns,
        flags,
        object_timestamp,
        LinkLayer::SocketCan,
        header.channel as u16,
        HW_CHANNEL_NONE,
        frame.len() as u32,
        frame.len() as u32,
        frame.to_vec(),
    );
    if header.flags as u32 & CANERROREXT_FLAG_CANCORE == CANERROREXT_FLAG_CANCORE {
        let dir = if header.error_code_ext & CANERROREXT_EXTECC_TX == CANERROREXT_EXTECC_TX {
            DIR_TX
        } else {
            DIR_RX
        };
        record.direction = Some(PacketDirection::from_blf(dir));
    }
    Ok(record)
}
