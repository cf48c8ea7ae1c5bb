//! Ethernet and WLAN frame decoders
//!
//! The classic ETHERNET_FRAME object splits the Ethernet header apart and
//! stores the fields out of order; [`decode_frame`] rebuilds a canonical
//! frame, re-inserting the 802.1Q tag when one was captured. The EX variant
//! and WLAN_FRAME already carry complete frames.

use std::io::{Cursor, Read, Seek};

use binrw::BinRead;

use crate::format::{EthernetFrameExHeader, EthernetFrameHeader, WlanFrameHeader};
use crate::record::build_record;
use crate::types::{BlfError, LinkLayer, PacketDirection, PacketRecord, Result, HW_CHANNEL_NONE};

use super::{require_in_object, DecodeContext};

pub(crate) fn decode_frame<R: Read + Seek>(
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
        EthernetFrameHeader::SIZE,
        "ETHERNET_FRAME",
    )?;

    let raw = ctx.fetch(data_start, EthernetFrameHeader::SIZE)?;
    let header = EthernetFrameHeader::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("ETHERNET_FRAME: {e}")))?;

    let mut frame = Vec::with_capacity(18 + header.payload_length as usize);
    frame.extend_from_slice(&header.dst_addr);
    frame.extend_from_slice(&header.src_addr);
    if header.tpid != 0 && header.tci != 0 {
        frame.extend_from_slice(&header.tpid.to_be_bytes());
        frame.extend_from_slice(&header.tci.to_be_bytes());
    }
    frame.extend_from_slice(&header.ethtype.to_be_bytes());

    let header_len = frame.len();
    frame.resize(header_len + header.payload_length as usize, 0);
    ctx.containers.read_exact_at(
        ctx.fh,
        data_start + EthernetFrameHeader::SIZE as u64,
        &mut frame[header_len..],
    )?;

    let frame_len = frame.len() as u32;
    let mut record = build_record(
        ctx.interfaces,
        ctx.start_offset_ns,
        flags,
        object_timestamp,
        LinkLayer::Ethernet,
        header.channel,
        HW_CHANNEL_NONE,
        frame_len,
        frame_len,
        frame,
    );
    record.direction = Some(PacketDirection::from_blf(header.direction));
    Ok(record)
}

pub(crate) fn decode_frame_ex<R: Read + Seek>(
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
        EthernetFrameExHeader::SIZE,
        "ETHERNET_FRAME_EX",
    )?;

    let raw = ctx.fetch(data_start, EthernetFrameExHeader::SIZE)?;
    let header = EthernetFrameExHeader::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("ETHERNET_FRAME_EX: {e}")))?;

    let available =
        object_length - (data_start - block_start) - EthernetFrameExHeader::SIZE as u64;
    if available < header.frame_length as u64 {
        return Err(BlfError::BadFile("ETHERNET_FRAME_EX: frame too short".into()));
    }

    let frame = ctx.fetch(
        data_start + EthernetFrameExHeader::SIZE as u64,
        header.frame_length as usize,
    )?;

    let mut record = build_record(
        ctx.interfaces,
        ctx.start_offset_ns,
        flags,
        object_timestamp,
        LinkLayer::Ethernet,
        header.channel,
        header.hw_channel,
        header.frame_length as u32,
        header.frame_length as u32,
        frame,
    );
    record.queue = Some(header.hw_channel as u32);
    record.direction = Some(PacketDirection::from_blf(header.direction));
    Ok(record)
}

pub(crate) fn decode_wlan_frame<R: Read + Seek>(
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
        WlanFrameHeader::SIZE,
        "WLAN_FRAME",
    )?;

    let raw = ctx.fetch(data_start, WlanFrameHeader::SIZE)?;
    let header = WlanFrameHeader::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("WLAN_FRAME: {e}")))?;

    let available = object_length - (data_start - block_start) - WlanFrameHeader::SIZE as u64;
    if available < header.frame_length as u64 {
        return Err(BlfError::BadFile("WLAN_FRAME: frame too short".into()));
    }

    let frame = ctx.fetch(
        data_start + WlanFrameHeader::SIZE as u64,
        header.frame_length as usize,
    )?;

    let mut record = build_record(
        ctx.interfaces,
        ctx.start_offset_ns,
        flags,
        object_timestamp,
        LinkLayer::Ieee80211,
        header.channel,
        HW_CHANNEL_NONE,
        header.frame_length as u32,
        header.frame_length as u32,
        frame,
    );
    record.direction = Some(PacketDirection::from_blf(header.direction as u16));
    Ok(record)
}
