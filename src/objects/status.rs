//! Ethernet link-status decoder
//!
//! Status objects are not packets; they are re-packed into a big-endian
//! 16-byte blob behind an exported-PDU wrapper addressed to the
//! `blf-ethernetstatus-obj` dissector. Each status stream gets its own
//! synthetic interface, distinct from the data-plane Ethernet interface of
//! the same channel, because one interface can only carry one link layer.

use std::io::{Cursor, Read, Seek};

use binrw::BinRead;

use crate::format::{EthernetStatusHeader, ETH_STATUS_HARDWARECHANNEL};
use crate::record::{build_record, ExportedPdu, EXP_PDU_TAG_DISSECTOR_NAME};
use crate::types::{BlfError, LinkLayer, PacketRecord, Result};

use super::{require_in_object, DecodeContext};

pub(crate) fn decode_ethernet_status<R: Read + Seek>(
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
        EthernetStatusHeader::SIZE,
        "ETHERNET_STATUS",
    )?;

    let raw = ctx.fetch(data_start, EthernetStatusHeader::SIZE)?;
    let header = EthernetStatusHeader::read(&mut Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("ETHERNET_STATUS: {e}")))?;

    let mut packed = [0u8; 16];
    packed[0..2].copy_from_slice(&header.channel.to_be_bytes());
    packed[2..4].copy_from_slice(&header.flags.to_be_bytes());
    packed[4] = header.link_status;
    packed[5] = header.ethernet_phy;
    packed[6] = header.duplex;
    packed[7] = header.mdi;
    packed[8] = header.connector;
    packed[9] = header.clock_mode;
    packed[10] = header.pairs;
    packed[11] = header.hardware_channel;
    packed[12..16].copy_from_slice(&header.bitrate.to_be_bytes());

    let mut pdu = ExportedPdu::new();
    pdu.string_tag(EXP_PDU_TAG_DISSECTOR_NAME, "blf-ethernetstatus-obj");
    let mut data = pdu.end();
    data.extend_from_slice(&packed);

    let hw_channel = header.hardware_channel as u16;
    let name = format!("STATUS-ETH-{}-{}", header.channel, header.hardware_channel);
    ctx.interfaces
        .lookup(LinkLayer::UpperPdu, header.channel, hw_channel, Some(&name));

    let len = data.len() as u32;
    let mut record = build_record(
        ctx.interfaces,
        ctx.start_offset_ns,
        flags,
        object_timestamp,
        LinkLayer::UpperPdu,
        header.channel,
        hw_channel,
        len,
        len,
        data,
    );
    if header.flags & ETH_STATUS_HARDWARECHANNEL == ETH_STATUS_HARDWARECHANNEL {
        record.queue = Some(header.hardware_channel as u32);
    }
    Ok(record)
}
