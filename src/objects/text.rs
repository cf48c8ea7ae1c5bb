//! APP_TEXT decoder
//!
//! APP_TEXT objects carry free-form UTF-8 with a source tag that changes
//! their meaning entirely:
//!
//! - channel descriptions name an interface and emit nothing;
//! - metadata may span several consecutive objects and is emitted as one
//!   exported-PDU record once the sequence ends;
//! - comments, attachments and trace lines each become a single
//!   exported-PDU record.

use std::io::{Read, Seek};

use binrw::BinRead;

use crate::format::{
    AppTextHeader, APPTEXT_ATTACHMENT, APPTEXT_CHANNEL, APPTEXT_COMMENT, APPTEXT_METADATA,
    APPTEXT_TRACELINE, BUSTYPE_CAN, BUSTYPE_ETHERNET, BUSTYPE_FLEXRAY, BUSTYPE_LIN, BUSTYPE_WLAN,
};
use crate::record::{
    build_record, ExportedPdu, EXP_PDU_TAG_COL_INFO_TEXT, EXP_PDU_TAG_COL_PROT_TEXT,
    EXP_PDU_TAG_DISSECTOR_NAME,
};
use crate::types::{BlfError, LinkLayer, PacketRecord, Result, HW_CHANNEL_NONE};

use super::{require_in_object, DecodeContext};

/// What an APP_TEXT object amounted to
pub(crate) enum AppTextOutcome {
    /// Nothing to emit (channel description or unknown source)
    Skip,
    /// Metadata sequence continues in the next object
    Continue,
    /// Metadata sequence finished; the record covers all buffered objects
    Metadata(PacketRecord),
    /// Stand-alone text record
    Record(PacketRecord),
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_app_text<R: Read + Seek>(
    ctx: &mut DecodeContext<'_, R>,
    block_start: u64,
    data_start: u64,
    object_length: u64,
    flags: u32,
    object_timestamp: u64,
    metadata_buf: &mut Vec<u8>,
    metadata_cont: bool,
) -> Result<AppTextOutcome> {
    require_in_object(
        object_length,
        block_start,
        data_start,
        AppTextHeader::SIZE,
        "APP_TEXT",
    )?;

    let raw = ctx.fetch(data_start, AppTextHeader::SIZE)?;
    let header = AppTextHeader::read(&mut std::io::Cursor::new(&raw[..]))
        .map_err(|e| BlfError::BadFile(format!("APP_TEXT: {e}")))?;

    let mut text = Vec::new();
    text.try_reserve_exact(header.text_length as usize)
        .map_err(|_| BlfError::OutOfMemory)?;
    text.resize(header.text_length as usize, 0);
    ctx.containers
        .read_exact_at(ctx.fh, data_start + AppTextHeader::SIZE as u64, &mut text)?;

    match header.source {
        APPTEXT_CHANNEL => {
            let text = String::from_utf8_lossy(&text);
            // Semicolon-separated; the second token is the display name.
            let Some(name) = text.split(';').nth(1) else {
                return Ok(AppTextOutcome::Skip);
            };
            let channel = ((header.reserved1 >> 8) & 0xff) as u16;
            let link_layer = match (header.reserved1 >> 16) & 0xff {
                BUSTYPE_CAN => LinkLayer::SocketCan,
                BUSTYPE_FLEXRAY => LinkLayer::FlexRay,
                BUSTYPE_LIN => LinkLayer::Lin,
                BUSTYPE_ETHERNET => LinkLayer::Ethernet,
                BUSTYPE_WLAN => LinkLayer::Ieee80211,
                _ => LinkLayer::Unknown,
            };
            // Lookup creates the interface if it does not exist yet.
            ctx.interfaces
                .lookup(link_layer, channel, HW_CHANNEL_NONE, Some(name));
            Ok(AppTextOutcome::Skip)
        }
        APPTEXT_METADATA => {
            if !metadata_cont {
                let mut pdu = ExportedPdu::new();
                pdu.string_tag(EXP_PDU_TAG_DISSECTOR_NAME, "data-text-lines");
                pdu.string_tag(EXP_PDU_TAG_COL_PROT_TEXT, "BLF App text");
                pdu.string_tag(EXP_PDU_TAG_COL_INFO_TEXT, "Metadata");
                *metadata_buf = pdu.end();
            }
            metadata_buf.extend_from_slice(&text);

            if header.reserved1 & 0x00ff_ffff > header.text_length {
                // More of this logical message follows in the next object.
                return Ok(AppTextOutcome::Continue);
            }

            let data = std::mem::take(metadata_buf);
            let len = data.len() as u32;
            let record = build_record(
                ctx.interfaces,
                ctx.start_offset_ns,
                flags,
                object_timestamp,
                LinkLayer::UpperPdu,
                0,
                HW_CHANNEL_NONE,
                len,
                len,
                data,
            );
            Ok(AppTextOutcome::Metadata(record))
        }
        APPTEXT_COMMENT | APPTEXT_ATTACHMENT | APPTEXT_TRACELINE => {
            let mut pdu = ExportedPdu::new();
            pdu.string_tag(EXP_PDU_TAG_DISSECTOR_NAME, "data-text-lines");
            pdu.string_tag(EXP_PDU_TAG_COL_PROT_TEXT, "BLF App text");
            let info = match header.source {
                APPTEXT_COMMENT => "Comment",
                APPTEXT_ATTACHMENT => "Attachment",
                _ => "Trace line",
            };
            pdu.string_tag(EXP_PDU_TAG_COL_INFO_TEXT, info);
            let mut data = pdu.end();

            // The blob may carry embedded NULs; only the leading C string
            // is kept.
            let text_len = text.iter().position(|&b| b == 0).unwrap_or(text.len());
            data.extend_from_slice(&text[..text_len]);

            let len = data.len() as u32;
            let record = build_record(
                ctx.interfaces,
                ctx.start_offset_ns,
                flags,
                object_timestamp,
                LinkLayer::UpperPdu,
                0,
                HW_CHANNEL_NONE,
                len,
                len,
                data,
            );
            Ok(AppTextOutcome::Record(record))
        }
        other => {
            log::debug!("unknown APP_TEXT source {other}, discarding");
            Ok(AppTextOutcome::Skip)
        }
    }
}
