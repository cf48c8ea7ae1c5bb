//! Record construction
//!
//! Every per-type decoder funnels through [`build_record`], which converts
//! the object timestamp into an absolute wall-clock time, resolves the
//! interface id, and wraps the normalized frame. Text-style objects
//! additionally wrap their payload in an exported-PDU preamble so downstream
//! dissectors know what to do with the blob.

use crate::format::{TIMESTAMP_RESOLUTION_10US, TIMESTAMP_RESOLUTION_1NS};
use crate::interface::InterfaceRegistry;
use crate::types::{LinkLayer, PacketRecord, Timestamp, TimestampPrecision};

#[allow(clippy::too_many_arguments)]
pub(crate) fn build_record(
    interfaces: &mut InterfaceRegistry,
    start_offset_ns: u64,
    flags: u32,
    object_timestamp: u64,
    link_layer: LinkLayer,
    channel: u16,
    hw_channel: u16,
    capture_len: u32,
    wire_len: u32,
    data: Vec<u8>,
) -> PacketRecord {
    let (ts_precision, total_ns) = match flags {
        TIMESTAMP_RESOLUTION_10US => (
            TimestampPrecision::TenMicroseconds,
            object_timestamp
                .saturating_mul(10_000)
                .saturating_add(start_offset_ns),
        ),
        TIMESTAMP_RESOLUTION_1NS => (
            TimestampPrecision::Nanoseconds,
            object_timestamp.saturating_add(start_offset_ns),
        ),
        other => {
            log::debug!("unhandled timestamp flags {other:#x}");
            (TimestampPrecision::Nanoseconds, 0)
        }
    };

    let interface_id = interfaces.lookup(link_layer, channel, hw_channel, None);

    PacketRecord {
        timestamp: Timestamp::from_total_ns(total_ns),
        ts_precision,
        since_start_ns: total_ns as i64 - start_offset_ns as i64,
        capture_len,
        wire_len,
        link_layer,
        interface_id,
        direction: None,
        queue: None,
        data,
        object_start: 0,
    }
}

// Exported-PDU option tags understood by downstream dissection.
pub(crate) const EXP_PDU_TAG_DISSECTOR_NAME: u16 = 12;
pub(crate) const EXP_PDU_TAG_COL_PROT_TEXT: u16 = 33;
pub(crate) const EXP_PDU_TAG_COL_INFO_TEXT: u16 = 36;

/// Builder for the exported-PDU preamble
///
/// Each option is a big-endian tag, the big-endian value length, the value,
/// and zero padding up to a 4-byte boundary; the length field counts the
/// value only, not the padding. The option list ends with a 4-byte all-zero
/// terminator and the payload follows it.
#[derive(Debug, Default)]
pub(crate) struct ExportedPdu {
    buf: Vec<u8>,
}

impl ExportedPdu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string_tag(&mut self, tag: u16, value: &str) -> &mut Self {
        let padding = (4 - value.len() % 4) % 4;
        self.buf.extend_from_slice(&tag.to_be_bytes());
        self.buf
            .extend_from_slice(&(value.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.extend_from_slice(&[0u8; 4][..padding]);
        self
    }

    /// Terminate the option list and hand back the buffer
    pub fn end(mut self) -> Vec<u8> {
        self.buf.extend_from_slice(&[0u8; 4]);
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HW_CHANNEL_NONE;

    #[test]
    fn test_ten_microsecond_resolution_is_exact() {
        let mut interfaces = InterfaceRegistry::new();
        let start_offset_ns = 5_000_000_000;
        let raw = 123_456u64;
        let record = build_record(
            &mut interfaces,
            start_offset_ns,
            TIMESTAMP_RESOLUTION_10US,
            raw,
            LinkLayer::SocketCan,
            0,
            HW_CHANNEL_NONE,
            8,
            8,
            vec![0; 8],
        );
        assert_eq!(record.ts_precision, TimestampPrecision::TenMicroseconds);
        assert_eq!(record.timestamp.total_ns() - start_offset_ns, raw * 10_000);
        assert!(record.timestamp.nsecs < 1_000_000_000);
        assert!(record.timestamp.total_ns() >= start_offset_ns);
        assert_eq!(record.since_start_ns, (raw * 10_000) as i64);
    }

    #[test]
    fn test_nanosecond_resolution_adds_offset() {
        let mut interfaces = InterfaceRegistry::new();
        let record = build_record(
            &mut interfaces,
            1_000_000_000,
            TIMESTAMP_RESOLUTION_1NS,
            1_500_000_123,
            LinkLayer::Ethernet,
            1,
            HW_CHANNEL_NONE,
            14,
            14,
            vec![0; 14],
        );
        assert_eq!(record.timestamp.secs, 2);
        assert_eq!(record.timestamp.nsecs, 500_000_123);
        assert_eq!(record.since_start_ns, 1_500_000_123);
    }

    #[test]
    fn test_unknown_resolution_zeroes_timestamp() {
        let mut interfaces = InterfaceRegistry::new();
        let record = build_record(
            &mut interfaces,
            1_000,
            7,
            42,
            LinkLayer::Lin,
            0,
            HW_CHANNEL_NONE,
            8,
            8,
            vec![0; 8],
        );
        assert_eq!(record.timestamp.total_ns(), 0);
        assert_eq!(record.ts_precision, TimestampPrecision::Nanoseconds);
    }

    #[test]
    fn test_record_interface_resolution() {
        let mut interfaces = InterfaceRegistry::new();
        let a = build_record(
            &mut interfaces,
            0,
            TIMESTAMP_RESOLUTION_1NS,
            0,
            LinkLayer::SocketCan,
            1,
            HW_CHANNEL_NONE,
            8,
            8,
            vec![],
        );
        let b = build_record(
            &mut interfaces,
            0,
            TIMESTAMP_RESOLUTION_1NS,
            0,
            LinkLayer::SocketCan,
            1,
            HW_CHANNEL_NONE,
            8,
            8,
            vec![],
        );
        let c = build_record(
            &mut interfaces,
            0,
            TIMESTAMP_RESOLUTION_1NS,
            0,
            LinkLayer::SocketCan,
            2,
            HW_CHANNEL_NONE,
            8,
            8,
            vec![],
        );
        assert_eq!(a.interface_id, b.interface_id);
        assert_ne!(a.interface_id, c.interface_id);
    }

    #[test]
    fn test_exported_pdu_wire_shape() {
        let mut pdu = ExportedPdu::new();
        pdu.string_tag(EXP_PDU_TAG_DISSECTOR_NAME, "data-text-lines");
        let buf = pdu.end();

        // tag 12, value length 15, 15 value bytes, 1 pad byte, 4-byte end;
        // the length field does not count the padding
        assert_eq!(&buf[0..2], &12u16.to_be_bytes());
        assert_eq!(&buf[2..4], &15u16.to_be_bytes());
        assert_eq!(&buf[4..19], b"data-text-lines");
        assert_eq!(buf[19], 0);
        assert_eq!(&buf[20..24], &[0, 0, 0, 0]);
        assert_eq!(buf.len(), 24);
    }

    #[test]
    fn test_exported_pdu_aligned_value_gets_no_padding() {
        let mut pdu = ExportedPdu::new();
        pdu.string_tag(EXP_PDU_TAG_COL_INFO_TEXT, "Metadata");
        let buf = pdu.end();
        assert_eq!(&buf[2..4], &8u16.to_be_bytes());
        assert_eq!(buf.len(), 4 + 8 + 4);
    }
}
