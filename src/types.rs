//! Core types for the BLF reader library
//!
//! This module defines everything the reader emits when processing a trace:
//! decoded packet records, interface descriptors, and the error type. The
//! reader is stateless with respect to payload interpretation - it normalizes
//! each log object into a link-layer frame and leaves dissection to the
//! caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for reader operations
pub type Result<T> = std::result::Result<T, BlfError>;

/// Sentinel for "no hardware channel" in interface keys and records
pub const HW_CHANNEL_NONE: u16 = u16::MAX;

/// Errors that can occur while opening or decoding a BLF file
#[derive(Debug, thiserror::Error)]
pub enum BlfError {
    /// The input is too short for a file header or the magic does not match.
    /// Only returned from open.
    #[error("not a BLF file")]
    NotMine,

    /// The file is structurally invalid and decoding cannot continue
    #[error("invalid BLF file: {0}")]
    BadFile(String),

    /// The zlib stream of a log container could not be inflated
    #[error("log container decompression failed: {0}")]
    Decompress(String),

    /// Unknown compression method, unknown block header type, or a log
    /// container nested inside another log container
    #[error("unsupported BLF feature: {0}")]
    Unsupported(String),

    /// Allocation failure while caching a log container
    #[error("out of memory while caching log container")]
    OutOfMemory,

    /// An invariant of the container index was violated; unreachable in
    /// well-formed files
    #[error("internal error: {0}")]
    Internal(String),

    /// The underlying input ended inside data the index says should exist
    #[error("short read inside log container data")]
    ShortRead,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Link-layer encapsulation of an emitted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkLayer {
    /// Ethernet frame (classic and extended objects)
    Ethernet,
    /// IEEE 802.11 frame
    Ieee80211,
    /// SocketCAN-shaped CAN frame (classic, FD and error objects)
    SocketCan,
    /// FlexRay frame behind a synthesized measurement header
    FlexRay,
    /// LIN frame behind a synthesized message header
    Lin,
    /// Exported-PDU wrapped blob (application text, Ethernet status)
    UpperPdu,
    /// Bus type the reader does not recognize
    Unknown,
}

impl LinkLayer {
    /// Stable numeric code used in interface keys and fallback names
    pub fn code(self) -> u32 {
        match self {
            LinkLayer::Ethernet => 1,
            LinkLayer::Ieee80211 => 2,
            LinkLayer::SocketCan => 3,
            LinkLayer::FlexRay => 4,
            LinkLayer::Lin => 5,
            LinkLayer::UpperPdu => 6,
            LinkLayer::Unknown => 0xffff_ffff,
        }
    }
}

impl fmt::Display for LinkLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkLayer::Ethernet => write!(f, "Ethernet"),
            LinkLayer::Ieee80211 => write!(f, "IEEE 802.11"),
            LinkLayer::SocketCan => write!(f, "SocketCAN"),
            LinkLayer::FlexRay => write!(f, "FlexRay"),
            LinkLayer::Lin => write!(f, "LIN"),
            LinkLayer::UpperPdu => write!(f, "Upper PDU"),
            LinkLayer::Unknown => write!(f, "Unknown"),
        }
    }
}

/// File-wide encapsulation summary
///
/// Starts as `Unset`, becomes the first interface's link layer, and falls
/// back to `PerPacket` as soon as two interfaces disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileEncap {
    Unset,
    Single(LinkLayer),
    PerPacket,
}

/// Direction of a frame relative to the capture port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketDirection {
    Inbound,
    Outbound,
    Undetermined,
}

impl PacketDirection {
    /// EPB-flags option value (option code 0x0002): 1 inbound, 2 outbound,
    /// 0 undetermined
    pub fn epb_flags(self) -> u32 {
        match self {
            PacketDirection::Inbound => 1,
            PacketDirection::Outbound => 2,
            PacketDirection::Undetermined => 0,
        }
    }

    /// Map a BLF direction code (0 RX, 1 TX, 2 TX request)
    pub(crate) fn from_blf(code: u16) -> Self {
        match code {
            0 => PacketDirection::Inbound,
            1 | 2 => PacketDirection::Outbound,
            _ => PacketDirection::Undetermined,
        }
    }
}

/// Timestamp resolution a record was logged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampPrecision {
    TenMicroseconds,
    Nanoseconds,
}

/// Absolute wall-clock timestamp, split into seconds and nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub secs: u64,
    pub nsecs: u32,
}

impl Timestamp {
    pub(crate) fn from_total_ns(total_ns: u64) -> Self {
        Timestamp {
            secs: total_ns / 1_000_000_000,
            nsecs: (total_ns % 1_000_000_000) as u32,
        }
    }

    /// Total nanoseconds since the Unix epoch
    pub fn total_ns(&self) -> u64 {
        self.secs * 1_000_000_000 + self.nsecs as u64
    }

    /// Convert to a chrono `DateTime<Utc>` if representable
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.secs as i64, self.nsecs)
    }
}

/// One decoded packet, owned by the caller
///
/// `data` is always a copy; it never aliases the reader's container cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    /// Absolute timestamp (object timestamp plus the capture start offset)
    pub timestamp: Timestamp,
    /// Resolution the object timestamp was logged with
    pub ts_precision: TimestampPrecision,
    /// Nanoseconds since the start of the capture
    pub since_start_ns: i64,
    /// Bytes present in `data`
    pub capture_len: u32,
    /// Bytes the frame had on the wire
    pub wire_len: u32,
    /// Link-layer encapsulation of `data`
    pub link_layer: LinkLayer,
    /// Identifier assigned by the interface registry
    pub interface_id: u32,
    /// Frame direction, when the object records one
    pub direction: Option<PacketDirection>,
    /// Hardware queue, when the object records one
    pub queue: Option<u32>,
    /// Normalized link-layer frame
    pub data: Vec<u8>,
    /// Virtual offset of the object this record came from; passing it to
    /// `read_record_at` yields the same record again
    pub object_start: u64,
}

/// A logical capture interface, lazily materialized per
/// (link layer, channel, hardware channel) triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub interface_id: u32,
    pub link_layer: LinkLayer,
    pub channel: u16,
    /// `HW_CHANNEL_NONE` when not applicable
    pub hw_channel: u16,
    pub name: String,
    /// Power-of-ten timestamp resolution exponent; always 9 (nanoseconds)
    pub ts_resolution_exponent: u8,
    pub snap_len: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_split_and_total() {
        let ts = Timestamp::from_total_ns(1_714_153_940_123_456_789);
        assert_eq!(ts.secs, 1_714_153_940);
        assert_eq!(ts.nsecs, 123_456_789);
        assert_eq!(ts.total_ns(), 1_714_153_940_123_456_789);
        assert!(ts.nsecs < 1_000_000_000);
    }

    #[test]
    fn test_timestamp_datetime() {
        let ts = Timestamp { secs: 0, nsecs: 0 };
        assert_eq!(ts.to_datetime().unwrap().timestamp(), 0);
    }

    #[test]
    fn test_direction_epb_values() {
        assert_eq!(PacketDirection::from_blf(0).epb_flags(), 1);
        assert_eq!(PacketDirection::from_blf(1).epb_flags(), 2);
        assert_eq!(PacketDirection::from_blf(2).epb_flags(), 2);
        assert_eq!(PacketDirection::from_blf(7).epb_flags(), 0);
    }

    #[test]
    fn test_link_layer_codes_distinct() {
        let all = [
            LinkLayer::Ethernet,
            LinkLayer::Ieee80211,
            LinkLayer::SocketCan,
            LinkLayer::FlexRay,
            LinkLayer::Lin,
            LinkLayer::UpperPdu,
            LinkLayer::Unknown,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }
}
