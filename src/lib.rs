//! BLF trace reader library
//!
//! A read-only decoder for the Binary Log File (BLF) format written by
//! automotive bus-trace tools. A BLF file is a sequence of compressed log
//! containers carrying a heterogeneous stream of timestamped bus events:
//! CAN (classic, FD and error frames), Ethernet, WLAN, FlexRay, LIN,
//! Ethernet link status, and application text.
//!
//! # Architecture
//!
//! - Log containers are indexed once at open; their decompressed payloads
//!   form a single virtual byte stream that objects are addressed in.
//! - zlib containers are inflated lazily and cached until the reader is
//!   dropped; reads may span container boundaries.
//! - Each object is normalized into a [`PacketRecord`]: an absolute
//!   nanosecond timestamp, a link-layer encapsulation, an interface id, and
//!   a canonical frame (SocketCAN shape for CAN, reconstructed Ethernet
//!   with its VLAN tag, a FlexRay measurement header, and so on).
//! - Interfaces are created lazily per (link layer, channel, hardware
//!   channel) triple and can be named retroactively by channel-description
//!   text objects.
//!
//! The library does NOT write BLF, capture live traffic, or dissect
//! payloads beyond the link layer.
//!
//! # Example
//!
//! ```no_run
//! use blf_reader::BlfReader;
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let file = BufReader::new(File::open("trace.blf").unwrap());
//! let mut reader = BlfReader::open(file).unwrap();
//! for record in reader.records() {
//!     match record {
//!         Ok(packet) => println!(
//!             "{}.{:09} {} bytes on interface {}",
//!             packet.timestamp.secs, packet.timestamp.nsecs,
//!             packet.capture_len, packet.interface_id
//!         ),
//!         Err(e) => eprintln!("decode error: {e}"),
//!     }
//! }
//! ```

pub mod format;
pub mod reader;
pub mod types;

mod container;
mod interface;
mod objects;
mod record;

pub use reader::{BlfReader, Records};
pub use types::{
    BlfError, FileEncap, InterfaceDescriptor, LinkLayer, PacketDirection, PacketRecord, Result,
    Timestamp, TimestampPrecision, HW_CHANNEL_NONE,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_garbage_is_not_mine() {
        let cursor = std::io::Cursor::new(b"not a blf file at all".to_vec());
        assert!(matches!(BlfReader::open(cursor), Err(BlfError::NotMine)));
    }
}
