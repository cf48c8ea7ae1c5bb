//! On-disk layouts of the BLF file format
//!
//! Every multi-byte field in a BLF file is little-endian and structs are
//! packed without padding. Each layout here is a `binrw` struct with an
//! explicit `SIZE` constant; decoders fetch exactly `SIZE` bytes through the
//! virtual reader and parse them from memory. Failing to produce a full
//! struct is a file-format error, never a partial read.

use binrw::BinRead;

/// File header magic, ASCII `LOGG`
pub const FILE_MAGIC: &[u8; 4] = b"LOGG";
/// Block header magic, ASCII `LOBJ`
pub const OBJECT_MAGIC: &[u8; 4] = b"LOBJ";

// Block header types. Only the default type may appear at the top level.
pub const HEADER_TYPE_DEFAULT: u16 = 1;
pub const HEADER_TYPE_2: u16 = 2;
pub const HEADER_TYPE_3: u16 = 3;

// Object types handled by the demultiplexer.
pub const OBJTYPE_CAN_MESSAGE: u32 = 1;
pub const OBJTYPE_CAN_ERROR: u32 = 2;
pub const OBJTYPE_LOG_CONTAINER: u32 = 10;
pub const OBJTYPE_LIN_MESSAGE: u32 = 11;
pub const OBJTYPE_FLEXRAY_DATA: u32 = 29;
pub const OBJTYPE_FLEXRAY_MESSAGE: u32 = 41;
pub const OBJTYPE_FLEXRAY_RCVMESSAGE: u32 = 50;
pub const OBJTYPE_APP_TEXT: u32 = 65;
pub const OBJTYPE_FLEXRAY_RCVMESSAGE_EX: u32 = 66;
pub const OBJTYPE_ETHERNET_FRAME: u32 = 71;
pub const OBJTYPE_CAN_ERROR_EXT: u32 = 73;
pub const OBJTYPE_CAN_MESSAGE2: u32 = 86;
pub const OBJTYPE_WLAN_FRAME: u32 = 90;
pub const OBJTYPE_CAN_FD_MESSAGE: u32 = 100;
pub const OBJTYPE_CAN_FD_MESSAGE_64: u32 = 101;
pub const OBJTYPE_ETHERNET_STATUS: u32 = 103;
pub const OBJTYPE_CAN_FD_ERROR_64: u32 = 104;
pub const OBJTYPE_ETHERNET_FRAME_EX: u32 = 120;

// Log container compression methods.
pub const COMPRESSION_NONE: u16 = 0;
pub const COMPRESSION_ZLIB: u16 = 2;

// Timestamp resolution encoded in the log object header flags.
pub const TIMESTAMP_RESOLUTION_10US: u32 = 1;
pub const TIMESTAMP_RESOLUTION_1NS: u32 = 2;

// Direction codes shared by most object types.
pub const DIR_RX: u16 = 0;
pub const DIR_TX: u16 = 1;
pub const DIR_TX_RQ: u16 = 2;

// CAN message header flags.
pub const CANMESSAGE_FLAG_TX: u8 = 0x01;
pub const CANMESSAGE_FLAG_RTR: u8 = 0x80;

// CAN FD flags (`canfd_flags` byte of CAN_FD_MESSAGE).
pub const CANFDMESSAGE_CANFDFLAG_EDL: u8 = 0x01;

// CAN_FD_MESSAGE_64 flag word.
pub const CANFDMESSAGE64_FLAG_REMOTE_FRAME: u32 = 0x0010;
pub const CANFDMESSAGE64_FLAG_EDL: u32 = 0x1000;

// CAN_ERROR_EXT / CAN_FD_ERROR_64 flag word and extended error code bits.
pub const CANERROREXT_FLAG_SJA: u32 = 0x01;
pub const CANERROREXT_FLAG_CANCORE: u32 = 0x02;
pub const CANERROREXT_EXTECC_TX: u16 = 0x1000;
pub const CANERROREXT_EXTECC_NOT_ACK: u16 = 0x2000;

// Meanings of the top 6 bits of the extended error code.
pub const CANERROREXT_ECC_MEANING_BIT_ERROR: u16 = 0x0;
pub const CANERROREXT_ECC_MEANING_FORM_ERROR: u16 = 0x1;
pub const CANERROREXT_ECC_MEANING_STUFF_ERROR: u16 = 0x2;
pub const CANERROREXT_ECC_MEANING_CRC_ERROR: u16 = 0x3;
pub const CANERROREXT_ECC_MEANING_NACK_ERROR: u16 = 0x4;
pub const CANERROREXT_ECC_MEANING_OVERLOAD: u16 = 0x5;

// SocketCAN id flags and error classes synthesized into emitted frames.
pub const CAN_EFF_FLAG: u32 = 0x8000_0000;
pub const CAN_RTR_FLAG: u32 = 0x4000_0000;
pub const CAN_ERR_FLAG: u32 = 0x2000_0000;
pub const CAN_ERR_PROT: u32 = 0x0000_0008;
pub const CAN_ERR_ACK: u32 = 0x0000_0020;
pub const CAN_ERR_DLC: u8 = 8;
pub const CAN_ERR_PROT_UNSPEC: u8 = 0x00;
pub const CAN_ERR_PROT_BIT: u8 = 0x01;
pub const CAN_ERR_PROT_FORM: u8 = 0x02;
pub const CAN_ERR_PROT_STUFF: u8 = 0x04;
pub const CAN_ERR_PROT_OVERLOAD: u8 = 0x20;
pub const CAN_ERR_PROT_LOC_CRC_SEQ: u8 = 0x08;
pub const CAN_ERR_PROT_LOC_ACK: u8 = 0x19;

/// Classic CAN DLC to payload length
pub const CAN_DLC_TO_LENGTH: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 8, 8, 8, 8, 8, 8, 8];
/// CAN FD DLC to payload length
pub const CANFD_DLC_TO_LENGTH: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

// FlexRay measurement-header bits (first byte).
pub const FLEXRAY_FRAME: u8 = 0x01;
pub const FLEXRAY_CHANNEL_B: u8 = 0x80;

// FlexRay frame-flag bits packed into the third measurement-header byte.
pub const FLEXRAY_HDR_STFI: u8 = 0x04;
pub const FLEXRAY_HDR_NFI: u8 = 0x08;
pub const FLEXRAY_HDR_SFI: u8 = 0x10;
pub const FLEXRAY_HDR_PPI: u8 = 0x20;

// FLEXRAY_MESSAGE frame-state bits.
pub const FLEXRAYMESSAGE_STATE_PPI: u16 = 0x01;
pub const FLEXRAYMESSAGE_STATE_SFI: u16 = 0x02;
pub const FLEXRAYMESSAGE_STATE_NFI: u16 = 0x08;
pub const FLEXRAYMESSAGE_STATE_STFI: u16 = 0x10;

// FLEXRAY_RCVMESSAGE channel mask and data-flag bits.
pub const FLEXRAYRCVMSG_CHANNELMASK_A: u16 = 0x01;
pub const FLEXRAYRCVMSG_DATA_FLAG_NULL_FRAME: u32 = 0x01;
pub const FLEXRAYRCVMSG_DATA_FLAG_SYNC: u32 = 0x04;
pub const FLEXRAYRCVMSG_DATA_FLAG_STARTUP: u32 = 0x08;
pub const FLEXRAYRCVMSG_DATA_FLAG_PAYLOAD_PREAM: u32 = 0x10;

// APP_TEXT sources.
pub const APPTEXT_COMMENT: u32 = 0;
pub const APPTEXT_CHANNEL: u32 = 1;
pub const APPTEXT_METADATA: u32 = 2;
pub const APPTEXT_ATTACHMENT: u32 = 3;
pub const APPTEXT_TRACELINE: u32 = 4;

// Bus types carried in APP_TEXT channel descriptions.
pub const BUSTYPE_CAN: u32 = 1;
pub const BUSTYPE_LIN: u32 = 5;
pub const BUSTYPE_FLEXRAY: u32 = 7;
pub const BUSTYPE_ETHERNET: u32 = 11;
pub const BUSTYPE_WLAN: u32 = 13;

// ETHERNET_STATUS flag: the hardware channel field is valid.
pub const ETH_STATUS_HARDWARECHANNEL: u16 = 0x0100;

/// Maximum snap length advertised on interface descriptors
pub const MAX_SNAP_LEN: u32 = 262_144;

/// Wall-clock date as stored in the file header (SYSTEMTIME layout)
#[derive(Debug, Clone, Copy, Default, BinRead)]
#[br(little)]
pub struct BlfDate {
    pub year: u16,
    pub month: u16,
    pub dayofweek: u16,
    pub day: u16,
    pub hour: u16,
    pub mins: u16,
    pub sec: u16,
    pub ms: u16,
}

/// File header, read once at open
///
/// The on-disk header is `header_length` bytes long; everything past the
/// fields below is reserved and skipped.
#[derive(Debug, Clone, BinRead)]
#[br(little, magic = b"LOGG")]
pub struct FileHeader {
    pub header_length: u32,
    pub application_id: u8,
    pub application_version: [u8; 3],
    pub api_version: [u8; 4],
    pub len_compressed: u64,
    pub len_uncompressed: u64,
    pub object_count: u32,
    pub objects_read: u32,
    pub start_date: BlfDate,
    pub end_date: BlfDate,
    pub reserved: u32,
}

impl FileHeader {
    /// Fixed prefix read from the file, including the magic
    pub const SIZE: usize = 76;
}

/// Block header preceding every object
#[derive(Debug, Clone, BinRead)]
#[br(little, magic = b"LOBJ")]
pub struct BlockHeader {
    pub header_length: u16,
    pub header_type: u16,
    /// Total object length, including all headers
    pub object_length: u32,
    pub object_type: u32,
}

impl BlockHeader {
    pub const SIZE: usize = 16;

    /// Distance from the object start to the next object
    ///
    /// Guards against writers that set `object_length` to zero: the cursor
    /// always advances by at least one block header.
    pub fn skip_length(&self) -> u64 {
        (self.object_length as u64)
            .max(self.header_length as u64)
            .max(Self::SIZE as u64)
    }
}

/// Log object header, default variant (header type 1)
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct LogObjectHeader {
    pub flags: u32,
    pub client_index: u16,
    pub object_version: u16,
    pub object_timestamp: u64,
}

impl LogObjectHeader {
    pub const SIZE: usize = 16;
}

/// Log object header, variant 2
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct LogObjectHeader2 {
    pub flags: u32,
    pub timestamp_status: u8,
    pub reserved: u8,
    pub object_version: u16,
    pub object_timestamp: u64,
    pub original_timestamp: u64,
}

impl LogObjectHeader2 {
    pub const SIZE: usize = 24;
}

/// Log object header, variant 3
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct LogObjectHeader3 {
    pub flags: u32,
    pub static_size: u16,
    pub reserved: [u8; 6],
    pub object_version: u16,
    pub object_timestamp: u64,
}

impl LogObjectHeader3 {
    pub const SIZE: usize = 22;
}

/// Log container header, following the block header of a container object
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct LogContainerHeader {
    pub compression_method: u16,
    pub reserved1: u16,
    pub reserved2: u32,
    pub uncompressed_size: u32,
    pub reserved4: u32,
}

impl LogContainerHeader {
    pub const SIZE: usize = 16;
}

/// ETHERNET_FRAME object header
///
/// The format splits and reorders the Ethernet header; the decoder
/// reconstructs a canonical frame from these fields.
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct EthernetFrameHeader {
    pub src_addr: [u8; 6],
    pub channel: u16,
    pub dst_addr: [u8; 6],
    pub direction: u16,
    pub ethtype: u16,
    pub tpid: u16,
    pub tci: u16,
    pub payload_length: u16,
    pub reserved: u64,
}

impl EthernetFrameHeader {
    pub const SIZE: usize = 32;
}

/// ETHERNET_FRAME_EX object header; the payload is already a complete frame
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct EthernetFrameExHeader {
    pub struct_length: u16,
    pub flags: u16,
    pub channel: u16,
    pub hw_channel: u16,
    pub frame_duration: u64,
    pub frame_checksum: u32,
    pub direction: u16,
    pub frame_length: u16,
    pub frame_handle: u32,
    pub error: u32,
}

impl EthernetFrameExHeader {
    pub const SIZE: usize = 32;
}

/// WLAN_FRAME object header
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct WlanFrameHeader {
    pub channel: u16,
    pub flags: u16,
    pub direction: u8,
    pub radio_channel: u8,
    pub signal_strength: u16,
    pub signal_quality: u16,
    pub frame_length: u16,
    pub reserved: u32,
}

impl WlanFrameHeader {
    pub const SIZE: usize = 16;
}

/// CAN_MESSAGE / CAN_MESSAGE2 object header
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct CanMessageHeader {
    pub channel: u16,
    pub flags: u8,
    pub dlc: u8,
    pub id: u32,
}

impl CanMessageHeader {
    pub const SIZE: usize = 8;
}

/// Trailer after the 8 payload bytes of a CAN_MESSAGE2
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct CanMessage2Trailer {
    pub frame_length_ns: u32,
    pub bit_count: u8,
    pub reserved1: u8,
    pub reserved2: u16,
}

impl CanMessage2Trailer {
    pub const SIZE: usize = 8;
}

/// CAN_FD_MESSAGE object header
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct CanFdMessageHeader {
    pub channel: u16,
    pub flags: u8,
    pub dlc: u8,
    pub id: u32,
    pub frame_length_ns: u32,
    pub arbitration_bit_count: u8,
    pub canfd_flags: u8,
    pub valid_data_bytes: u8,
    pub reserved1: u8,
    pub reserved2: u32,
}

impl CanFdMessageHeader {
    pub const SIZE: usize = 20;
}

/// CAN_FD_MESSAGE_64 object header
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct CanFdMessage64Header {
    pub channel: u8,
    pub dlc: u8,
    pub valid_data_bytes: u8,
    pub tx_count: u8,
    pub id: u32,
    pub frame_length_ns: u32,
    pub flags: u32,
    pub btr_cfg_arb: u32,
    pub btr_cfg_data: u32,
    pub time_offset_brs_ns: u32,
    pub time_offset_crc_del_ns: u32,
    pub bit_count: u16,
    pub direction: u8,
    pub ext_data_offset: u8,
    pub crc: u32,
}

impl CanFdMessage64Header {
    pub const SIZE: usize = 36;
}

/// CAN_ERROR object header
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct CanErrorHeader {
    pub channel: u16,
    pub length: u16,
}

impl CanErrorHeader {
    pub const SIZE: usize = 4;
}

/// CAN_ERROR_EXT object header
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct CanErrorExtHeader {
    pub channel: u16,
    pub length: u16,
    pub flags: u32,
    pub ecc: u8,
    pub position: u8,
    pub dlc: u8,
    pub reserved1: u8,
    pub frame_length_ns: u32,
    pub id: u32,
    pub error_code_ext: u16,
    pub reserved2: u16,
}

impl CanErrorExtHeader {
    pub const SIZE: usize = 24;
}

/// CAN_FD_ERROR_64 object header
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct CanFdError64Header {
    pub channel: u8,
    pub dlc: u8,
    pub valid_data_bytes: u8,
    pub ecc: u8,
    pub flags: u16,
    pub error_code_ext: u16,
    pub ext_flags: u16,
    pub ext_data_offset: u8,
    pub reserved1: u8,
    pub id: u32,
    pub frame_length_ns: u32,
    pub btr_cfg_arb: u32,
    pub btr_cfg_data: u32,
    pub time_offset_brs_ns: u32,
    pub time_offset_crc_del_ns: u32,
    pub crc: u32,
    pub error_position: u16,
    pub reserved2: u16,
}

impl CanFdError64Header {
    pub const SIZE: usize = 44;
}

/// FLEXRAY_DATA object header
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct FlexRayDataHeader {
    pub channel: u16,
    pub mux: u8,
    pub len: u8,
    pub message_id: u16,
    pub crc: u16,
    pub direction: u8,
    pub reserved1: u8,
    pub reserved2: u16,
}

impl FlexRayDataHeader {
    pub const SIZE: usize = 12;
}

/// FLEXRAY_MESSAGE object header
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct FlexRayMessageHeader {
    pub channel: u16,
    pub direction: u8,
    pub low_time: u8,
    pub fpga_tick: u32,
    pub fpga_tick_overflow: u32,
    pub client_index: u32,
    pub cluster_time: u32,
    pub frame_id: u16,
    pub header_crc: u16,
    pub frame_state: u16,
    pub length: u8,
    pub cycle: u8,
    pub header_bit_mask: u8,
    pub reserved1: u8,
    pub reserved2: u16,
}

impl FlexRayMessageHeader {
    pub const SIZE: usize = 32;
}

/// FLEXRAY_RCVMESSAGE object header
///
/// The EX variant carries 40 additional bytes after these fields; none of
/// them feed the synthesized measurement header.
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct FlexRayRcvMessageHeader {
    pub channel: u16,
    pub version: u16,
    pub channel_mask: u16,
    pub direction: u16,
    pub client_index: u32,
    pub cluster_no: u32,
    pub frame_id: u16,
    pub header_crc1: u16,
    pub header_crc2: u16,
    pub payload_length: u16,
    pub payload_length_valid: u16,
    pub cycle: u16,
    pub tag: u32,
    pub data: u32,
    pub frame_flags: u32,
    pub app_parameter: u32,
}

impl FlexRayRcvMessageHeader {
    pub const SIZE: usize = 40;
    /// Extra header bytes carried by FLEXRAY_RCVMESSAGE_EX
    pub const EX_EXTRA: usize = 40;
}

/// LIN_MESSAGE object; carries its payload inline
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct LinMessageHeader {
    pub channel: u16,
    pub id: u8,
    pub dlc: u8,
    pub data: [u8; 8],
    pub fsm_id: u8,
    pub fsm_state: u8,
    pub header_time: u8,
    pub full_time: u8,
    pub crc: u16,
    pub direction: u8,
    pub reserved: u8,
}

impl LinMessageHeader {
    pub const SIZE: usize = 20;
}

/// APP_TEXT object header; `text_length` bytes of UTF-8 follow
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct AppTextHeader {
    pub source: u32,
    pub reserved1: u32,
    pub text_length: u32,
    pub reserved2: u32,
}

impl AppTextHeader {
    pub const SIZE: usize = 16;
}

/// ETHERNET_STATUS object header
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct EthernetStatusHeader {
    pub channel: u16,
    pub flags: u16,
    pub link_status: u8,
    pub ethernet_phy: u8,
    pub duplex: u8,
    pub mdi: u8,
    pub connector: u8,
    pub clock_mode: u8,
    pub pairs: u8,
    pub hardware_channel: u8,
    pub bitrate: u32,
}

impl EthernetStatusHeader {
    pub const SIZE: usize = 16;
}
