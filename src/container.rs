//! Log container index, cache, and virtual reads
//!
//! A BLF file is a sequence of log containers whose payloads, once
//! decompressed, form one continuous virtual byte stream:
//!
//! ```text
//! uncompressed log container data
//! uncompressed log container data
//! ...
//! ```
//!
//! All object offsets used by the demultiplexer reference this virtual
//! layout, not the file. Uncompressed containers are read straight from the
//! file; zlib containers are inflated on first access and the buffer is kept
//! until the reader is dropped.

use std::io::{Cursor, Read, Seek, SeekFrom};

use binrw::BinRead;
use zune_inflate::{DeflateDecoder, DeflateOptions};

use crate::format::{
    BlockHeader, LogContainerHeader, COMPRESSION_NONE, COMPRESSION_ZLIB, HEADER_TYPE_DEFAULT,
    OBJTYPE_LOG_CONTAINER,
};
use crate::types::{BlfError, Result};

/// Compression method of a log container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Compression {
    None,
    Zlib,
    Other(u16),
}

impl Compression {
    fn from_raw(method: u16) -> Self {
        match method {
            COMPRESSION_NONE => Compression::None,
            COMPRESSION_ZLIB => Compression::Zlib,
            other => Compression::Other(other),
        }
    }
}

/// One log container, mapping a virtual range onto a file range
#[derive(Debug)]
pub(crate) struct LogContainer {
    /// Offset of the container's `LOBJ` magic in the file
    pub file_start: u64,
    /// Offset where the (possibly compressed) payload begins
    pub file_data_start: u64,
    /// Declared object length of the container
    pub file_length: u64,
    /// First virtual offset covered by this container
    pub virt_start: u64,
    /// Uncompressed payload size
    pub virt_length: u64,
    pub compression: Compression,
    /// Inflated payload, exactly `virt_length` bytes; zlib containers only
    cached: Option<Vec<u8>>,
}

impl LogContainer {
    fn covers(&self, virt: u64) -> bool {
        self.virt_start <= virt && virt < self.virt_start + self.virt_length
    }
}

/// Ordered index over all log containers of an open file
///
/// Built once at open time; the descriptor list is immutable afterwards,
/// only the per-container caches change.
#[derive(Debug, Default)]
pub(crate) struct ContainerIndex {
    containers: Vec<LogContainer>,
}

/// Read as many bytes as the source can provide, tolerating partial reads
pub(crate) fn read_fully<R: Read>(fh: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match fh.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

impl ContainerIndex {
    /// Scan the file for log containers, starting at the current position
    ///
    /// Trailing bytes that do not form a complete block header are accepted
    /// silently; some writers pad the end of the file with zeros. A stray
    /// byte sequence that is not `LOBJ` is skipped one byte at a time.
    pub fn scan<R: Read + Seek>(fh: &mut R) -> Result<Self> {
        let mut containers: Vec<LogContainer> = Vec::new();
        let mut virt_total: u64 = 0;
        let mut pos = fh.stream_position()?;

        loop {
            fh.seek(SeekFrom::Start(pos))?;
            let mut raw = [0u8; BlockHeader::SIZE];
            if read_fully(fh, &mut raw)? < raw.len() {
                log::debug!("end of file while scanning for log containers");
                break;
            }

            let header = match BlockHeader::read(&mut Cursor::new(&raw[..])) {
                Ok(header) => header,
                Err(binrw::Error::BadMagic { .. }) => {
                    log::debug!("object magic is not LOBJ (pos {:#x})", pos);
                    pos += 1;
                    continue;
                }
                Err(e) => {
                    return Err(BlfError::BadFile(format!("unreadable block header: {e}")));
                }
            };

            if header.header_type != HEADER_TYPE_DEFAULT {
                return Err(BlfError::BadFile(format!(
                    "block header type {} at top level, expected {}",
                    header.header_type, HEADER_TYPE_DEFAULT
                )));
            }

            if header.object_type == OBJTYPE_LOG_CONTAINER {
                if (header.header_length as usize) < BlockHeader::SIZE {
                    return Err(BlfError::BadFile(
                        "log container header length too short".into(),
                    ));
                }

                // Skip any extra bytes between the block header and the
                // container header.
                fh.seek(SeekFrom::Start(pos + header.header_length as u64))?;
                let mut raw_container = [0u8; LogContainerHeader::SIZE];
                if read_fully(fh, &mut raw_container)? < raw_container.len() {
                    return Err(BlfError::BadFile(
                        "not enough bytes for log container header".into(),
                    ));
                }
                let container_header =
                    LogContainerHeader::read(&mut Cursor::new(&raw_container[..])).map_err(
                        |e| BlfError::BadFile(format!("unreadable log container header: {e}")),
                    )?;

                containers.push(LogContainer {
                    file_start: pos,
                    file_data_start: pos
                        + header.header_length as u64
                        + LogContainerHeader::SIZE as u64,
                    file_length: header.object_length as u64,
                    virt_start: virt_total,
                    virt_length: container_header.uncompressed_size as u64,
                    compression: Compression::from_raw(container_header.compression_method),
                    cached: None,
                });
                virt_total += container_header.uncompressed_size as u64;
            } else {
                log::debug!(
                    "top-level object type {} outside a log container, skipping",
                    header.object_type
                );
            }

            pos += header.skip_length();
        }

        Ok(ContainerIndex { containers })
    }

    /// Total length of the virtual byte stream
    pub fn virtual_len(&self) -> u64 {
        self.containers
            .last()
            .map(|c| c.virt_start + c.virt_length)
            .unwrap_or(0)
    }

    fn find(&self, virt: u64) -> Option<usize> {
        self.containers.iter().position(|c| c.covers(virt))
    }

    /// Inflate a zlib container into its cache, if not already resident
    fn pull<R: Read + Seek>(&mut self, fh: &mut R, index: usize) -> Result<()> {
        let container = &self.containers[index];
        if container.cached.is_some() {
            return Ok(());
        }

        if container.file_data_start < container.file_start {
            return Err(BlfError::Internal(format!(
                "container {index}: data start {:#x} before container start {:#x}",
                container.file_data_start, container.file_start
            )));
        }
        let header_bytes = container.file_data_start - container.file_start;
        if container.file_length < header_bytes {
            return Err(BlfError::Internal(format!(
                "container {index}: length {} shorter than its headers ({header_bytes})",
                container.file_length
            )));
        }
        let data_length = container.file_length - header_bytes;
        if data_length > u32::MAX as u64 || container.virt_length > u32::MAX as u64 {
            return Err(BlfError::Internal(format!(
                "container {index}: sizes exceed 32 bits"
            )));
        }

        fh.seek(SeekFrom::Start(container.file_data_start))?;
        let mut compressed = Vec::new();
        compressed
            .try_reserve_exact(data_length as usize)
            .map_err(|_| BlfError::OutOfMemory)?;
        compressed.resize(data_length as usize, 0);
        fh.read_exact(&mut compressed).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                BlfError::Internal("short read on compressed container data".into())
            } else {
                BlfError::Io(e)
            }
        })?;

        let virt_length = container.virt_length as usize;
        let options = DeflateOptions::default()
            .set_limit(virt_length)
            .set_size_hint(virt_length);
        let mut decoder = DeflateDecoder::new_with_options(&compressed, options);
        let mut data = decoder
            .decode_zlib()
            .map_err(|e| BlfError::Decompress(format!("{e:?}")))?;

        // The declared uncompressed size is authoritative; a stream that
        // finished early leaves the tail zeroed.
        if data.len() < virt_length {
            log::debug!(
                "container {index}: inflated {} of {} declared bytes",
                data.len(),
                virt_length
            );
            data.resize(virt_length, 0);
        }

        self.containers[index].cached = Some(data);
        Ok(())
    }

    /// Copy `out.len()` bytes starting at virtual offset `virt`
    ///
    /// Returns `Ok(false)` when either end of the requested range lies
    /// beyond the virtual stream; the caller decides whether that is a clean
    /// end of file or an error. The copy may span several containers, all of
    /// which must share the start container's compression mode.
    pub fn read_or_eof<R: Read + Seek>(
        &mut self,
        fh: &mut R,
        virt: u64,
        out: &mut [u8],
    ) -> Result<bool> {
        if out.is_empty() {
            return Ok(true);
        }

        let Some(start_index) = self.find(virt) else {
            log::debug!("cannot read: start position {virt:#x} is outside every log container");
            return Ok(false);
        };
        let Some(end_index) = self.find(virt + out.len() as u64 - 1) else {
            log::debug!("cannot read: end position is outside every log container");
            return Ok(false);
        };

        let mut copied = 0usize;
        let mut start_in_container = (virt - self.containers[start_index].virt_start) as usize;

        match self.containers[start_index].compression {
            Compression::None => {
                for index in start_index..=end_index {
                    let container = &self.containers[index];
                    let data_left = container.virt_length as usize - start_in_container;
                    fh.seek(SeekFrom::Start(
                        container.file_data_start + start_in_container as u64,
                    ))?;
                    let wanted = out.len() - copied;
                    if data_left < wanted {
                        fh.read_exact(&mut out[copied..copied + data_left])
                            .map_err(eof_to_short_read)?;
                        copied += data_left;
                        start_in_container = 0;
                    } else {
                        fh.read_exact(&mut out[copied..]).map_err(eof_to_short_read)?;
                        return Ok(true);
                    }
                }
            }
            Compression::Zlib => {
                for index in start_index..=end_index {
                    self.pull(fh, index)?;
                    let container = &self.containers[index];
                    let cached = container.cached.as_deref().ok_or_else(|| {
                        BlfError::Internal("pulling in container failed hard".into())
                    })?;
                    let data_left = cached.len() - start_in_container;
                    let wanted = out.len() - copied;
                    if data_left < wanted {
                        out[copied..copied + data_left]
                            .copy_from_slice(&cached[start_in_container..]);
                        copied += data_left;
                        start_in_container = 0;
                    } else {
                        out[copied..].copy_from_slice(
                            &cached[start_in_container..start_in_container + wanted],
                        );
                        return Ok(true);
                    }
                }
            }
            Compression::Other(method) => {
                return Err(BlfError::Unsupported(format!(
                    "unknown compression method {method}"
                )));
            }
        }

        Err(BlfError::Internal(
            "ran out of containers mid-read".into(),
        ))
    }

    /// Like [`read_or_eof`], but an unmapped range is a short read
    pub fn read_exact_at<R: Read + Seek>(
        &mut self,
        fh: &mut R,
        virt: u64,
        out: &mut [u8],
    ) -> Result<()> {
        if self.read_or_eof(fh, virt, out)? {
            Ok(())
        } else {
            Err(BlfError::ShortRead)
        }
    }

    #[cfg(test)]
    pub(crate) fn containers(&self) -> &[LogContainer] {
        &self.containers
    }
}

fn eof_to_short_read(e: std::io::Error) -> BlfError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        BlfError::ShortRead
    } else {
        BlfError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{COMPRESSION_NONE, COMPRESSION_ZLIB};

    fn container_block(compression: u16, uncompressed_size: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"LOBJ");
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&(32 + payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&OBJTYPE_LOG_CONTAINER.to_le_bytes());
        out.extend_from_slice(&compression.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&uncompressed_size.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// zlib stream containing `data` in a single stored deflate block
    fn zlib_stored(data: &[u8]) -> Vec<u8> {
        assert!(data.len() < 65_536);
        let mut out = vec![0x78, 0x01];
        out.push(0x01);
        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
        out.extend_from_slice(&(!(data.len() as u16)).to_le_bytes());
        out.extend_from_slice(data);
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for &byte in data {
            a = (a + byte as u32) % 65_521;
            b = (b + a) % 65_521;
        }
        out.extend_from_slice(&((b << 16) | a).to_be_bytes());
        out
    }

    #[test]
    fn test_scan_builds_tiled_index() {
        let mut file = Vec::new();
        file.extend_from_slice(&container_block(COMPRESSION_NONE, 100, &[0xaa; 100]));
        file.extend_from_slice(&container_block(COMPRESSION_NONE, 50, &[0xbb; 50]));

        let mut cursor = Cursor::new(file);
        let index = ContainerIndex::scan(&mut cursor).unwrap();
        let containers = index.containers();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].virt_start, 0);
        assert_eq!(containers[0].virt_length, 100);
        assert_eq!(containers[1].virt_start, 100);
        assert_eq!(containers[1].virt_length, 50);
        assert_eq!(
            containers[0].virt_start + containers[0].virt_length,
            containers[1].virt_start
        );
        assert_eq!(index.virtual_len(), 150);
    }

    #[test]
    fn test_scan_tolerates_trailing_padding() {
        let mut file = container_block(COMPRESSION_NONE, 10, &[0x11; 10]);
        file.extend_from_slice(&[0u8; 7]);

        let mut cursor = Cursor::new(file);
        let index = ContainerIndex::scan(&mut cursor).unwrap();
        assert_eq!(index.containers().len(), 1);
    }

    #[test]
    fn test_scan_resyncs_on_stray_bytes() {
        let mut file = vec![0x00, 0x42, 0x00];
        file.extend_from_slice(&container_block(COMPRESSION_NONE, 10, &[0x11; 10]));

        let mut cursor = Cursor::new(file);
        let index = ContainerIndex::scan(&mut cursor).unwrap();
        assert_eq!(index.containers().len(), 1);
        assert_eq!(index.containers()[0].file_start, 3);
    }

    #[test]
    fn test_scan_rejects_unknown_header_type() {
        let mut file = container_block(COMPRESSION_NONE, 10, &[0x11; 10]);
        // corrupt the header type in place
        file[6] = 9;
        let mut cursor = Cursor::new(file);
        assert!(matches!(
            ContainerIndex::scan(&mut cursor),
            Err(BlfError::BadFile(_))
        ));
    }

    #[test]
    fn test_scan_skips_top_level_non_container() {
        let mut file = Vec::new();
        // an unknown top-level object, 16 header bytes and nothing else
        file.extend_from_slice(b"LOBJ");
        file.extend_from_slice(&16u16.to_le_bytes());
        file.extend_from_slice(&1u16.to_le_bytes());
        file.extend_from_slice(&0u32.to_le_bytes()); // object_length = 0
        file.extend_from_slice(&999u32.to_le_bytes());
        file.extend_from_slice(&container_block(COMPRESSION_NONE, 10, &[0x11; 10]));

        let mut cursor = Cursor::new(file);
        let index = ContainerIndex::scan(&mut cursor).unwrap();
        // the cursor advanced by exactly 16 despite object_length being 0
        assert_eq!(index.containers().len(), 1);
        assert_eq!(index.containers()[0].file_start, 16);
    }

    #[test]
    fn test_read_spanning_uncompressed_containers() {
        let first: Vec<u8> = (0u8..100).collect();
        let second: Vec<u8> = (100u8..150).collect();
        let mut file = container_block(COMPRESSION_NONE, 100, &first);
        file.extend_from_slice(&container_block(COMPRESSION_NONE, 50, &second));

        let mut cursor = Cursor::new(file);
        let mut index = ContainerIndex::scan(&mut cursor).unwrap();

        let mut out = [0u8; 20];
        assert!(index.read_or_eof(&mut cursor, 90, &mut out).unwrap());
        let expected: Vec<u8> = (90u8..110).collect();
        assert_eq!(&out[..], &expected[..]);
    }

    #[test]
    fn test_read_spanning_zlib_containers() {
        let first: Vec<u8> = (0u8..100).collect();
        let second: Vec<u8> = (100u8..150).collect();
        let mut file = container_block(COMPRESSION_ZLIB, 100, &zlib_stored(&first));
        file.extend_from_slice(&container_block(COMPRESSION_ZLIB, 50, &zlib_stored(&second)));

        let mut cursor = Cursor::new(file);
        let mut index = ContainerIndex::scan(&mut cursor).unwrap();

        let mut out = [0u8; 20];
        assert!(index.read_or_eof(&mut cursor, 90, &mut out).unwrap());
        let expected: Vec<u8> = (90u8..110).collect();
        assert_eq!(&out[..], &expected[..]);

        // second access is served from the cache
        let mut again = [0u8; 20];
        assert!(index.read_or_eof(&mut cursor, 90, &mut again).unwrap());
        assert_eq!(out, again);
    }

    #[test]
    fn test_read_past_end_reports_eof() {
        let file = container_block(COMPRESSION_NONE, 10, &[0x11; 10]);
        let mut cursor = Cursor::new(file);
        let mut index = ContainerIndex::scan(&mut cursor).unwrap();

        let mut out = [0u8; 16];
        assert!(!index.read_or_eof(&mut cursor, 5, &mut out).unwrap());
        assert!(!index.read_or_eof(&mut cursor, 100, &mut out).unwrap());
        assert!(matches!(
            index.read_exact_at(&mut cursor, 5, &mut out),
            Err(BlfError::ShortRead)
        ));
    }

    #[test]
    fn test_unknown_compression_is_unsupported() {
        let file = container_block(7, 10, &[0x11; 10]);
        let mut cursor = Cursor::new(file);
        let mut index = ContainerIndex::scan(&mut cursor).unwrap();

        let mut out = [0u8; 4];
        assert!(matches!(
            index.read_or_eof(&mut cursor, 0, &mut out),
            Err(BlfError::Unsupported(_))
        ));
    }

    #[test]
    fn test_corrupt_zlib_is_decompress_error() {
        let file = container_block(COMPRESSION_ZLIB, 10, &[0xde, 0xad, 0xbe, 0xef]);
        let mut cursor = Cursor::new(file);
        let mut index = ContainerIndex::scan(&mut cursor).unwrap();

        let mut out = [0u8; 4];
        assert!(matches!(
            index.read_or_eof(&mut cursor, 0, &mut out),
            Err(BlfError::Decompress(_))
        ));
    }

    #[test]
    fn test_every_virtual_offset_maps_to_one_container() {
        let mut file = container_block(COMPRESSION_NONE, 40, &[0x01; 40]);
        file.extend_from_slice(&container_block(COMPRESSION_NONE, 24, &[0x02; 24]));
        let mut cursor = Cursor::new(file);
        let index = ContainerIndex::scan(&mut cursor).unwrap();

        for virt in 0..index.virtual_len() {
            let hits = index
                .containers()
                .iter()
                .filter(|c| c.covers(virt))
                .count();
            assert_eq!(hits, 1, "offset {virt} covered by {hits} containers");
        }
        assert!(index.find(index.virtual_len()).is_none());
    }
}
