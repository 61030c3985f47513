//! Outer "UnityFS" bundle envelope.
//!
//! A bundle is a big-endian header, an LZ4-compressed block-info section
//! (GUID, block table, directory table), and the concatenated data
//! blocks. Directory entries describe the logical files carried by the
//! bundle; blocks describe how the combined data stream is chunked and
//! compressed.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use nom::{
    bytes::complete::{take, take_till},
    multi::count,
    number::complete::{be_u16, be_u32, be_u64},
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::compress::{compress_block, decompress_block, CompressionMode};
use crate::error::{Error, Result};
use crate::logger::LogSink;
use crate::stream::{ByteReader, ByteWriter};

pub const SIGNATURE: &str = "UnityFS";

pub const FLAG_HAS_DIRECTORY_INFO: u32 = 0x40;
pub const FLAG_BLOCKS_AT_END: u32 = 0x80;
pub const FLAG_OLD_WEB_PLUGIN: u32 = 0x100;
pub const FLAG_INFO_PADDING_AT_START: u32 = 0x200;
pub const FLAG_ENCRYPTED: u32 = 0x400;

#[derive(Debug, Clone)]
pub struct BundleHeader {
    pub file_version: u32,
    pub player_version: String,
    pub engine_version: String,
    pub total_size: u64,
    pub compressed_info_size: u32,
    pub decompressed_info_size: u32,
    pub flags: u32,
}

impl BundleHeader {
    pub fn compression(&self) -> CompressionMode {
        CompressionMode::from_flags(self.flags)
    }

    pub fn has_directory_info(&self) -> bool {
        self.flags & FLAG_HAS_DIRECTORY_INFO != 0
    }

    pub fn blocks_at_end(&self) -> bool {
        self.flags & FLAG_BLOCKS_AT_END != 0
    }

    pub fn info_padding_at_start(&self) -> bool {
        self.flags & FLAG_INFO_PADDING_AT_START != 0
    }

    pub fn encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }
}

#[derive(Debug, Clone)]
pub struct BlockInfo {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub flags: u16,
}

impl BlockInfo {
    pub fn compression(&self) -> CompressionMode {
        CompressionMode::from_flags(self.flags as u32)
    }

    /// The envelope signals "stored raw" by equal sizes, independent of
    /// the mode bits.
    pub fn is_compressed(&self) -> bool {
        self.compressed_size != self.uncompressed_size
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub offset: u64,
    pub size: u64,
    pub flags: u32,
    pub path: String,
}

#[derive(Debug)]
pub struct AssetBundle {
    data: Bytes,
    pub header: BundleHeader,
    pub guid: [u8; 16],
    pub blocks: Vec<BlockInfo>,
    pub directories: Vec<DirectoryEntry>,
    data_start: usize,
}

// Parser for a BlockInfo record
fn parse_block_info(input: &[u8]) -> IResult<&[u8], BlockInfo> {
    let (input, uncompressed_size) = be_u32(input)?;
    let (input, compressed_size) = be_u32(input)?;
    let (input, flags) = be_u16(input)?;
    Ok((
        input,
        BlockInfo {
            uncompressed_size,
            compressed_size,
            flags,
        },
    ))
}

// Parser for a null-terminated directory path (at most 256 bytes)
fn parse_entry_path(input: &[u8]) -> IResult<&[u8], String> {
    let (input, raw) = take_till(|b| b == 0u8)(input)?;
    if raw.len() > 256 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    let (input, _) = take(1usize)(input)?;
    Ok((input, String::from_utf8_lossy(raw).into_owned()))
}

// Parser for a DirectoryEntry record
fn parse_directory_entry(input: &[u8]) -> IResult<&[u8], DirectoryEntry> {
    let (input, offset) = be_u64(input)?;
    let (input, size) = be_u64(input)?;
    let (input, flags) = be_u32(input)?;
    let (input, path) = parse_entry_path(input)?;
    Ok((
        input,
        DirectoryEntry {
            offset,
            size,
            flags,
            path,
        },
    ))
}

// Parser for the decompressed block-info section
fn parse_info_section(
    input: &[u8],
) -> IResult<&[u8], ([u8; 16], Vec<BlockInfo>, Vec<DirectoryEntry>)> {
    let (input, guid) = take(16usize)(input)?;
    let (input, block_count) = be_u32(input)?;
    let (input, blocks) = count(parse_block_info, block_count as usize)(input)?;
    let (input, directory_count) = be_u32(input)?;
    let (input, directories) = count(parse_directory_entry, directory_count as usize)(input)?;

    let mut guid_bytes = [0u8; 16];
    guid_bytes.copy_from_slice(guid);
    Ok((input, (guid_bytes, blocks, directories)))
}

fn run_info_parser(input: &[u8]) -> Result<([u8; 16], Vec<BlockInfo>, Vec<DirectoryEntry>)> {
    match parse_info_section(input) {
        Ok((_, parsed)) => Ok(parsed),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(Error::Malformed {
            offset: input.len() - e.input.len(),
            message: format!("block info section: {:?}", e.code),
        }),
        Err(nom::Err::Incomplete(_)) => Err(Error::Truncated {
            offset: input.len(),
            wanted: 1,
        }),
    }
}

impl AssetBundle {
    pub fn parse(data: Bytes, log: &dyn LogSink) -> Result<Self> {
        let mut reader = ByteReader::big(&data);

        let signature = reader.read_cstr_bounded(13)?;
        if signature != SIGNATURE {
            return Err(Error::InvalidContainer(signature));
        }

        let file_version = reader.read_u32()?;
        let player_version = reader.read_cstr_bounded(20)?;
        let engine_version = reader.read_cstr_bounded(20)?;
        let total_size = reader.read_u64()?;
        let compressed_info_size = reader.read_u32()?;
        let decompressed_info_size = reader.read_u32()?;
        let flags = reader.read_u32()?;

        let header = BundleHeader {
            file_version,
            player_version,
            engine_version,
            total_size,
            compressed_info_size,
            decompressed_info_size,
            flags,
        };
        log.log(&format!(
            "bundle version {file_version}, engine {}, flags {flags:#x} ({})",
            header.engine_version,
            header.compression().label()
        ));
        if header.encrypted() {
            log.log("bundle flags indicate encryption");
        }

        reader.align(16);

        let raw_info = reader.read_bytes(compressed_info_size as usize)?;
        let info = decompress_block(
            header.compression(),
            raw_info,
            decompressed_info_size as usize,
        )?;

        let (guid, blocks, directories) = run_info_parser(&info)?;
        log.log(&format!(
            "{} block(s), {} directory entr(ies)",
            blocks.len(),
            directories.len()
        ));

        let data_start = reader.position();
        Ok(AssetBundle {
            data,
            header,
            guid,
            blocks,
            directories,
            data_start,
        })
    }

    /// Assemble each directory's payload from the block stream.
    ///
    /// The cursor over the block data is shared across directory entries
    /// and only ever advances; every entry walks the full block list from
    /// wherever the previous entry left the cursor. Entries whose
    /// assembled length disagrees with the declared size come back as
    /// `None` rather than failing the whole bundle.
    pub fn assemble_directories(&self, log: &dyn LogSink) -> Result<Vec<Option<Vec<u8>>>> {
        let mut reader = ByteReader::big(&self.data);
        reader.seek(self.data_start)?;

        let mut assembled_entries = Vec::with_capacity(self.directories.len());
        for directory in &self.directories {
            reader.align(16);

            let mut assembled = Vec::new();
            for (index, block) in self.blocks.iter().enumerate() {
                if block.is_compressed() {
                    let raw = reader.read_bytes(block.compressed_size as usize)?;
                    match decompress_block(
                        block.compression(),
                        raw,
                        block.uncompressed_size as usize,
                    ) {
                        Ok(bytes) => assembled.extend_from_slice(&bytes),
                        Err(Error::UnsupportedCompression { mode }) => {
                            log.log(&format!(
                                "block {index}: unsupported compression mode {mode}, copying raw"
                            ));
                            assembled.extend_from_slice(raw);
                        }
                        Err(e) => return Err(e),
                    }
                } else {
                    assembled
                        .extend_from_slice(reader.read_bytes(block.uncompressed_size as usize)?);
                }
            }

            if assembled.len() as u64 == directory.size {
                assembled_entries.push(Some(assembled));
            } else {
                log.log(&format!(
                    "directory {}: assembled {} bytes, declared {}, skipping",
                    directory.path,
                    assembled.len(),
                    directory.size
                ));
                assembled_entries.push(None);
            }
        }
        Ok(assembled_entries)
    }

    /// Write every intact directory payload under `output_dir`, plus a
    /// JSON sidecar for each inner container so the bundle can be
    /// re-packed later without the original envelope.
    pub fn extract_to(&self, output_dir: &Path, log: &dyn LogSink) -> Result<Vec<PathBuf>> {
        let payloads = self.assemble_directories(log)?;

        let mut written = Vec::new();
        for (directory, payload) in self.directories.iter().zip(payloads) {
            let Some(payload) = payload else { continue };

            let out_path = output_dir.join(&directory.path);
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&out_path, &payload)?;
            log.log(&format!("written {}", out_path.display()));

            if directory.path.starts_with("CAB-") {
                let meta_path = sidecar_path(&out_path);
                let json =
                    serde_json::to_string_pretty(&self.meta()).map_err(|e| Error::Malformed {
                        offset: 0,
                        message: format!("metadata sidecar: {e}"),
                    })?;
                fs::write(&meta_path, json)?;
                log.log(&format!("written {}", meta_path.display()));
            }

            written.push(out_path);
        }
        Ok(written)
    }

    /// Snapshot of everything needed to re-pack this bundle.
    pub fn meta(&self) -> BundleMeta {
        BundleMeta {
            file_version: self.header.file_version,
            player_version: self.header.player_version.clone(),
            engine_version: self.header.engine_version.clone(),
            guid: hex_string(&self.guid),
            blocks: self
                .blocks
                .iter()
                .map(|b| BlockMeta {
                    uncompressed_size: b.uncompressed_size,
                    compressed_size: b.compressed_size,
                    flags: b.flags,
                    compressed: b.is_compressed(),
                    compression: b.compression().label().to_string(),
                })
                .collect(),
            directories: self
                .directories
                .iter()
                .map(|d| DirectoryMeta {
                    offset: d.offset,
                    size: d.size,
                    flags: d.flags,
                    path: d.path.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild the envelope around an updated first-directory payload.
    pub fn repack(&self, updated: &[u8], log: &dyn LogSink) -> Result<Vec<u8>> {
        repack(&self.meta(), updated, log)
    }
}

/// Everything the re-pack path needs, in sidecar-file form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMeta {
    pub file_version: u32,
    pub player_version: String,
    pub engine_version: String,
    pub guid: String,
    pub blocks: Vec<BlockMeta>,
    pub directories: Vec<DirectoryMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMeta {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub flags: u16,
    pub compressed: bool,
    pub compression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryMeta {
    pub offset: u64,
    pub size: u64,
    pub flags: u32,
    pub path: String,
}

/// `<payload>.meta.json`, appended rather than substituted so inner
/// container names that contain dots stay intact.
pub fn sidecar_path(payload_path: &Path) -> PathBuf {
    let mut os = payload_path.as_os_str().to_os_string();
    os.push(".meta.json");
    PathBuf::from(os)
}

impl BundleMeta {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| Error::Malformed {
            offset: 0,
            message: format!("metadata sidecar: {e}"),
        })
    }
}

/// Build a complete bundle from re-pack metadata and an updated payload.
///
/// The payload is sliced on the original block granularity with the final
/// block absorbing any size delta; blocks that were compressed get
/// re-compressed with the mode their flags name. The block-info section
/// is always LZ4HC-compressed on the way out, matching the envelopes the
/// game ships.
pub fn repack(meta: &BundleMeta, updated: &[u8], log: &dyn LogSink) -> Result<Vec<u8>> {
    if meta.blocks.is_empty() || meta.directories.is_empty() {
        return Err(Error::Malformed {
            offset: 0,
            message: "re-pack metadata carries no blocks or directories".to_string(),
        });
    }
    let guid = hex_bytes(&meta.guid)?;

    let mut chunks = Vec::with_capacity(meta.blocks.len());
    let mut table = Vec::with_capacity(meta.blocks.len());
    let mut offset = 0usize;
    let last = meta.blocks.len() - 1;
    for (index, block) in meta.blocks.iter().enumerate() {
        let uncompressed_size = if index == last {
            updated
                .len()
                .checked_sub(offset)
                .ok_or(Error::InvalidOffset {
                    offset: offset as u64,
                    reason: "payload shorter than preceding blocks",
                })?
        } else {
            block.uncompressed_size as usize
        };
        let end = offset + uncompressed_size;
        if end > updated.len() || u32::try_from(uncompressed_size).is_err() {
            return Err(Error::InvalidOffset {
                offset: end as u64,
                reason: "block range outside payload",
            });
        }
        let chunk = &updated[offset..end];
        offset = end;

        let mode = CompressionMode::from_flags(block.flags as u32);
        let packed = match mode {
            CompressionMode::None => chunk.to_vec(),
            mode => compress_block(mode, chunk)?,
        };
        log.log(&format!(
            "block {index}: {} -> {} bytes ({})",
            uncompressed_size,
            packed.len(),
            mode.label()
        ));
        table.push(BlockInfo {
            uncompressed_size: uncompressed_size as u32,
            compressed_size: packed.len() as u32,
            flags: block.flags,
        });
        chunks.push(packed);
    }

    let mut info = ByteWriter::big();
    info.write_bytes(&guid);
    info.write_u32(table.len() as u32);
    for block in &table {
        info.write_u32(block.uncompressed_size);
        info.write_u32(block.compressed_size);
        info.write_u16(block.flags);
    }
    info.write_u32(meta.directories.len() as u32);
    for (index, directory) in meta.directories.iter().enumerate() {
        let size = if index == 0 {
            updated.len() as u64
        } else {
            directory.size
        };
        info.write_u64(directory.offset);
        info.write_u64(size);
        info.write_u32(directory.flags);
        info.write_cstr(&directory.path);
    }
    let info_raw = info.into_vec();
    let info_packed = compress_block(CompressionMode::Lz4hc, &info_raw)?;

    let flags = FLAG_INFO_PADDING_AT_START | FLAG_HAS_DIRECTORY_INFO | 3;
    let header_len = SIGNATURE.len()
        + 1
        + 4
        + meta.player_version.len()
        + 1
        + meta.engine_version.len()
        + 1
        + 8
        + 4
        + 4
        + 4;
    let info_start = (header_len + 15) & !15;
    let blocks_start = (info_start + info_packed.len() + 15) & !15;
    let total_size = blocks_start + chunks.iter().map(Vec::len).sum::<usize>();

    let mut out = ByteWriter::big();
    out.write_cstr(SIGNATURE);
    out.write_u32(meta.file_version);
    out.write_cstr(&meta.player_version);
    out.write_cstr(&meta.engine_version);
    out.write_u64(total_size as u64);
    out.write_u32(info_packed.len() as u32);
    out.write_u32(info_raw.len() as u32);
    out.write_u32(flags);
    out.align(16);
    out.write_bytes(&info_packed);
    out.align(16);
    for chunk in &chunks {
        out.write_bytes(chunk);
    }
    log.log(&format!("re-packed bundle: {total_size} bytes"));
    Ok(out.into_vec())
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_bytes(text: &str) -> Result<[u8; 16]> {
    let malformed = || Error::Malformed {
        offset: 0,
        message: format!("bad guid string {text:?}"),
    };
    if text.len() != 32 || !text.is_ascii() {
        return Err(malformed());
    }
    let mut out = [0u8; 16];
    for (i, chunk) in text.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).map_err(|_| malformed())?;
        out[i] = u8::from_str_radix(pair, 16).map_err(|_| malformed())?;
    }
    Ok(out)
}
