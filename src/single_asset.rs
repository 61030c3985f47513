//! Narrow reader for containers known to carry exactly one meaningful
//! payload, identified by a (kind, name, size) triple at the start of the
//! data section. Covers the quirks the card-table containers ship with.

use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{FIXED_PREFIX_NAMES, FIXED_RECORD_PREFIX_LEN};
use crate::error::{Error, Result};
use crate::logger::LogSink;
use crate::serialized::parser::parse_header;
use crate::stream::{ByteReader, Endian};

#[derive(Debug, Clone)]
pub struct SingleAsset {
    pub kind: i32,
    pub name: String,
    pub size: u32,
    payload_offset: usize,
}

impl SingleAsset {
    /// Resolve the asset triple. Strategies, in order: the direct read at
    /// the data offset; the fixed-prefix re-read for the statically known
    /// card records; an inline name read when the direct triple comes
    /// back empty.
    pub fn read(data: &[u8], log: &dyn LogSink) -> Result<Self> {
        let mut reader = ByteReader::big(data);
        let header = parse_header(&mut reader)?;
        reader.set_endian(Endian::Little);
        reader.seek(header.data_offset as usize)?;

        let mut kind = reader.read_i32()?;
        let mut name = reader.read_cstr()?;
        reader.align(4);
        let mut size = reader.read_u32()?;

        if FIXED_PREFIX_NAMES.contains(&name.as_str()) {
            // Qualifying records carry a fixed-length prefix before the
            // real triple.
            reader.read_bytes(FIXED_RECORD_PREFIX_LEN)?;
            kind = reader.read_i32()?;
            name = reader.read_cstr()?;
            reader.align(4);
            size = reader.read_u32()?;
        } else if kind == 0 && name.is_empty() {
            name = reader.read_cstr()?;
            reader.align(4);
            size = reader.read_u32()?;
        }

        log.log(&format!("asset {name:?}: kind {kind}, {size} bytes"));
        Ok(SingleAsset {
            kind,
            name,
            size,
            payload_offset: reader.position(),
        })
    }

    pub fn payload<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        let end = self.payload_offset + self.size as usize;
        if end > data.len() {
            return Err(Error::Truncated {
                offset: self.payload_offset,
                wanted: self.size as usize,
            });
        }
        Ok(&data[self.payload_offset..end])
    }

    /// Write the payload as `<name>.bin` under `output_dir` and hand back
    /// the internal name so callers can map the container to its role.
    pub fn extract_to(&self, data: &[u8], output_dir: &Path, log: &dyn LogSink) -> Result<PathBuf> {
        let payload = self.payload(data)?;
        let out_path = output_dir.join(format!("{}.bin", self.name));
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&out_path, payload)?;
        log.log(&format!("written {}", out_path.display()));
        Ok(out_path)
    }
}

/// Best-effort identification scan: find case-insensitive occurrences of
/// the given sub-path suffixes anywhere in the raw bytes and return the
/// printable runs around them. Never used to drive extraction.
pub fn scan_for_suffixes(data: &[u8], suffixes: &[&str]) -> Vec<String> {
    let lowered: Vec<u8> = data.iter().map(u8::to_ascii_lowercase).collect();

    let mut found = Vec::new();
    for suffix in suffixes {
        let needle = suffix.to_ascii_lowercase();
        let needle = needle.as_bytes();
        let mut from = 0;
        while let Some(at) = crate::stream::find_subslice(&lowered[from..], needle) {
            let hit = from + at;
            let context = printable_run(data, hit, hit + needle.len());
            if !found.contains(&context) {
                found.push(context);
            }
            from = hit + needle.len();
        }
    }
    found
}

fn is_printable(b: u8) -> bool {
    (0x20..0x7f).contains(&b)
}

fn printable_run(data: &[u8], start: usize, end: usize) -> String {
    let mut lo = start;
    while lo > 0 && is_printable(data[lo - 1]) {
        lo -= 1;
    }
    let mut hi = end;
    while hi < data.len() && is_printable(data[hi]) {
        hi += 1;
    }
    String::from_utf8_lossy(&data[lo..hi]).into_owned()
}
