//! Reading side of the serialized container format.

use bytes::Bytes;

use super::types::*;
use super::SerializedFile;
use crate::error::{Error, Result};
use crate::logger::LogSink;
use crate::stream::{ByteReader, Endian};

/// Parse just the header, leaving the reader positioned after it (or, for
/// the pre-v9 tail-metadata layout, at the metadata). Header integers
/// before the endian flag are always big-endian.
pub fn parse_header(reader: &mut ByteReader) -> Result<SerializedFileHeader> {
    let metadata_size = reader.read_u32()?;
    let file_size = reader.read_u32()? as u64;
    let version = FormatVersion(reader.read_u32()?);
    let data_offset = reader.read_u32()? as u64;

    let mut header = SerializedFileHeader {
        metadata_size,
        file_size,
        version,
        data_offset,
        endian: Endian::Big,
        reserved: [0; 3],
        unknown: 0,
    };

    if version.endian_in_header() {
        header.endian = if reader.read_bool()? {
            Endian::Big
        } else {
            Endian::Little
        };
        header.reserved.copy_from_slice(reader.read_bytes(3)?);

        if version.wide_header() {
            header.metadata_size = reader.read_u32()?;
            header.file_size = read_offset_field(reader)?;
            header.data_offset = read_offset_field(reader)?;
            header.unknown = reader.read_u64()?;
        }
    } else {
        // The endian byte sits at the front of the tail metadata block;
        // everything after it is read from there.
        let tail = header
            .file_size
            .checked_sub(header.metadata_size as u64)
            .ok_or(Error::InvalidOffset {
                offset: header.file_size,
                reason: "metadata larger than file",
            })?;
        reader.seek(tail as usize)?;
        header.endian = if reader.read_bool()? {
            Endian::Big
        } else {
            Endian::Little
        };
    }

    Ok(header)
}

fn read_offset_field(reader: &mut ByteReader) -> Result<u64> {
    let at = reader.position();
    let value = reader.read_i64()?;
    u64::try_from(value).map_err(|_| Error::InvalidOffset {
        offset: at as u64,
        reason: "negative size field",
    })
}

fn read_count(reader: &mut ByteReader, what: &str) -> Result<usize> {
    let at = reader.position();
    let count = reader.read_i32()?;
    usize::try_from(count).map_err(|_| Error::Malformed {
        offset: at,
        message: format!("negative {what} count {count}"),
    })
}

pub fn parse(data: Bytes, log: &dyn LogSink) -> Result<SerializedFile> {
    let mut reader = ByteReader::big(&data);
    let header = parse_header(&mut reader)?;
    let version = header.version;
    reader.set_endian(header.endian);

    let engine_version = if version.has_engine_version() {
        reader.read_cstr()?
    } else {
        String::new()
    };
    let target_platform = if version.has_target_platform() {
        reader.read_i32()?
    } else {
        0
    };
    let enable_type_tree = if version.has_type_tree_flag() {
        reader.read_bool()?
    } else {
        true
    };

    let type_count = read_count(&mut reader, "type")?;
    let mut types = Vec::with_capacity(type_count);
    for _ in 0..type_count {
        types.push(read_serialized_type(
            &mut reader,
            version,
            enable_type_tree,
            false,
        )?);
    }

    let big_id_enabled = if version.has_big_id_flag() {
        reader.read_i32()?
    } else {
        0
    };

    let object_count = read_count(&mut reader, "object")?;
    let mut objects: Vec<ObjectInfo> = Vec::with_capacity(object_count);
    for _ in 0..object_count {
        let at = reader.position();
        let object = read_object_info(&mut reader, &header, big_id_enabled)?;
        if objects.iter().any(|o| o.path_id == object.path_id) {
            return Err(Error::Malformed {
                offset: at,
                message: format!("duplicate path id {}", object.path_id),
            });
        }
        objects.push(object);
    }

    let mut script_types = Vec::new();
    if version.has_script_types() {
        let script_count = read_count(&mut reader, "script type")?;
        for _ in 0..script_count {
            let local_file_index = reader.read_i32()?;
            let local_identifier = if version.wide_path_ids() {
                reader.align(4);
                reader.read_i64()?
            } else {
                reader.read_i32()? as i64
            };
            script_types.push(ScriptIdentifier {
                local_file_index,
                local_identifier,
            });
        }
    }

    let external_count = read_count(&mut reader, "external")?;
    let mut externals = Vec::with_capacity(external_count);
    for _ in 0..external_count {
        externals.push(read_file_identifier(&mut reader, version)?);
    }

    let mut ref_types = Vec::new();
    if version.has_ref_types() {
        let ref_type_count = read_count(&mut reader, "ref type")?;
        for _ in 0..ref_type_count {
            ref_types.push(read_serialized_type(
                &mut reader,
                version,
                enable_type_tree,
                true,
            )?);
        }
    }

    let user_information = if version.has_user_information() {
        reader.read_cstr()?
    } else {
        String::new()
    };

    log.log(&format!(
        "serialized container v{}: {} type(s), {} object(s), {} external(s)",
        version.0,
        types.len(),
        objects.len(),
        externals.len()
    ));

    Ok(SerializedFile {
        data,
        header,
        engine_version,
        target_platform,
        enable_type_tree,
        big_id_enabled,
        types,
        objects,
        script_types,
        externals,
        ref_types,
        user_information,
    })
}

fn read_serialized_type(
    reader: &mut ByteReader,
    version: FormatVersion,
    enable_type_tree: bool,
    is_ref_type: bool,
) -> Result<SerializedType> {
    let class_id = reader.read_i32()?;

    let is_stripped_type = if version.has_stripped_flag() {
        Some(reader.read_bool()?)
    } else {
        None
    };
    let script_type_index = if version.has_script_type_index() {
        reader.read_i16()?
    } else {
        -1
    };

    let mut script_id = None;
    let mut old_type_hash = None;
    if version.has_type_hashes() {
        if version.type_needs_script_hash(is_ref_type, script_type_index, class_id) {
            let mut hash = [0u8; 16];
            hash.copy_from_slice(reader.read_bytes(16)?);
            script_id = Some(hash);
        }
        let mut hash = [0u8; 16];
        hash.copy_from_slice(reader.read_bytes(16)?);
        old_type_hash = Some(hash);
    }

    let mut type_tree = None;
    let mut class_name = None;
    let mut name_space = None;
    let mut assembly_name = None;
    let mut type_dependencies = None;
    if enable_type_tree {
        let blob = if version.blob_type_tree() {
            measure_tree_blob(reader, version)?
        } else {
            measure_legacy_tree(reader, version)?
        };
        type_tree = Some(blob);

        if version.has_ref_type_fields() {
            if is_ref_type {
                class_name = Some(reader.read_cstr()?);
                name_space = Some(reader.read_cstr()?);
                assembly_name = Some(reader.read_cstr()?);
            } else {
                let count = read_count(reader, "type dependency")?;
                let mut deps = Vec::with_capacity(count);
                for _ in 0..count {
                    deps.push(reader.read_i32()?);
                }
                type_dependencies = Some(deps);
            }
        }
    }

    Ok(SerializedType {
        class_id,
        is_stripped_type,
        script_type_index,
        script_id,
        old_type_hash,
        type_tree,
        class_name,
        name_space,
        assembly_name,
        type_dependencies,
    })
}

/// Blob-form tree: measure node table + string buffer, keep the bytes.
fn measure_tree_blob(reader: &mut ByteReader, version: FormatVersion) -> Result<Vec<u8>> {
    let start = reader.position();
    let node_count = read_count(reader, "type tree node")?;
    let string_size = read_count(reader, "type tree string buffer")?;
    reader.read_bytes(node_count * version.type_tree_node_width() + string_size)?;
    Ok(reader.window(start, reader.position())?.to_vec())
}

/// Legacy recursive tree: walk it with a pending-node counter purely to
/// find where it ends, then keep the bytes.
fn measure_legacy_tree(reader: &mut ByteReader, version: FormatVersion) -> Result<Vec<u8>> {
    let start = reader.position();
    let mut pending = 1usize;
    while pending > 0 {
        pending -= 1;
        reader.read_cstr()?; // type name
        reader.read_cstr()?; // field name
        reader.read_i32()?; // byte size
        if version.0 == 2 {
            reader.read_i32()?; // variable count
        }
        if version.0 != 3 {
            reader.read_i32()?; // index
        }
        reader.read_i32()?; // type flags
        reader.read_i32()?; // node version
        if version.0 != 3 {
            reader.read_i32()?; // meta flag
        }
        let children = read_count(reader, "type tree child")?;
        pending += children;
    }
    Ok(reader.window(start, reader.position())?.to_vec())
}

fn read_object_info(
    reader: &mut ByteReader,
    header: &SerializedFileHeader,
    big_id_enabled: i32,
) -> Result<ObjectInfo> {
    let version = header.version;

    let path_id = if big_id_enabled != 0 {
        reader.read_i64()?
    } else if !version.wide_path_ids() {
        reader.read_i32()? as i64
    } else {
        reader.align(4);
        reader.read_i64()?
    };

    let byte_start = if version.wide_header() {
        read_offset_field(reader)?
    } else {
        reader.read_u32()? as u64
    };
    let byte_size = reader.read_u32()?;
    let type_id = reader.read_i32()?;

    let mut object = ObjectInfo {
        path_id,
        byte_start: byte_start + header.data_offset,
        byte_size,
        type_id,
        class_id: None,
        is_destroyed: None,
        script_type_index: None,
        stripped: None,
        data: None,
    };

    if version.has_object_class_id() {
        object.class_id = Some(reader.read_u16()?);
    }
    if version.has_object_destroyed() {
        object.is_destroyed = Some(reader.read_u16()?);
    }
    if version.has_object_script_index() {
        object.script_type_index = Some(reader.read_i16()?);
    }
    if version.has_object_stripped() {
        object.stripped = Some(reader.read_i8()?);
    }

    Ok(object)
}

fn read_file_identifier(reader: &mut ByteReader, version: FormatVersion) -> Result<FileIdentifier> {
    let mut external = FileIdentifier::default();

    if version.has_external_temp_empty() {
        external.temp_empty = Some(reader.read_cstr()?);
    }
    if version.wide_external_guid() {
        let mut guid = [0u8; 16];
        guid.copy_from_slice(reader.read_bytes(16)?);
        external.guid = Some(guid);
        external.kind = Some(reader.read_i32()?);
    }
    external.path = reader.read_cstr()?;

    Ok(external)
}
