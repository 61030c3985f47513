//! Writing side of the serialized container format. Field presence comes
//! from the same `FormatVersion` table the parser consults; sizes and the
//! data offset are recomputed from what actually gets written.

use super::types::*;
use super::SerializedFile;
use crate::error::{Error, Result};
use crate::stream::{ByteWriter, Endian};

pub fn save(file: &SerializedFile) -> Result<Vec<u8>> {
    let version = file.header.version;
    let endian = file.header.endian;

    let mut meta = ByteWriter::with_endian(endian);
    let mut data = ByteWriter::with_endian(endian);

    if version.has_engine_version() {
        meta.write_cstr(&file.engine_version);
    }
    if version.has_target_platform() {
        meta.write_i32(file.target_platform);
    }
    if version.has_type_tree_flag() {
        meta.write_bool(file.enable_type_tree);
    }

    meta.write_i32(i32_len(file.types.len(), "type table")?);
    for t in &file.types {
        write_serialized_type(&mut meta, version, file.enable_type_tree, t, false)?;
    }

    if version.has_big_id_flag() {
        meta.write_i32(file.big_id_enabled);
    }

    meta.write_i32(i32_len(file.objects.len(), "object table")?);
    for object in &file.objects {
        write_object_info(file, object, &mut meta, &mut data)?;
        data.align(8);
    }

    if version.has_script_types() {
        meta.write_i32(i32_len(file.script_types.len(), "script type table")?);
        for script in &file.script_types {
            meta.write_i32(script.local_file_index);
            if version.wide_path_ids() {
                meta.align(4);
                meta.write_i64(script.local_identifier);
            } else {
                meta.write_i32(narrow(script.local_identifier, "script identifier")?);
            }
        }
    }

    meta.write_i32(i32_len(file.externals.len(), "external table")?);
    for external in &file.externals {
        if version.has_external_temp_empty() {
            meta.write_cstr(external.temp_empty.as_deref().unwrap_or(""));
        }
        if version.wide_external_guid() {
            meta.write_bytes(&external.guid.unwrap_or([0; 16]));
            meta.write_i32(external.kind.unwrap_or(0));
        }
        meta.write_cstr(&external.path);
    }

    if version.has_ref_types() {
        meta.write_i32(i32_len(file.ref_types.len(), "ref type table")?);
        for t in &file.ref_types {
            write_serialized_type(&mut meta, version, file.enable_type_tree, t, true)?;
        }
    }

    if version.has_user_information() {
        meta.write_cstr(&file.user_information);
    }

    assemble(file, meta, data)
}

fn assemble(file: &SerializedFile, meta: ByteWriter, data: ByteWriter) -> Result<Vec<u8>> {
    let version = file.header.version;
    let endian = file.header.endian;
    let metadata_size = meta.len();
    let data_size = data.len();

    let mut out = ByteWriter::big();
    if version.endian_in_header() {
        // 16 fixed bytes, then the endian flag block; v22 moves the real
        // size fields behind it and widens them.
        let extra = if version.wide_header() { 32 } else { 4 };
        let data_offset = 16 + extra + metadata_size;
        let aligned_offset = (data_offset + 15) & !15;
        let file_size = aligned_offset + data_size;

        if version.wide_header() {
            out.write_u32(0);
            out.write_u32(0);
            out.write_u32(version.0);
            out.write_u32(0);
            out.write_bool(endian == Endian::Big);
            out.write_bytes(&file.header.reserved);
            out.write_u32(u32_field(metadata_size, "metadata size")?);
            out.write_i64(file_size as i64);
            out.write_i64(aligned_offset as i64);
            out.write_u64(file.header.unknown);
        } else {
            out.write_u32(u32_field(metadata_size, "metadata size")?);
            out.write_u32(u32_field(file_size, "file size")?);
            out.write_u32(version.0);
            out.write_u32(u32_field(aligned_offset, "data offset")?);
            out.write_bool(endian == Endian::Big);
            out.write_bytes(&file.header.reserved);
        }
        out.write_bytes(meta.as_slice());
        out.align(16);
        out.write_bytes(data.as_slice());
    } else {
        // Tail-metadata layout: data first, then the endian byte and the
        // metadata block it governs.
        let metadata_with_endian = metadata_size + 1;
        let file_size = 16 + metadata_with_endian + data_size;
        out.write_u32(u32_field(metadata_with_endian, "metadata size")?);
        out.write_u32(u32_field(file_size, "file size")?);
        out.write_u32(version.0);
        out.write_u32(32);
        out.write_bytes(data.as_slice());
        out.write_bool(endian == Endian::Big);
        out.write_bytes(meta.as_slice());
    }
    Ok(out.into_vec())
}

fn write_serialized_type(
    meta: &mut ByteWriter,
    version: FormatVersion,
    enable_type_tree: bool,
    t: &SerializedType,
    is_ref_type: bool,
) -> Result<()> {
    meta.write_i32(t.class_id);

    if version.has_stripped_flag() {
        meta.write_bool(t.is_stripped_type.unwrap_or(false));
    }
    if version.has_script_type_index() {
        meta.write_i16(t.script_type_index);
    }
    if version.has_type_hashes() {
        if version.type_needs_script_hash(is_ref_type, t.script_type_index, t.class_id) {
            meta.write_bytes(&t.script_id.unwrap_or([0; 16]));
        }
        meta.write_bytes(&t.old_type_hash.unwrap_or([0; 16]));
    }

    if enable_type_tree {
        let tree = t.type_tree.as_deref().ok_or_else(|| Error::Malformed {
            offset: 0,
            message: format!("type {} has no preserved type tree", t.class_id),
        })?;
        meta.write_bytes(tree);

        if version.has_ref_type_fields() {
            if is_ref_type {
                meta.write_cstr(t.class_name.as_deref().unwrap_or(""));
                meta.write_cstr(t.name_space.as_deref().unwrap_or(""));
                meta.write_cstr(t.assembly_name.as_deref().unwrap_or(""));
            } else {
                let deps = t.type_dependencies.as_deref().unwrap_or(&[]);
                meta.write_i32(i32_len(deps.len(), "type dependency list")?);
                for dep in deps {
                    meta.write_i32(*dep);
                }
            }
        }
    }
    Ok(())
}

fn write_object_info(
    file: &SerializedFile,
    object: &ObjectInfo,
    meta: &mut ByteWriter,
    data: &mut ByteWriter,
) -> Result<()> {
    let version = file.header.version;

    if file.big_id_enabled != 0 {
        meta.write_i64(object.path_id);
    } else if !version.wide_path_ids() {
        meta.write_i32(narrow(object.path_id, "path id")?);
    } else {
        meta.align(4);
        meta.write_i64(object.path_id);
    }

    let byte_start = data.len();
    if version.wide_header() {
        meta.write_i64(byte_start as i64);
    } else {
        meta.write_u32(u32_field(byte_start, "object offset")?);
    }

    let payload = file.payload(object)?;
    meta.write_u32(u32_field(payload.len(), "object size")?);
    data.write_bytes(payload);

    meta.write_i32(object.type_id);

    if version.has_object_class_id() {
        meta.write_u16(object.class_id.unwrap_or(0));
    }
    if version.has_object_destroyed() {
        meta.write_u16(object.is_destroyed.unwrap_or(0));
    }
    if version.has_object_script_index() {
        meta.write_i16(object.script_type_index.unwrap_or(-1));
    }
    if version.has_object_stripped() {
        meta.write_i8(object.stripped.unwrap_or(0));
    }
    Ok(())
}

fn i32_len(len: usize, what: &'static str) -> Result<i32> {
    i32::try_from(len).map_err(|_| Error::InvalidOffset {
        offset: len as u64,
        reason: what,
    })
}

fn u32_field(value: usize, what: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::InvalidOffset {
        offset: value as u64,
        reason: what,
    })
}

fn narrow(value: i64, what: &'static str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::InvalidOffset {
        offset: value as u64,
        reason: what,
    })
}
