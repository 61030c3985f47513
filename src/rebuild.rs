//! Payload substitution inside an inner container, and the end-to-end
//! bundle update built on top of it.
//!
//! Two paths: when the replacement is the same length as the original,
//! a byte splice leaves every other byte untouched. When lengths differ,
//! the container is re-serialized: the affected object's length prefix,
//! padding, and trailing bytes are recomputed and every size field
//! downstream follows from `save()`.

use bytes::Bytes;

use crate::bundle::AssetBundle;
use crate::error::{Error, Result};
use crate::logger::LogSink;
use crate::serialized::SerializedFile;
use crate::stream::find_subslice;

/// Produce an updated container with `original_payload` replaced by
/// `new_payload`. Same-size replacements splice; anything else goes
/// through the structural path.
pub fn rebuild(
    original: &[u8],
    original_payload: &[u8],
    new_payload: &[u8],
    log: &dyn LogSink,
) -> Result<Vec<u8>> {
    if new_payload.len() == original_payload.len() {
        splice_same_size(original, original_payload, new_payload, log)
    } else {
        rebuild_structural(original, original_payload, new_payload, log)
    }
}

fn splice_same_size(
    original: &[u8],
    original_payload: &[u8],
    new_payload: &[u8],
    log: &dyn LogSink,
) -> Result<Vec<u8>> {
    let at = find_subslice(original, original_payload).ok_or(Error::AssetNotFound)?;
    log.log(&format!(
        "same-size replacement at {at:#x}, {} bytes",
        new_payload.len()
    ));

    let mut out = original.to_vec();
    out[at..at + new_payload.len()].copy_from_slice(new_payload);
    Ok(out)
}

fn rebuild_structural(
    original: &[u8],
    original_payload: &[u8],
    new_payload: &[u8],
    log: &dyn LogSink,
) -> Result<Vec<u8>> {
    let mut file = SerializedFile::parse(Bytes::copy_from_slice(original), log)?;
    file.load_payloads()?;

    let (path_id, inner) = file
        .find_payload(original_payload)
        .ok_or(Error::AssetNotFound)?;
    log.log(&format!(
        "payload found in object {path_id} at +{inner:#x}"
    ));

    // The asset sits behind a 4-byte little-endian length field and is
    // zero-padded to the next 4-byte boundary.
    if inner < 4 {
        return Err(Error::InvalidOffset {
            offset: inner as u64,
            reason: "no room for a length prefix before the payload",
        });
    }
    let new_len = u32::try_from(new_payload.len()).map_err(|_| Error::InvalidOffset {
        offset: new_payload.len() as u64,
        reason: "payload exceeds length field width",
    })?;

    let object = file.object(path_id).ok_or(Error::ObjectNotFound { path_id })?;
    let old = file.payload(object)?;

    let length_at = inner - 4;
    let declared = u32::from_le_bytes(old[length_at..inner].try_into().unwrap());
    if declared as usize != original_payload.len() {
        log.log(&format!(
            "length prefix {declared} disagrees with payload length {}",
            original_payload.len()
        ));
    }

    let old_end = inner + original_payload.len();
    let old_padded_end = ((old_end + 3) & !3).min(old.len());
    let new_end = inner + new_payload.len();
    let new_padded_end = (new_end + 3) & !3;

    let mut rebuilt = Vec::with_capacity(old.len() + new_payload.len() - original_payload.len());
    rebuilt.extend_from_slice(&old[..length_at]);
    rebuilt.extend_from_slice(&new_len.to_le_bytes());
    rebuilt.extend_from_slice(new_payload);
    rebuilt.resize(new_padded_end, 0);
    rebuilt.extend_from_slice(&old[old_padded_end..]);

    file.update_object(path_id, rebuilt)?;
    file.save()
}

/// End-to-end update: open the bundle, rebuild the inner container it
/// carries, and re-pack the envelope around the result.
pub fn update_bundle(
    bundle_bytes: &[u8],
    original_payload: &[u8],
    new_payload: &[u8],
    log: &dyn LogSink,
) -> Result<Vec<u8>> {
    let bundle = AssetBundle::parse(Bytes::copy_from_slice(bundle_bytes), log)?;
    let inner = bundle
        .assemble_directories(log)?
        .into_iter()
        .flatten()
        .next()
        .ok_or(Error::AssetNotFound)?;

    let updated = rebuild(&inner, original_payload, new_payload, log)?;
    bundle.repack(&updated, log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NullSink;
    use crate::serialized::{
        FileIdentifier, FormatVersion, ObjectInfo, SerializedFile, SerializedFileHeader,
        SerializedType,
    };
    use crate::stream::{ByteWriter, Endian};

    // A length-prefixed, 4-byte-padded script field with named bytes on
    // either side, the shape a text asset record takes on disk.
    fn script_record(name: &str, payload: &[u8], trailing: &[u8]) -> Vec<u8> {
        let mut w = ByteWriter::little();
        w.write_u32(name.len() as u32);
        w.write_bytes(name.as_bytes());
        w.align(4);
        w.write_u32(payload.len() as u32);
        w.write_bytes(payload);
        w.align(4);
        w.write_bytes(trailing);
        w.into_vec()
    }

    fn container_with(record: &[u8]) -> Vec<u8> {
        let version = FormatVersion(21);
        let endian = Endian::Little;
        let mut tree = ByteWriter::with_endian(endian);
        tree.write_i32(0);
        tree.write_i32(0);

        let file = SerializedFile {
            data: Bytes::new(),
            header: SerializedFileHeader {
                metadata_size: 0,
                file_size: 0,
                version,
                data_offset: 0,
                endian,
                reserved: [0; 3],
                unknown: 0,
            },
            engine_version: "2020.3.14f1".to_string(),
            target_platform: 5,
            enable_type_tree: true,
            big_id_enabled: 0,
            types: vec![SerializedType {
                class_id: 49,
                is_stripped_type: Some(false),
                script_type_index: -1,
                script_id: None,
                old_type_hash: Some([0; 16]),
                type_tree: Some(tree.into_vec()),
                type_dependencies: Some(Vec::new()),
                ..Default::default()
            }],
            objects: vec![
                ObjectInfo {
                    path_id: 1,
                    byte_start: 0,
                    byte_size: 0,
                    type_id: 0,
                    class_id: None,
                    is_destroyed: None,
                    script_type_index: None,
                    stripped: None,
                    data: Some(b"unrelated neighbour".to_vec()),
                },
                ObjectInfo {
                    path_id: 2,
                    byte_start: 0,
                    byte_size: 0,
                    type_id: 0,
                    class_id: None,
                    is_destroyed: None,
                    script_type_index: None,
                    stripped: None,
                    data: Some(record.to_vec()),
                },
            ],
            script_types: Vec::new(),
            externals: vec![FileIdentifier {
                temp_empty: Some(String::new()),
                guid: Some([0; 16]),
                kind: Some(0),
                path: "resources.assets".to_string(),
            }],
            ref_types: Vec::new(),
            user_information: String::new(),
        };
        file.save().unwrap()
    }

    #[test]
    fn same_size_rebuild_changes_only_the_payload_range() {
        let payload = b"0123456789abcdef";
        let container = container_with(&script_record("CARD_Name", payload, b"TRAILER"));

        let replacement = b"fedcba9876543210";
        let updated = rebuild(&container, payload, replacement, &NullSink).unwrap();
        assert_eq!(updated.len(), container.len());

        let at = find_subslice(&container, payload).unwrap();
        assert_eq!(&updated[..at], &container[..at]);
        assert_eq!(&updated[at..at + payload.len()], replacement);
        assert_eq!(&updated[at + payload.len()..], &container[at + payload.len()..]);
    }

    #[test]
    fn same_size_rebuild_is_idempotent() {
        let payload = b"0123456789abcdef";
        let container = container_with(&script_record("CARD_Name", payload, b"TRAILER"));

        let replacement = b"fedcba9876543210";
        let once = rebuild(&container, payload, replacement, &NullSink).unwrap();
        // Replaying the replacement against the already-updated container
        // changes nothing further.
        let twice = rebuild(&once, replacement, replacement, &NullSink).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_payload_is_asset_not_found() {
        let container = container_with(&script_record("CARD_Name", b"present!", b""));
        let err = rebuild(&container, b"absent!!", b"ABSENT!!", &NullSink).unwrap_err();
        assert!(matches!(err, Error::AssetNotFound));
    }

    #[test]
    fn growing_rebuild_updates_length_field_and_shifts_trailer() {
        let payload = b"0123456789abcdef";
        let trailing = b"TRAILING-RECORD-BYTES";
        let container = container_with(&script_record("CARD_Name", payload, trailing));

        let mut replacement = payload.to_vec();
        replacement.extend_from_slice(b"+10 bytes!");
        assert_eq!(replacement.len(), payload.len() + 10);

        let updated = rebuild(&container, payload, &replacement, &NullSink).unwrap();
        let reparsed = SerializedFile::parse(Bytes::from(updated), &NullSink).unwrap();

        let object = reparsed.object(2).unwrap();
        let record = reparsed.payload(object).unwrap();

        // Length field right before the payload names the new size.
        let at = find_subslice(record, &replacement).unwrap();
        let declared = u32::from_le_bytes(record[at - 4..at].try_into().unwrap());
        assert_eq!(declared as usize, replacement.len());

        // Trailer survived at its shifted offset, behind fresh padding.
        let padded_end = (at + replacement.len() + 3) & !3;
        assert_eq!(&record[padded_end..], trailing);

        // The neighbour object was not touched.
        let neighbour = reparsed.object(1).unwrap();
        assert_eq!(reparsed.payload(neighbour).unwrap(), b"unrelated neighbour");
    }

    #[test]
    fn update_bundle_rebuilds_inner_container_and_envelope() {
        use crate::bundle::{self, BlockMeta, BundleMeta, DirectoryMeta};

        let payload = b"0123456789abcdef";
        let container = container_with(&script_record("CARD_Name", payload, b"TRAILER"));

        let meta = BundleMeta {
            file_version: 6,
            player_version: "5.x.x".to_string(),
            engine_version: "2020.3.14f1".to_string(),
            guid: "0".repeat(32),
            blocks: vec![BlockMeta {
                uncompressed_size: container.len() as u32,
                compressed_size: 0,
                flags: 2,
                compressed: true,
                compression: "lz4".to_string(),
            }],
            directories: vec![DirectoryMeta {
                offset: 0,
                size: container.len() as u64,
                flags: 4,
                path: "CAB-test".to_string(),
            }],
        };
        let bundle_bytes = bundle::repack(&meta, &container, &NullSink).unwrap();

        let mut replacement = payload.to_vec();
        replacement.extend_from_slice(b"-grown");
        let updated = update_bundle(&bundle_bytes, payload, &replacement, &NullSink).unwrap();

        let reparsed = AssetBundle::parse(Bytes::from(updated), &NullSink).unwrap();
        let inner = reparsed
            .assemble_directories(&NullSink)
            .unwrap()
            .remove(0)
            .unwrap();
        let file = SerializedFile::parse(Bytes::from(inner), &NullSink).unwrap();
        let (path_id, at) = file.find_payload(&replacement).unwrap();
        assert_eq!(path_id, 2);
        let record = file.payload(file.object(path_id).unwrap()).unwrap();
        let declared = u32::from_le_bytes(record[at - 4..at].try_into().unwrap());
        assert_eq!(declared as usize, replacement.len());
    }

    #[test]
    fn shrinking_rebuild_also_tracks_the_length_field() {
        let payload = b"a much longer original payload body";
        let trailing = b"TAIL";
        let container = container_with(&script_record("CARD_Desc", payload, trailing));

        let replacement = b"short";
        let updated = rebuild(&container, payload, replacement, &NullSink).unwrap();
        let reparsed = SerializedFile::parse(Bytes::from(updated), &NullSink).unwrap();
        let record = reparsed.payload(reparsed.object(2).unwrap()).unwrap();

        let at = find_subslice(record, replacement).unwrap();
        let declared = u32::from_le_bytes(record[at - 4..at].try_into().unwrap());
        assert_eq!(declared as usize, replacement.len());
        let padded_end = (at + replacement.len() + 3) & !3;
        assert_eq!(&record[padded_end..], trailing);
    }
}
