//! Inner serialized container ("CAB" files): a versioned metadata block
//! describing typed objects, each owning a byte range in the trailing
//! data section. Payloads can be swapped per object; everything else is
//! carried through byte-for-byte.

pub mod parser;
pub mod types;
pub mod writer;

use bytes::Bytes;

pub use types::{
    FileIdentifier, FormatVersion, ObjectInfo, ScriptIdentifier, SerializedFileHeader,
    SerializedType,
};

use crate::error::{Error, Result};
use crate::logger::LogSink;
use crate::stream::find_subslice;

#[derive(Debug)]
pub struct SerializedFile {
    pub(crate) data: Bytes,
    pub header: SerializedFileHeader,
    pub engine_version: String,
    pub target_platform: i32,
    pub enable_type_tree: bool,
    pub big_id_enabled: i32,
    pub types: Vec<SerializedType>,
    pub objects: Vec<ObjectInfo>,
    pub script_types: Vec<ScriptIdentifier>,
    pub externals: Vec<FileIdentifier>,
    pub ref_types: Vec<SerializedType>,
    pub user_information: String,
}

impl SerializedFile {
    pub fn parse(data: Bytes, log: &dyn LogSink) -> Result<Self> {
        parser::parse(data, log)
    }

    pub fn save(&self) -> Result<Vec<u8>> {
        writer::save(self)
    }

    pub fn object(&self, path_id: i64) -> Option<&ObjectInfo> {
        self.objects.iter().find(|o| o.path_id == path_id)
    }

    /// An object's payload: the replacement bytes if one was installed,
    /// otherwise the original byte range.
    pub fn payload<'a>(&'a self, object: &'a ObjectInfo) -> Result<&'a [u8]> {
        match &object.data {
            Some(data) => Ok(data),
            None => self.source_range(object),
        }
    }

    fn source_range(&self, object: &ObjectInfo) -> Result<&[u8]> {
        let start = object.byte_start as usize;
        let end = start + object.byte_size as usize;
        if end > self.data.len() {
            return Err(Error::InvalidOffset {
                offset: end as u64,
                reason: "object range outside container",
            });
        }
        Ok(&self.data[start..end])
    }

    /// Materialize every object's payload from the source buffer.
    pub fn load_payloads(&mut self) -> Result<()> {
        let source = self.data.clone();
        for object in &mut self.objects {
            if object.data.is_none() {
                let start = object.byte_start as usize;
                let end = start + object.byte_size as usize;
                if end > source.len() {
                    return Err(Error::InvalidOffset {
                        offset: end as u64,
                        reason: "object range outside container",
                    });
                }
                object.data = Some(source[start..end].to_vec());
            }
        }
        Ok(())
    }

    /// Replace the payload behind `path_id`. Only the payload and its
    /// recorded size change; type and identity stay as parsed.
    pub fn update_object(&mut self, path_id: i64, new_data: Vec<u8>) -> Result<()> {
        let object = self
            .objects
            .iter_mut()
            .find(|o| o.path_id == path_id)
            .ok_or(Error::ObjectNotFound { path_id })?;
        object.byte_size =
            u32::try_from(new_data.len()).map_err(|_| Error::InvalidOffset {
                offset: new_data.len() as u64,
                reason: "payload exceeds object size field",
            })?;
        object.data = Some(new_data);
        Ok(())
    }

    /// Locate the object whose payload contains `needle`, returning its
    /// path id and the offset of the match within the payload.
    pub fn find_payload(&self, needle: &[u8]) -> Option<(i64, usize)> {
        for object in &self.objects {
            let Ok(payload) = self.payload(object) else {
                continue;
            };
            if let Some(at) = find_subslice(payload, needle) {
                return Some((object.path_id, at));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NullSink;
    use crate::stream::{ByteWriter, Endian};

    fn blob_tree(endian: Endian) -> Vec<u8> {
        let mut w = ByteWriter::with_endian(endian);
        w.write_i32(0); // node count
        w.write_i32(0); // string buffer size
        w.into_vec()
    }

    // Minimal two-node recursive tree as written before the blob era.
    fn legacy_tree(endian: Endian) -> Vec<u8> {
        let mut w = ByteWriter::with_endian(endian);
        w.write_cstr("TextAsset");
        w.write_cstr("Base");
        w.write_i32(-1);
        w.write_i32(0); // index
        w.write_i32(0); // type flags
        w.write_i32(1); // node version
        w.write_i32(0); // meta flag
        w.write_i32(1); // children
        w.write_cstr("string");
        w.write_cstr("m_Script");
        w.write_i32(-1);
        w.write_i32(1);
        w.write_i32(0);
        w.write_i32(1);
        w.write_i32(0);
        w.write_i32(0); // children
        w.into_vec()
    }

    fn sample_type(version: FormatVersion, endian: Endian, class_id: i32) -> SerializedType {
        let script_type_index = -1;
        SerializedType {
            class_id,
            is_stripped_type: version.has_stripped_flag().then_some(false),
            script_type_index,
            script_id: version
                .type_needs_script_hash(false, script_type_index, class_id)
                .then_some([0xAA; 16]),
            old_type_hash: version.has_type_hashes().then_some([0x11; 16]),
            type_tree: Some(if version.blob_type_tree() {
                blob_tree(endian)
            } else {
                legacy_tree(endian)
            }),
            class_name: None,
            name_space: None,
            assembly_name: None,
            type_dependencies: version.has_ref_type_fields().then(Vec::new),
        }
    }

    fn sample_object(version: FormatVersion, path_id: i64, payload: &[u8]) -> ObjectInfo {
        ObjectInfo {
            path_id,
            byte_start: 0,
            byte_size: payload.len() as u32,
            type_id: 0,
            class_id: version.has_object_class_id().then_some(49),
            is_destroyed: version.has_object_destroyed().then_some(0),
            script_type_index: version.has_object_script_index().then_some(-1),
            stripped: version.has_object_stripped().then_some(0),
            data: Some(payload.to_vec()),
        }
    }

    fn sample_file(v: u32) -> SerializedFile {
        let version = FormatVersion(v);
        let endian = Endian::Little;
        SerializedFile {
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
            big_id_enabled: if version.has_big_id_flag() { 1 } else { 0 },
            types: vec![
                sample_type(version, endian, 49),
                sample_type(version, endian, 114),
            ],
            objects: vec![
                sample_object(version, 1, b"first payload"),
                sample_object(version, 2, b"second payload, the longest of the three"),
                sample_object(version, 3, b"third"),
            ],
            script_types: if version.has_script_types() {
                vec![ScriptIdentifier {
                    local_file_index: 0,
                    local_identifier: 11,
                }]
            } else {
                Vec::new()
            },
            externals: vec![FileIdentifier {
                temp_empty: version.has_external_temp_empty().then(String::new),
                guid: Some([0x22; 16]),
                kind: Some(0),
                path: "resources.assets".to_string(),
            }],
            ref_types: Vec::new(),
            user_information: String::new(),
        }
    }

    #[test]
    fn unmodified_round_trip_is_byte_identical() {
        let bytes = sample_file(21).save().unwrap();
        let parsed = SerializedFile::parse(Bytes::from(bytes.clone()), &NullSink).unwrap();
        assert_eq!(parsed.save().unwrap(), bytes);
    }

    #[test]
    fn data_section_starts_sixteen_byte_aligned() {
        for v in [13, 21, 22] {
            let bytes = sample_file(v).save().unwrap();
            let parsed = SerializedFile::parse(Bytes::from(bytes), &NullSink).unwrap();
            assert_eq!(parsed.header.data_offset % 16, 0, "version {v}");
        }
    }

    #[test]
    fn presence_table_round_trips_across_versions() {
        for v in [13, 14, 15, 16, 17, 19, 20, 21, 22] {
            let bytes = sample_file(v).save().unwrap();
            let parsed = SerializedFile::parse(Bytes::from(bytes.clone()), &NullSink)
                .unwrap_or_else(|e| panic!("version {v}: {e}"));
            assert_eq!(parsed.header.version.0, v);
            assert_eq!(parsed.objects.len(), 3);
            assert_eq!(parsed.types.len(), 2);
            assert_eq!(parsed.save().unwrap(), bytes, "version {v}");
        }
    }

    #[test]
    fn legacy_recursive_tree_and_narrow_ids_round_trip() {
        let bytes = sample_file(11).save().unwrap();
        let parsed = SerializedFile::parse(Bytes::from(bytes.clone()), &NullSink).unwrap();
        assert_eq!(parsed.big_id_enabled, 1);
        assert_eq!(
            parsed.types[0].type_tree.as_deref(),
            Some(legacy_tree(Endian::Little).as_slice())
        );
        assert_eq!(parsed.save().unwrap(), bytes);
    }

    #[test]
    fn update_object_rewrites_one_payload_and_leaves_the_rest() {
        let original = sample_file(21).save().unwrap();
        let mut file = SerializedFile::parse(Bytes::from(original), &NullSink).unwrap();

        let replacement = b"replacement that is rather longer than what was there before";
        file.update_object(2, replacement.to_vec()).unwrap();
        let saved = file.save().unwrap();

        let reparsed = SerializedFile::parse(Bytes::from(saved), &NullSink).unwrap();
        let updated = reparsed.object(2).unwrap();
        assert_eq!(updated.byte_size as usize, replacement.len());
        assert_eq!(reparsed.payload(updated).unwrap(), replacement);
        assert_eq!(updated.type_id, 0);

        for path_id in [1, 3] {
            let object = reparsed.object(path_id).unwrap();
            let fresh = sample_file(21);
            let expected = fresh.object(path_id).unwrap().data.clone().unwrap();
            assert_eq!(reparsed.payload(object).unwrap(), expected.as_slice());
        }
    }

    #[test]
    fn update_object_rejects_unknown_path_id() {
        let mut file = sample_file(21);
        let err = file.update_object(42, vec![0]).unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound { path_id: 42 }));
    }

    #[test]
    fn duplicate_path_ids_are_rejected_with_an_offset() {
        let mut file = sample_file(21);
        file.objects[2].path_id = 1;
        let bytes = file.save().unwrap();
        let err = SerializedFile::parse(Bytes::from(bytes), &NullSink).unwrap_err();
        assert!(matches!(err, Error::Malformed { offset, .. } if offset > 0));
    }

    #[test]
    fn find_payload_reports_object_and_inner_offset() {
        let bytes = sample_file(21).save().unwrap();
        let file = SerializedFile::parse(Bytes::from(bytes), &NullSink).unwrap();
        assert_eq!(file.find_payload(b"payload, the longest"), Some((2, 7)));
        assert_eq!(file.find_payload(b"absent"), None);
    }
}
