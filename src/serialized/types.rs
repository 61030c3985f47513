//! Record types for the inner serialized container, plus the version
//! table that decides which fields exist on the wire.

use crate::stream::Endian;

/// Format version of a serialized container. Every layout decision in
/// both the parser and the writer goes through this table so the two
/// directions cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FormatVersion(pub u32);

impl FormatVersion {
    /// 64-bit file size / data offset plus the trailing unknown field.
    pub fn wide_header(self) -> bool {
        self.0 >= 22
    }

    /// The endian flag sits in the header rather than at the tail.
    pub fn endian_in_header(self) -> bool {
        self.0 >= 9
    }

    pub fn has_engine_version(self) -> bool {
        self.0 >= 7
    }

    pub fn has_target_platform(self) -> bool {
        self.0 >= 8
    }

    pub fn has_type_tree_flag(self) -> bool {
        self.0 >= 13
    }

    pub fn has_stripped_flag(self) -> bool {
        self.0 >= 16
    }

    pub fn has_script_type_index(self) -> bool {
        self.0 >= 17
    }

    pub fn has_type_hashes(self) -> bool {
        self.0 >= 13
    }

    /// Blob-form type trees; everything else uses the recursive layout.
    pub fn blob_type_tree(self) -> bool {
        self.0 >= 12 || self.0 == 10
    }

    /// Ref-type name triple / type dependency list after the tree.
    pub fn has_ref_type_fields(self) -> bool {
        self.0 >= 21
    }

    pub fn has_big_id_flag(self) -> bool {
        (7..14).contains(&self.0)
    }

    pub fn has_script_types(self) -> bool {
        self.0 >= 11
    }

    pub fn has_ref_types(self) -> bool {
        self.0 >= 20
    }

    pub fn has_user_information(self) -> bool {
        self.0 >= 5
    }

    /// Path ids are 4-byte-aligned i64 from v14 on.
    pub fn wide_path_ids(self) -> bool {
        self.0 >= 14
    }

    pub fn wide_external_guid(self) -> bool {
        self.0 >= 5
    }

    pub fn has_external_temp_empty(self) -> bool {
        self.0 >= 6
    }

    pub fn has_object_class_id(self) -> bool {
        self.0 < 16
    }

    pub fn has_object_destroyed(self) -> bool {
        self.0 < 11
    }

    pub fn has_object_script_index(self) -> bool {
        (11..17).contains(&self.0)
    }

    pub fn has_object_stripped(self) -> bool {
        self.0 == 15 || self.0 == 16
    }

    /// Fixed width of one blob-form type tree node record.
    pub fn type_tree_node_width(self) -> usize {
        if self.0 >= 19 {
            32
        } else if self.0 >= 17 {
            28
        } else {
            24
        }
    }

    /// Whether a type record carries the 16-byte script id hash.
    pub fn type_needs_script_hash(
        self,
        is_ref_type: bool,
        script_type_index: i16,
        class_id: i32,
    ) -> bool {
        (is_ref_type && script_type_index >= 0)
            || (self.0 < 16 && class_id < 0)
            || (self.0 >= 16 && class_id == 114)
    }
}

#[derive(Debug, Clone)]
pub struct SerializedFileHeader {
    pub metadata_size: u32,
    pub file_size: u64,
    pub version: FormatVersion,
    pub data_offset: u64,
    pub endian: Endian,
    pub reserved: [u8; 3],
    /// Trailing 8-byte header field on v22+, preserved verbatim.
    pub unknown: u64,
}

/// One type definition. The tree itself stays an opaque blob: nothing in
/// this tool consumes individual nodes, and copying the bytes through is
/// the only way to guarantee the game still accepts the file.
#[derive(Debug, Clone, Default)]
pub struct SerializedType {
    pub class_id: i32,
    pub is_stripped_type: Option<bool>,
    pub script_type_index: i16,
    pub script_id: Option<[u8; 16]>,
    pub old_type_hash: Option<[u8; 16]>,
    pub type_tree: Option<Vec<u8>>,
    pub class_name: Option<String>,
    pub name_space: Option<String>,
    pub assembly_name: Option<String>,
    pub type_dependencies: Option<Vec<i32>>,
}

#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub path_id: i64,
    /// Absolute offset within the container (relative offset from the
    /// object table plus the header's data offset).
    pub byte_start: u64,
    pub byte_size: u32,
    pub type_id: i32,
    pub class_id: Option<u16>,
    pub is_destroyed: Option<u16>,
    pub script_type_index: Option<i16>,
    pub stripped: Option<i8>,
    /// Materialized payload; `None` until loaded or replaced.
    pub data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct FileIdentifier {
    pub temp_empty: Option<String>,
    pub guid: Option<[u8; 16]>,
    pub kind: Option<i32>,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct ScriptIdentifier {
    pub local_file_index: i32,
    pub local_identifier: i64,
}
