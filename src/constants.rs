//! Fixed identifiers for the game's localized card-text bundles. The
//! filenames change between game updates, so they live here rather than
//! scattered through the extraction code.

/// Internal names of single-asset records that carry a fixed 180-byte
/// prefix before the real (kind, name, size) triple. Observed on the
/// card-table containers; the directory/name pairs are stable per game
/// build.
pub const FIXED_PREFIX_NAMES: [&str; 5] = [
    "7c/7cc714c8", // CARD_Name
    "58/5888bcdc", // CARD_Desc
    "5a/5a8c44f4", // legacy CARD_Desc variant
    "e9/e9aa18bf", // Card_Indx
    "eb/ebaee097", // Card_Part
];

/// Length of the fixed prefix preceding the re-read triple.
pub const FIXED_RECORD_PREFIX_LEN: usize = 180;

/// Container sub-path suffixes that identify the card-text assets inside
/// a bundle. Used only by the best-effort identification scan.
pub const CARD_CONTAINER_SUFFIXES: [&str; 5] = [
    "card_name.bytes",
    "card_desc.bytes",
    "card_indx.bytes",
    "card_part.bytes",
    "card_pidx.bytes",
];
