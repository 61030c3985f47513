pub mod bundle;
pub mod commands;
pub mod compress;
pub mod constants;
pub mod error;
pub mod logger;
pub mod rebuild;
pub mod serialized;
pub mod single_asset;
pub mod stream;
