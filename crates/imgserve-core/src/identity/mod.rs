//! Content identity for source images.
//!
//! - **hash**: MD5 content hashes of raw bytes
//! - **sniff**: magic-byte format detection
//! - **identify**: hash + content type + header-only dimensions
//! - **sidecar**: atomic persistence of `ImageProperties`

pub mod hash;
pub mod identify;
pub mod sidecar;
pub mod sniff;

pub use hash::Hasher;
pub use identify::{identify, Identifier};
pub use sidecar::save_sidecar;
pub use sniff::SniffedFormat;
