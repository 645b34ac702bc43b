//! Interned-name pool decoding
//!
//! The foreign object system stores every identifier in an interned name
//! pool. This module decodes pool records into strings:
//! - `NamePoolConfig` - per-target pool location and encoding flags
//! - `NameReader` - cached, clamped record decoding
//!
//! The pool layout is fixed per target configuration; two encodings exist
//! (a legacy flat pointer array and a block/offset split of the id bits),
//! selected by `NameEncoding`.

mod pool;
mod reader;

pub use pool::{NameEncoding, NamePoolConfig};
pub use reader::{sanitize_ident, NameReader, NAME_MAX, PLACEHOLDER_NAME};
