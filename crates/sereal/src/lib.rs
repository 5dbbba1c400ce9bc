//! Sereal: decoder for the Sereal binary serialization format.
//!
//! Consumes a framed Sereal document (protocol versions 1 through 3) from an
//! in-memory buffer and materializes it either as a dynamic value graph or
//! directly into typed destinations.
//!
//! ```
//! use sereal::Decoder;
//!
//! // "=srl", version 1, empty user header, ARRAYREF_0
//! let doc = [0x3D, 0x73, 0x72, 0x6C, 0x01, 0x00, 0x40];
//! let decoded = Decoder::new().decode_body(&doc)?;
//! assert!(matches!(
//! 	decoded.root().value(),
//! 	sereal::Value::Seq(items) if items.is_empty(),
//! ));
//! # Ok::<(), sereal::Error>(())
//! ```

#![warn(clippy::unwrap_used, missing_docs)]
#![deny(rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

#[doc(inline)]
pub use self::constants::*;
mod constants;

pub mod bind;
pub mod decode;
pub mod header;
pub mod registry;
pub mod value;
pub mod varint;

pub(crate) mod tag;

pub use bind::{Bytes, FromSereal};
pub use decode::{Decoder, Error, ErrorKind, Result};
pub use header::looks_like_sereal;
pub use registry::{register_class, Thaw};
pub use value::{Document, Value, View};
