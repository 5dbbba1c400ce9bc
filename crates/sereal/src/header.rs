//! Document framing header.
//!
//! Every Sereal document starts with four magic bytes and one type/version
//! byte, followed by a varint-prefixed user-header region and then the body.
//! The magic chooses between two framings: the legacy magic carries protocol
//! versions 1 and 2, the high-bit magic carries version 3. A third magic is
//! recognized only to diagnose documents that were mangled by an accidental
//! UTF-8 re-encode.

use deku::prelude::*;
use tracing::trace;

use crate::constants::{MAGIC, MAGIC_UTF8, MAGIC_V3, MAX_SIZE, PROTOCOL_VERSION_MAX};
use crate::decode::error::{ErrorKind, Result as DecodeResult, SimpleError, SourceError};
use crate::varint::{self, VarintError};

/// Fixed five-byte document prelude.
#[derive(Clone, Debug, Eq, PartialEq, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct Prelude {
	/// Magic number, one of [`MAGIC`], [`MAGIC_V3`], or [`MAGIC_UTF8`].
	pub magic: u32,

	/// Document type in the high nibble, protocol version in the low nibble.
	pub type_version: u8,
}

impl Prelude {
	/// Protocol version (low nibble).
	pub const fn version(&self) -> u8 {
		self.type_version & 0x0F
	}

	/// Document type (high nibble).
	pub const fn doc_type(&self) -> u8 {
		self.type_version >> 4
	}
}

/// Body encodings, from the document type nibble.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DocType {
	/// Uncompressed body.
	Raw,
	/// The whole tail of the document is one Snappy blob (version 1 only).
	Snappy,
	/// A varint-length-prefixed Snappy blob.
	SnappyIncremental,
	/// Varint uncompressed-length, varint compressed-length, Zlib blob
	/// (version 3 and later).
	Zlib,
}

/// Parsed framing header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
	/// Protocol version (1, 2, or 3).
	pub version: u8,

	/// Body encoding.
	pub doc_type: DocType,

	/// Length of the user-header region as read off the wire, not counting
	/// its own varint.
	pub user_header_len: usize,

	/// Byte offset of the first user-header byte (the flag byte, when the
	/// user header is non-empty).
	pub suffix_start: usize,

	/// Length of the user-header region including its varint.
	pub suffix_size: usize,

	/// Byte offset of the first body byte.
	pub body_start: usize,
}

/// Offset of the user-header length varint, right after the prelude.
const SUFFIX_VARINT_AT: usize = 5;

/// Parse and validate the framing header of a document.
pub fn parse(doc: &[u8]) -> DecodeResult<Header> {
	if doc.len() <= SUFFIX_VARINT_AT {
		return Err(SimpleError::new(ErrorKind::Truncated)
			.with_message("document too short for a Sereal header")
			.into());
	}

	let (_, prelude) = Prelude::from_bytes((doc, 0)).map_err(SimpleError::from_deku)?;
	let version = prelude.version();
	let doc_type = prelude.doc_type();
	trace!(magic = %format!("0x{:08X}", prelude.magic), version, doc_type, "read prelude");

	match prelude.magic {
		MAGIC if version == 1 || version == 2 => {}
		MAGIC_V3 if version == 3 => {}
		MAGIC | MAGIC_V3 => return Err(ErrorKind::UnsupportedVersion(version).into()),
		MAGIC_UTF8 => return Err(ErrorKind::Utf8ContaminatedHeader.into()),
		_ => return Err(ErrorKind::BadHeader.into()),
	}
	debug_assert!(version <= PROTOCOL_VERSION_MAX);

	let doc_type = match doc_type {
		0 => DocType::Raw,
		1 if version == 1 => DocType::Snappy,
		2 => DocType::SnappyIncremental,
		3 if version >= 3 => DocType::Zlib,
		1 | 3 => return Err(ErrorKind::WrongDocTypeForVersion { doc_type, version }.into()),
		_ => return Err(ErrorKind::UnsupportedDocType(doc_type).into()),
	};

	let (user_header_len, varint_size) = match varint::decode(doc, SUFFIX_VARINT_AT) {
		Ok(pair) => pair,
		Err(VarintError::Overflow) => {
			return Err(SourceError::from_source(ErrorKind::BadVarint, doc, SUFFIX_VARINT_AT, 8).into())
		}
		Err(VarintError::Truncated) => {
			return Err(SourceError::from_source(ErrorKind::Truncated, doc, SUFFIX_VARINT_AT, 8).into())
		}
	};
	if user_header_len > MAX_SIZE {
		return Err(ErrorKind::BadSize(user_header_len).into());
	}
	let user_header_len = user_header_len as usize;

	let suffix_start = SUFFIX_VARINT_AT + varint_size;
	let suffix_size = user_header_len + varint_size;
	let body_start = SUFFIX_VARINT_AT + suffix_size;
	if body_start > doc.len() {
		return Err(SimpleError::new(ErrorKind::Truncated)
			.with_message("user header extends past the end of the document")
			.into());
	}

	Ok(Header {
		version,
		doc_type,
		user_header_len,
		suffix_start,
		suffix_size,
		body_start,
	})
}

/// Cheap sniff for whether a buffer plausibly holds a Sereal document.
///
/// This only inspects the framing header; it does not touch the body.
pub fn looks_like_sereal(doc: &[u8]) -> bool {
	parse(doc).is_ok()
}
