//! Body assembly: decompression dispatch and offset-base selection.
//!
//! Back-references inside a body are absolute byte offsets. For protocol
//! version 1 they index the whole document buffer; from version 2 they are
//! one-based relative to the byte just before the body. Assembly therefore
//! produces both the (possibly decompressed) bytes and the index of the
//! first body byte, chosen so the interpreter resolves offsets with the same
//! arithmetic in every case: v1 keeps the header region in front of the
//! body, v2+ slices (or synthesizes) exactly one leading byte.

use std::borrow::Cow;
use std::io::Read;

use flate2::read::ZlibDecoder;
use tracing::{debug, trace};

use crate::constants::MAX_SIZE;
use crate::header::{DocType, Header};
use crate::varint::{self, VarintError};

use super::error::{ErrorKind, Result, SimpleError, SourceError};

/// Body bytes plus the index of the first body byte.
pub(crate) struct Body<'doc> {
	pub buf: Cow<'doc, [u8]>,
	pub start: usize,
}

/// Assemble the decodable body of a document.
pub(crate) fn assemble<'doc>(doc: &'doc [u8], header: &Header) -> Result<Body<'doc>> {
	let body_start = header.body_start;

	match header.doc_type {
		DocType::Raw => Ok(if header.version == 1 {
			Body {
				buf: Cow::Borrowed(doc),
				start: body_start,
			}
		} else {
			Body {
				buf: Cow::Borrowed(&doc[body_start - 1..]),
				start: 1,
			}
		}),
		DocType::Snappy => {
			let plain = snappy(&doc[body_start..])?;
			Ok(rebuild(doc, header, plain))
		}
		DocType::SnappyIncremental => {
			let mut cursor = body_start;
			let compressed_len = wire_size(doc, &mut cursor)?;
			let blob = compressed(doc, cursor, compressed_len)?;
			let plain = snappy(blob)?;
			Ok(rebuild(doc, header, plain))
		}
		DocType::Zlib => {
			let mut cursor = body_start;
			let uncompressed_len = wire_size(doc, &mut cursor)?;
			let compressed_len = wire_size(doc, &mut cursor)?;
			let blob = compressed(doc, cursor, compressed_len)?;

			let mut plain = Vec::with_capacity(uncompressed_len);
			ZlibDecoder::new(blob)
				.read_to_end(&mut plain)
				.map_err(|err| {
					SimpleError::new(ErrorKind::Decompress).with_message(format!("zlib: {err}"))
				})?;
			if plain.len() != uncompressed_len {
				return Err(SimpleError::new(ErrorKind::Decompress)
					.with_message(format!(
						"zlib body inflated to {} bytes, header promised {uncompressed_len}",
						plain.len(),
					))
					.into());
			}
			Ok(rebuild(doc, header, plain))
		}
	}
}

/// Read a varint-encoded size from the compression framing.
fn wire_size(doc: &[u8], cursor: &mut usize) -> Result<usize> {
	let at = *cursor;
	let (value, used) = match varint::decode(doc, at) {
		Ok(pair) => pair,
		Err(VarintError::Overflow) => {
			return Err(SourceError::from_source(ErrorKind::BadVarint, doc, at, 8).into())
		}
		Err(VarintError::Truncated) => {
			return Err(SourceError::from_source(ErrorKind::Truncated, doc, at, 8).into())
		}
	};
	if value > MAX_SIZE {
		return Err(ErrorKind::BadSize(value).into());
	}
	*cursor = at + used;
	Ok(value as usize)
}

/// The compressed blob, bounds-checked against the document.
fn compressed(doc: &[u8], at: usize, len: usize) -> Result<&[u8]> {
	doc.get(at..at + len).ok_or_else(|| {
		SimpleError::new(ErrorKind::Truncated)
			.with_message("compressed body extends past the end of the document")
			.into()
	})
}

fn snappy(blob: &[u8]) -> Result<Vec<u8>> {
	trace!(compressed = blob.len(), "decompressing snappy body");
	snap::raw::Decoder::new().decompress_vec(blob).map_err(|err| {
		SimpleError::new(ErrorKind::Decompress)
			.with_message(format!("snappy: {err}"))
			.into()
	})
}

/// Splice decompressed plaintext back into the offset space the encoder
/// used: v1 offsets count from the document start, so the header region is
/// kept in front; v2+ offsets are one-based from the body, so a single pad
/// byte suffices.
fn rebuild<'doc>(doc: &[u8], header: &Header, plain: Vec<u8>) -> Body<'doc> {
	debug!(
		plain = plain.len(),
		version = header.version,
		"rebuilt body after decompression"
	);
	if header.version == 1 {
		let mut buf = Vec::with_capacity(header.body_start + plain.len());
		buf.extend_from_slice(&doc[..header.body_start]);
		buf.extend_from_slice(&plain);
		Body {
			buf: Cow::Owned(buf),
			start: header.body_start,
		}
	} else {
		let mut buf = Vec::with_capacity(plain.len() + 1);
		buf.push(0);
		buf.extend_from_slice(&plain);
		Body {
			buf: Cow::Owned(buf),
			start: 1,
		}
	}
}
