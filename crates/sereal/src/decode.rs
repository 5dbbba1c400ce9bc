//! Decoder configuration and entry points.
//!
//! A [`Decoder`] is a small bundle of options; every decode call is
//! self-contained and shares nothing with other calls apart from the
//! process-wide class registry and record field caches.

use tracing::{debug, instrument};

use crate::bind::FromSereal;
use crate::constants::DEFAULT_MAX_DEPTH;
use crate::header::{self, Header};
use crate::value::Document;

pub mod error;

mod body;
mod interp;

pub use error::{Error, ErrorKind, Result, SimpleError, SourceError};

/// Sereal document decoder.
///
/// ```
/// use sereal::Decoder;
///
/// // "=srl", version 1, empty user header, ARRAYREF_2, POS_1, POS_2
/// let doc = [0x3D, 0x73, 0x72, 0x6C, 0x01, 0x00, 0x42, 0x01, 0x02];
/// let values: Vec<i64> = Decoder::new().decode_body_as(&doc)?;
/// assert_eq!(values, [1, 2]);
/// # Ok::<(), sereal::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Decoder {
	compat: bool,
	max_depth: usize,
}

impl Default for Decoder {
	fn default() -> Self {
		Self::new()
	}
}

impl Decoder {
	/// New decoder with default options.
	pub fn new() -> Self {
		Self {
			compat: false,
			max_depth: DEFAULT_MAX_DEPTH,
		}
	}

	/// Preserve source-language distinctions instead of flattening them.
	///
	/// In compat mode references, weak references, blessed objects, and the
	/// canonical/plain undef split all survive as their own values; by
	/// default they collapse onto the value they carry.
	pub fn compat(mut self, compat: bool) -> Self {
		self.compat = compat;
		self
	}

	/// Cap on interpreter recursion depth.
	pub fn max_depth(mut self, max_depth: usize) -> Self {
		self.max_depth = max_depth;
		self
	}

	/// Decode the document body into a dynamic value graph.
	#[instrument(level = "debug", skip(self, doc))]
	pub fn decode_body(&self, doc: &[u8]) -> Result<Document> {
		let header = header::parse(doc)?;
		debug!(?header, "parsed document header");
		self.body_document(doc, &header)
	}

	/// Decode the document body into a typed destination.
	pub fn decode_body_into<T: FromSereal>(&self, doc: &[u8], dest: &mut T) -> Result<()> {
		let decoded = self.decode_body(doc)?;
		T::from_sereal(decoded.root(), dest)
	}

	/// Decode the document body into a fresh value of `T`.
	pub fn decode_body_as<T: FromSereal + Default>(&self, doc: &[u8]) -> Result<T> {
		let mut value = T::default();
		self.decode_body_into(doc, &mut value)?;
		Ok(value)
	}

	/// Decode the user header into a dynamic value graph.
	///
	/// Fails unless the document carries a non-trivial user header whose
	/// flag byte marks it as Sereal-encoded.
	#[instrument(level = "debug", skip(self, doc))]
	pub fn decode_header(&self, doc: &[u8]) -> Result<Document> {
		let header = header::parse(doc)?;
		debug!(?header, "parsed document header");
		self.header_document(doc, &header)
	}

	/// Decode the user header into a typed destination.
	pub fn decode_header_into<T: FromSereal>(&self, doc: &[u8], dest: &mut T) -> Result<()> {
		let decoded = self.decode_header(doc)?;
		T::from_sereal(decoded.root(), dest)
	}

	/// Decode the user header and the body in one pass.
	///
	/// Each region gets its own tracking table; offsets never cross between
	/// the two.
	#[instrument(level = "debug", skip(self, doc, header_dest, body_dest))]
	pub fn decode_into<H: FromSereal, B: FromSereal>(
		&self,
		doc: &[u8],
		header_dest: &mut H,
		body_dest: &mut B,
	) -> Result<()> {
		let header = header::parse(doc)?;
		debug!(?header, "parsed document header");

		let decoded = self.header_document(doc, &header)?;
		H::from_sereal(decoded.root(), header_dest)?;

		let decoded = self.body_document(doc, &header)?;
		B::from_sereal(decoded.root(), body_dest)
	}

	/// Assemble and interpret the body region.
	#[cfg_attr(feature = "expose-internals", visibility::make(pub))]
	fn body_document(&self, doc: &[u8], header: &Header) -> Result<Document> {
		let body = body::assemble(doc, header)?;
		debug!(
			len = body.buf.len(),
			start = body.start,
			"assembled decodable body"
		);
		let (graph, root) =
			interp::Interp::new(&body.buf, body.start, self.compat, self.max_depth).run()?;
		Ok(Document::new(graph, root))
	}

	/// Interpret the user-header region.
	///
	/// The first suffix byte is a flag byte; its low bit marks the remaining
	/// suffix bytes as Sereal-encoded. Offsets inside the suffix follow the
	/// same base rule as the body: absolute for v1, one-based from the flag
	/// byte for v2 and later.
	#[cfg_attr(feature = "expose-internals", visibility::make(pub))]
	fn header_document(&self, doc: &[u8], header: &Header) -> Result<Document> {
		if header.user_header_len <= 1 {
			return Err(SimpleError::new(ErrorKind::BadHeader)
				.with_message("document has no user header to decode")
				.into());
		}

		let flag_at = header.suffix_start;
		let flag = doc
			.get(flag_at)
			.copied()
			.ok_or_else(|| Error::from(ErrorKind::Truncated))?;
		if flag & 1 == 0 {
			return Err(SimpleError::new(ErrorKind::BadHeader)
				.with_message("user header is not Sereal-encoded")
				.into());
		}

		let (buf, start) = if header.version == 1 {
			(&doc[..header.body_start], flag_at + 1)
		} else {
			(&doc[flag_at..header.body_start], 1)
		};
		let (graph, root) =
			interp::Interp::new(buf, start, self.compat, self.max_depth).run()?;
		Ok(Document::new(graph, root))
	}
}
