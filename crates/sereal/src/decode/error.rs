//! Error types for [`Decoder`](super::Decoder).
use std::borrow::Cow;

use deku::DekuError;
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// Convenience return type.
pub type Result<T> = std::result::Result<T, Error>;

/// Combined return error type for [`Decoder`](super::Decoder) methods.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
	/// I/O error.
	#[error(transparent)]
	Io(#[from] std::io::Error),

	/// Decoder error that's just a message.
	#[error(transparent)]
	Simple(#[from] SimpleError),

	/// Decoder error that includes source.
	#[error(transparent)]
	Source(#[from] SourceError),
}

impl Error {
	/// The kind of this error, if it carries one.
	pub fn kind(&self) -> Option<&ErrorKind> {
		match self {
			Error::Io(_) => None,
			Error::Simple(err) => Some(&err.kind),
			Error::Source(err) => Some(&err.kind),
		}
	}
}

/// Decoder error.
#[derive(Error, Diagnostic, Debug)]
#[error("sereal decode: {message}")]
pub struct SimpleError {
	/// Error kind.
	pub kind: ErrorKind,

	/// Error message.
	pub message: Cow<'static, str>,
}

/// Decoder error.
#[derive(Error, Diagnostic, Debug)]
#[error("sereal decode: {message}")]
pub struct SourceError {
	/// Error kind.
	pub kind: ErrorKind,

	/// Error message.
	pub message: Cow<'static, str>,

	/// Error location in the document.
	#[label("here")]
	pub at: SourceSpan,

	/// Snippet of the document.
	#[source_code]
	pub snippet: String,
}

impl SimpleError {
	/// New error without source.
	pub fn new(kind: ErrorKind) -> Self {
		let message = kind.default_message();
		Self { kind, message }
	}

	/// New simple error from deku.
	pub fn from_deku(orig: DekuError) -> Self {
		Self::new(ErrorKind::Parse).with_message(orig.to_string())
	}

	/// Change the error message.
	pub fn with_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
		self.message = message.into();
		self
	}
}

impl SourceError {
	/// New error with source snippet.
	pub fn new(kind: ErrorKind, snippet: &[u8], at_byte: usize) -> Self {
		let message = kind.default_message();
		Self {
			kind,
			message,
			snippet: format!("{snippet:02x?}"),
			at: SourceSpan::from((
				(at_byte * 2) + 1, // to account for [
				2,                 // always 2 bytes for the hex value
			)),
		}
	}

	/// New error with source snippet, extracted from a larger source.
	pub fn from_source(kind: ErrorKind, source: &[u8], at_byte: usize, context: usize) -> Self {
		let at_byte = at_byte.min(source.len().saturating_sub(1));
		let start = at_byte.saturating_sub(context);
		let end = at_byte.saturating_add(context).min(source.len());
		Self::new(kind, &source[start..end], at_byte.saturating_sub(start))
	}

	/// Change the error message.
	pub fn with_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
		self.message = message.into();
		self
	}
}

/// Decoder error kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// The document does not start with a recognized Sereal magic.
	BadHeader,

	/// The magic shows the document was accidentally re-encoded as UTF-8.
	Utf8ContaminatedHeader,

	/// The protocol version is outside what this decoder (or the magic
	/// variant it was found under) supports.
	UnsupportedVersion(u8),

	/// The document type nibble is not a known body encoding.
	UnsupportedDocType(u8),

	/// The document type is known but not allowed for this protocol version.
	WrongDocTypeForVersion {
		/// Document type nibble found in the header.
		doc_type: u8,
		/// Protocol version found in the header.
		version: u8,
	},

	/// The buffer ends before the document does.
	Truncated,

	/// A varint does not terminate within ten bytes or overflows u64.
	BadVarint,

	/// A length or count read off the wire exceeds the size cap.
	BadSize(u64),

	/// A back-reference offset lands outside the body.
	BadOffset(u64),

	/// A back-reference offset was never registered by a track-flagged token.
	UntrackedOffset(u64),

	/// A token that must produce a string or byte value does not.
	ExpectedStringish,

	/// An unassigned or reserved tag byte.
	UnknownTag(u8),

	/// The decoded value cannot be bound into the destination type.
	BadDestination(&'static str),

	/// A COPY inside another COPY targets a non-stringish token.
	NestedCopyNotStringish,

	/// Interpreter recursion exceeded the configured depth cap.
	DepthLimit,

	/// The compressed body failed to decompress.
	Decompress,

	/// A text token holds invalid UTF-8.
	InvalidUtf8,

	/// No FREEZE unmarshaler is available for a class.
	ThawMissing(String),

	/// A FREEZE unmarshaler reported failure.
	ThawFailed(String),

	/// Parse error.
	Parse,
}

impl ErrorKind {
	/// Get the default error message for this error kind.
	pub fn default_message(&self) -> Cow<'static, str> {
		match self {
			ErrorKind::BadHeader => Cow::Borrowed("bad header: not a valid Sereal document"),
			ErrorKind::Utf8ContaminatedHeader => Cow::Borrowed(
				"bad header: the document was accidentally re-encoded as UTF-8 text",
			),
			ErrorKind::UnsupportedVersion(version) => Cow::Owned(format!(
				"unsupported protocol version {version}, this decoder supports versions {}-{}",
				crate::PROTOCOL_VERSION_MIN,
				crate::PROTOCOL_VERSION_MAX,
			)),
			ErrorKind::UnsupportedDocType(doc_type) => {
				Cow::Owned(format!("unsupported document type 0x{doc_type:X}"))
			}
			ErrorKind::WrongDocTypeForVersion { doc_type, version } => Cow::Owned(format!(
				"document type 0x{doc_type:X} is not valid for protocol version {version}"
			)),
			ErrorKind::Truncated => Cow::Borrowed("truncated document"),
			ErrorKind::BadVarint => Cow::Borrowed("bad varint"),
			ErrorKind::BadSize(size) => Cow::Owned(format!("bad size {size}")),
			ErrorKind::BadOffset(offset) => Cow::Owned(format!("bad offset {offset}")),
			ErrorKind::UntrackedOffset(offset) => {
				Cow::Owned(format!("offset {offset} was never tracked"))
			}
			ErrorKind::ExpectedStringish => Cow::Borrowed("expected a string or byte token"),
			ErrorKind::UnknownTag(byte) => Cow::Owned(format!("unknown tag 0x{byte:02X}")),
			ErrorKind::BadDestination(what) => {
				Cow::Owned(format!("cannot bind into destination of type {what}"))
			}
			ErrorKind::NestedCopyNotStringish => {
				Cow::Borrowed("nested COPY target is not a string")
			}
			ErrorKind::DepthLimit => Cow::Borrowed("recursion depth limit exceeded"),
			ErrorKind::Decompress => Cow::Borrowed("body decompression failed"),
			ErrorKind::InvalidUtf8 => Cow::Borrowed("invalid UTF-8 in text token"),
			ErrorKind::ThawMissing(class) => {
				Cow::Owned(format!("no FREEZE unmarshaler registered for class {class:?}"))
			}
			ErrorKind::ThawFailed(class) => {
				Cow::Owned(format!("FREEZE unmarshaler for class {class:?} failed"))
			}
			ErrorKind::Parse => Cow::Borrowed("parse error"),
		}
	}
}

impl From<ErrorKind> for SimpleError {
	fn from(ek: ErrorKind) -> Self {
		Self::new(ek)
	}
}

impl From<ErrorKind> for Error {
	fn from(ek: ErrorKind) -> Self {
		Self::Simple(ek.into())
	}
}
