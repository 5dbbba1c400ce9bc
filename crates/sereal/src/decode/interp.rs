//! The tag interpreter: a recursive state machine over body bytes.
//!
//! Each token is one tag byte (with an optional track flag in the high bit)
//! followed by tag-specific operands. Containers reserve their node in the
//! graph before decoding children, so back-references from inside a
//! container can resolve it; the tracking table maps the byte offset of
//! every track-flagged token to the node it produced, with the first
//! registration winning.

use std::collections::HashMap;

use tracing::trace;

use crate::constants::MAX_SIZE;
use crate::tag;
use crate::value::{Graph, NodeId, Value};
use crate::varint::{self, VarintError};

use super::error::{Error, ErrorKind, Result, SourceError};

/// Bytes of context shown either side of an error offset.
const SNIPPET_CONTEXT: usize = 8;

pub(crate) struct Interp<'body> {
	buf: &'body [u8],
	start: usize,
	compat: bool,
	max_depth: usize,
	graph: Graph,
	tracked: HashMap<usize, NodeId>,
	copy_depth: usize,
	depth: usize,
}

impl<'body> Interp<'body> {
	pub(crate) fn new(buf: &'body [u8], start: usize, compat: bool, max_depth: usize) -> Self {
		Self {
			buf,
			start,
			compat,
			max_depth,
			graph: Graph::default(),
			tracked: HashMap::new(),
			copy_depth: 0,
			depth: 0,
		}
	}

	/// Decode one complete value starting at the body start.
	pub(crate) fn run(mut self) -> Result<(Graph, NodeId)> {
		let mut cursor = self.start;
		let root = self.node(&mut cursor)?;
		trace!(
			nodes = self.graph.len(),
			tracked = self.tracked.len(),
			consumed = cursor - self.start,
			"body decoded"
		);
		Ok((self.graph, root))
	}

	fn err(&self, kind: ErrorKind, at: usize) -> Error {
		SourceError::from_source(kind, self.buf, at, SNIPPET_CONTEXT).into()
	}

	fn byte(&self, at: usize) -> Result<u8> {
		self.buf
			.get(at)
			.copied()
			.ok_or_else(|| self.err(ErrorKind::Truncated, at))
	}

	fn varint(&self, cursor: &mut usize) -> Result<u64> {
		let at = *cursor;
		match varint::decode(self.buf, at) {
			Ok((value, used)) => {
				*cursor = at + used;
				Ok(value)
			}
			Err(VarintError::Overflow) => Err(self.err(ErrorKind::BadVarint, at)),
			Err(VarintError::Truncated) => Err(self.err(ErrorKind::Truncated, at)),
		}
	}

	/// A varint that is a size (length or count): capped at 2³¹−1.
	fn size(&self, cursor: &mut usize) -> Result<usize> {
		let at = *cursor;
		let value = self.varint(cursor)?;
		if value > MAX_SIZE {
			return Err(self.err(ErrorKind::BadSize(value), at));
		}
		Ok(value as usize)
	}

	/// A varint that is a back-reference offset: must land inside the body.
	fn offset(&self, cursor: &mut usize) -> Result<usize> {
		let at = *cursor;
		let value = self.varint(cursor)?;
		if value < self.start as u64 || value >= self.buf.len() as u64 {
			return Err(self.err(ErrorKind::BadOffset(value), at));
		}
		Ok(value as usize)
	}

	fn take(&self, cursor: &mut usize, len: usize) -> Result<&'body [u8]> {
		let at = *cursor;
		let bytes = self
			.buf
			.get(at..at + len)
			.ok_or_else(|| self.err(ErrorKind::Truncated, at))?;
		*cursor = at + len;
		Ok(bytes)
	}

	/// Register a tracked token's node. First registration wins, so nodes a
	/// handler pre-registered (containers, compat REFN) are not clobbered.
	fn track(&mut self, offset: usize, id: NodeId) {
		self.tracked.entry(offset).or_insert(id);
	}

	fn leaf(&mut self, track: bool, start: usize, value: Value) -> NodeId {
		let id = self.graph.push(value);
		if track {
			self.track(start, id);
		}
		id
	}

	/// Decode one token (and its children) into the graph.
	fn node(&mut self, cursor: &mut usize) -> Result<NodeId> {
		self.depth += 1;
		if self.depth > self.max_depth {
			return Err(self.err(ErrorKind::DepthLimit, *cursor));
		}
		let id = self.node_inner(cursor);
		self.depth -= 1;
		id
	}

	fn node_inner(&mut self, cursor: &mut usize) -> Result<NodeId> {
		let mut byte = self.byte(*cursor)?;
		while byte & !tag::TRACK_FLAG == tag::PAD {
			*cursor += 1;
			byte = self.byte(*cursor)?;
		}

		let start = *cursor;
		let track = byte & tag::TRACK_FLAG != 0;
		let tag = byte & !tag::TRACK_FLAG;
		*cursor += 1;
		trace!(offset = start, tag = %format!("0x{tag:02X}"), track, "token");

		let id = match tag {
			0x00..=tag::POS_HIGH => self.leaf(track, start, Value::Int(i64::from(tag))),
			tag::NEG_LOW..=tag::NEG_HIGH => {
				self.leaf(track, start, Value::Int(i64::from(tag) - 32))
			}
			tag::VARINT => {
				let raw = self.varint(cursor)?;
				let value = match i64::try_from(raw) {
					Ok(signed) => Value::Int(signed),
					Err(_) => Value::UInt(raw),
				};
				self.leaf(track, start, value)
			}
			tag::ZIGZAG => {
				let raw = self.varint(cursor)?;
				self.leaf(track, start, Value::Int(-((raw >> 1) as i64) - 1))
			}
			tag::FLOAT => {
				let bytes = self.take(cursor, 4)?;
				let mut raw = [0u8; 4];
				raw.copy_from_slice(bytes);
				self.leaf(track, start, Value::Float(f32::from_le_bytes(raw)))
			}
			tag::DOUBLE => {
				let bytes = self.take(cursor, 8)?;
				let mut raw = [0u8; 8];
				raw.copy_from_slice(bytes);
				self.leaf(track, start, Value::Double(f64::from_le_bytes(raw)))
			}
			tag::UNDEF => self.leaf(track, start, Value::Undef),
			tag::CANONICAL_UNDEF => {
				let value = if self.compat {
					Value::CanonicalUndef
				} else {
					Value::Undef
				};
				self.leaf(track, start, value)
			}
			tag::TRUE => self.leaf(track, start, Value::Bool(true)),
			tag::FALSE => self.leaf(track, start, Value::Bool(false)),
			tag::BINARY => {
				let len = self.size(cursor)?;
				let bytes = self.take(cursor, len)?;
				self.leaf(track, start, Value::Bytes(bytes.to_vec()))
			}
			tag::SHORT_BINARY_LOW..=tag::SHORT_BINARY_HIGH => {
				let bytes = self.take(cursor, tag::short_binary_len(tag))?;
				self.leaf(track, start, Value::Bytes(bytes.to_vec()))
			}
			tag::STR_UTF8 => {
				let len = self.size(cursor)?;
				let at = *cursor;
				let bytes = self.take(cursor, len)?;
				let text = String::from_utf8(bytes.to_vec())
					.map_err(|_| self.err(ErrorKind::InvalidUtf8, at))?;
				self.leaf(track, start, Value::Str(text))
			}
			tag::REFN => {
				if self.compat {
					let outer = self.graph.reserve();
					if track {
						self.track(start, outer);
					}
					let child = self.node(cursor)?;
					self.graph.set(outer, Value::Ref(child));
					outer
				} else {
					// Transparent: the reference collapses onto its target,
					// which is what later back-references observe.
					let child = self.node(cursor)?;
					if track {
						self.track(start, child);
					}
					child
				}
			}
			tag::REFP => {
				let at = *cursor;
				let offset = self.offset(cursor)?;
				let target = *self
					.tracked
					.get(&offset)
					.ok_or_else(|| self.err(ErrorKind::UntrackedOffset(offset as u64), at))?;
				self.leaf(track, start, Value::Ref(target))
			}
			tag::ALIAS => {
				let at = *cursor;
				let offset = self.offset(cursor)?;
				let target = *self
					.tracked
					.get(&offset)
					.ok_or_else(|| self.err(ErrorKind::UntrackedOffset(offset as u64), at))?;
				if track {
					self.track(start, target);
				}
				target
			}
			tag::ARRAY => {
				let count = self.size(cursor)?;
				self.array(cursor, count, track, start, false)?
			}
			tag::ARRAYREF_LOW..=tag::ARRAYREF_HIGH => {
				self.array(cursor, tag::nibble_count(tag), track, start, true)?
			}
			tag::HASH => {
				let pairs = self.size(cursor)?;
				self.hash(cursor, pairs, track, start, false)?
			}
			tag::HASHREF_LOW..=tag::HASHREF_HIGH => {
				self.hash(cursor, tag::nibble_count(tag), track, start, true)?
			}
			tag::OBJECT => {
				let class = self.stringish_node(cursor)?;
				self.object(cursor, class, track, start)?
			}
			tag::OBJECTV => {
				let offset = self.offset(cursor)?;
				let class = self.stringish_node_at(offset)?;
				self.object(cursor, class, track, start)?
			}
			tag::OBJECT_FREEZE => {
				let class = self.stringish_node(cursor)?;
				let class = self.string_of(class);
				self.frozen(cursor, class, track, start)?
			}
			tag::OBJECTV_FREEZE => {
				let offset = self.offset(cursor)?;
				let class = self.stringish_node_at(offset)?;
				let class = self.string_of(class);
				self.frozen(cursor, class, track, start)?
			}
			tag::COPY => {
				let at = *cursor;
				let offset = self.offset(cursor)?;
				if offset >= start {
					// COPY only ever splices earlier bytes; a forward target
					// could loop back onto this very token.
					return Err(self.err(ErrorKind::BadOffset(offset as u64), at));
				}
				if self.copy_depth > 0 && !self.is_stringish(offset) {
					return Err(self.err(ErrorKind::NestedCopyNotStringish, at));
				}
				self.copy_depth += 1;
				let mut target_cursor = offset;
				let copied = self.node(&mut target_cursor);
				self.copy_depth -= 1;
				let id = copied?;
				if track {
					self.track(start, id);
				}
				id
			}
			tag::WEAKEN => {
				if self.compat {
					let outer = self.graph.reserve();
					if track {
						self.track(start, outer);
					}
					let child = self.node(cursor)?;
					self.graph.set(outer, Value::Weak(child));
					outer
				} else {
					let child = self.node(cursor)?;
					if track {
						self.track(start, child);
					}
					child
				}
			}
			tag::REGEXP => {
				let pattern = self.stringish_node(cursor)?;
				let flags = self.stringish_node(cursor)?;
				self.leaf(track, start, Value::Regexp { pattern, flags })
			}
			tag::PAD => unreachable!("pad bytes are skipped above"),
			// Unassigned on the wire; no known encoder emits it.
			tag::LONG_DOUBLE => return Err(self.err(ErrorKind::UnknownTag(tag), start)),
			_ => return Err(self.err(ErrorKind::UnknownTag(tag), start)),
		};

		Ok(id)
	}

	fn array(
		&mut self,
		cursor: &mut usize,
		count: usize,
		track: bool,
		start: usize,
		wrap: bool,
	) -> Result<NodeId> {
		// Trivial lower bound of one tag byte per element.
		if count > self.buf.len() - *cursor {
			return Err(self.err(ErrorKind::Truncated, start));
		}
		let seq = self.graph.reserve();
		if track {
			self.track(start, seq);
		}
		let mut items = Vec::with_capacity(count);
		for _ in 0..count {
			items.push(self.node(cursor)?);
		}
		self.graph.set(seq, Value::Seq(items));
		if wrap && self.compat {
			Ok(self.graph.push(Value::Ref(seq)))
		} else {
			Ok(seq)
		}
	}

	fn hash(
		&mut self,
		cursor: &mut usize,
		pairs: usize,
		track: bool,
		start: usize,
		wrap: bool,
	) -> Result<NodeId> {
		if pairs > (self.buf.len() - *cursor) / 2 {
			return Err(self.err(ErrorKind::Truncated, start));
		}
		let map = self.graph.reserve();
		if track {
			self.track(start, map);
		}
		let mut entries = Vec::with_capacity(pairs);
		for _ in 0..pairs {
			let key_at = *cursor;
			let key = self.node(cursor)?;
			// A key need only decode into a string: a back-reference (or, in
			// compat mode, a reference wrapper) to one is fine.
			match self.graph.get(self.resolve_refs(key)) {
				Value::Bytes(_) | Value::Str(_) => {}
				_ => return Err(self.err(ErrorKind::ExpectedStringish, key_at)),
			}
			let value = self.node(cursor)?;
			entries.push((key, value));
		}
		self.graph.set(map, Value::Map(entries));
		if wrap && self.compat {
			Ok(self.graph.push(Value::Ref(map)))
		} else {
			Ok(map)
		}
	}

	fn object(
		&mut self,
		cursor: &mut usize,
		class: NodeId,
		track: bool,
		start: usize,
	) -> Result<NodeId> {
		if self.compat {
			let outer = self.graph.reserve();
			if track {
				self.track(start, outer);
			}
			let value = self.node(cursor)?;
			self.graph.set(outer, Value::Object { class, value });
			Ok(outer)
		} else {
			// The class name was decoded and validated but is not carried
			// onto the destination.
			let value = self.node(cursor)?;
			if track {
				self.track(start, value);
			}
			Ok(value)
		}
	}

	fn frozen(
		&mut self,
		cursor: &mut usize,
		class: String,
		track: bool,
		start: usize,
	) -> Result<NodeId> {
		let payload_at = *cursor;
		let payload = self.stringish_node(cursor)?;
		let payload = match self.graph.get(payload) {
			Value::Bytes(bytes) => bytes.clone(),
			Value::Str(text) => text.clone().into_bytes(),
			_ => return Err(self.err(ErrorKind::ExpectedStringish, payload_at)),
		};
		Ok(self.leaf(track, start, Value::Frozen { class, payload }))
	}

	/// Decode the next token, requiring it to be stringish.
	fn stringish_node(&mut self, cursor: &mut usize) -> Result<NodeId> {
		let at = *cursor;
		if !self.is_stringish(at) {
			return Err(self.err(ErrorKind::ExpectedStringish, at));
		}
		self.node(cursor)
	}

	/// Materialize the stringish token at a fixed offset without touching
	/// the tracking table or the cursor (OBJECTV class-name lookup).
	fn stringish_node_at(&mut self, offset: usize) -> Result<NodeId> {
		let (bytes, utf8) = self.read_stringish(offset)?;
		let value = if utf8 {
			let text = String::from_utf8(bytes.to_vec())
				.map_err(|_| self.err(ErrorKind::InvalidUtf8, offset))?;
			Value::Str(text)
		} else {
			Value::Bytes(bytes.to_vec())
		};
		Ok(self.graph.push(value))
	}

	/// Resolve the byte payload of the stringish token at `offset`,
	/// following COPY chains (which must point strictly backward).
	fn read_stringish(&self, mut offset: usize) -> Result<(&'body [u8], bool)> {
		loop {
			let mut at = offset;
			let mut byte = self.byte(at)?;
			while byte & !tag::TRACK_FLAG == tag::PAD {
				at += 1;
				byte = self.byte(at)?;
			}
			let tag = byte & !tag::TRACK_FLAG;
			let mut cursor = at + 1;
			match tag {
				tag::BINARY => {
					let len = self.size(&mut cursor)?;
					return Ok((self.take(&mut cursor, len)?, false));
				}
				tag::STR_UTF8 => {
					let len = self.size(&mut cursor)?;
					return Ok((self.take(&mut cursor, len)?, true));
				}
				tag::SHORT_BINARY_LOW..=tag::SHORT_BINARY_HIGH => {
					return Ok((self.take(&mut cursor, tag::short_binary_len(tag))?, false));
				}
				tag::COPY => {
					let target_at = cursor;
					let target = self.offset(&mut cursor)?;
					if target >= at {
						return Err(self.err(ErrorKind::BadOffset(target as u64), target_at));
					}
					offset = target;
				}
				_ => return Err(self.err(ErrorKind::ExpectedStringish, at)),
			}
		}
	}

	/// Whether the token at `offset` ultimately produces a string or byte
	/// value. Bounds failures answer false rather than erroring.
	fn is_stringish(&self, mut offset: usize) -> bool {
		loop {
			let Some(&byte) = self.buf.get(offset) else {
				return false;
			};
			let mut byte = byte;
			while byte & !tag::TRACK_FLAG == tag::PAD {
				offset += 1;
				match self.buf.get(offset) {
					Some(&next) => byte = next,
					None => return false,
				}
			}
			match byte & !tag::TRACK_FLAG {
				tag::BINARY | tag::STR_UTF8 => return true,
				tag::SHORT_BINARY_LOW..=tag::SHORT_BINARY_HIGH => return true,
				tag::COPY => {
					let Ok((target, _)) = varint::decode(self.buf, offset + 1) else {
						return false;
					};
					let target = target as usize;
					if target >= offset || target < self.start {
						return false;
					}
					offset = target;
				}
				_ => return false,
			}
		}
	}

	/// Look through reference, weak-reference, and object wrappers to the
	/// value a node carries. A wrapper chain that never reaches a concrete
	/// value returns the last wrapper, which no concrete-type check accepts.
	fn resolve_refs(&self, mut id: NodeId) -> NodeId {
		for _ in 0..=self.graph.len() {
			match self.graph.get(id) {
				Value::Ref(target) | Value::Weak(target) | Value::Object { value: target, .. } => {
					id = *target;
				}
				_ => return id,
			}
		}
		id
	}

	fn string_of(&self, id: NodeId) -> String {
		// Only called on nodes produced by stringish_node{,_at}.
		match self.graph.get(id) {
			Value::Str(text) => text.clone(),
			Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
			_ => String::new(),
		}
	}
}
