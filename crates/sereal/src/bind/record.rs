//! Record (struct-shaped) destinations.
//!
//! A mapping value binds into a record by resolving each key to a field:
//! explicit wire names first, then the declared field name, then a
//! case-insensitive match for keys produced by languages whose idiom
//! lowercases them. Keys that resolve to no field are dropped. The
//! key-to-field index is memoized per concrete type for the life of the
//! process; there is at most one map per type, ever.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::decode::error::Result;
use crate::value::{Value, View};

use super::{bind_frozen, mismatch, FromSereal};

/// Descriptor for one bindable field of a record.
pub struct FieldDef<T> {
	/// Declared field name, matched against decoded mapping keys.
	pub name: &'static str,

	/// Explicit wire name taking precedence over `name`.
	pub rename: Option<&'static str>,

	/// Binds a decoded value into the field.
	pub bind: fn(&mut T, View<'_>) -> Result<()>,
}

/// Struct-shaped destinations with named fields.
///
/// Implementors list their fields once; [`bind_record`] does the key
/// resolution. A record with no fields binds as a no-op.
pub trait Record: Any + Default + Sized {
	/// Field descriptors, in declaration order.
	fn fields() -> &'static [FieldDef<Self>];
}

/// Key-to-field-index lookup for one record type.
struct FieldMap {
	exact: HashMap<&'static str, usize>,
	folded: HashMap<String, usize>,
}

impl FieldMap {
	fn build<T: Record>() -> Self {
		let fields = T::fields();
		let mut exact = HashMap::with_capacity(fields.len() * 2);
		let mut folded = HashMap::with_capacity(fields.len());
		for (index, field) in fields.iter().enumerate() {
			if let Some(rename) = field.rename {
				exact.insert(rename, index);
			}
			exact.entry(field.name).or_insert(index);
			folded
				.entry(field.rename.unwrap_or(field.name).to_lowercase())
				.or_insert(index);
		}
		Self { exact, folded }
	}

	fn resolve(&self, key: &str) -> Option<usize> {
		self.exact
			.get(key)
			.or_else(|| self.folded.get(&key.to_lowercase()))
			.copied()
	}
}

static FIELD_MAPS: OnceLock<Mutex<HashMap<TypeId, &'static FieldMap>>> = OnceLock::new();

fn field_map<T: Record>() -> &'static FieldMap {
	let maps = FIELD_MAPS.get_or_init(Default::default);
	let mut maps = match maps.lock() {
		Ok(guard) => guard,
		Err(poisoned) => poisoned.into_inner(),
	};
	*maps
		.entry(TypeId::of::<T>())
		.or_insert_with(|| Box::leak(Box::new(FieldMap::build::<T>())))
}

/// Bind a decoded mapping into a record.
///
/// This is the body of a typical [`FromSereal`] implementation for a struct.
pub fn bind_record<T: Record + FromSereal>(view: View<'_>, into: &mut T) -> Result<()> {
	let view = view.resolved()?;
	match view.value() {
		Value::Map(_) => {
			let fields = T::fields();
			let map = field_map::<T>();
			for (key, value) in view.entries() {
				let Some(key) = key.resolved()?.as_str() else {
					// Non-UTF-8 keys cannot name a field.
					continue;
				};
				if let Some(index) = map.resolve(key) {
					(fields[index].bind)(into, value)?;
				}
				// Unresolved keys are dropped.
			}
			Ok(())
		}
		Value::Undef | Value::CanonicalUndef => {
			*into = T::default();
			Ok(())
		}
		Value::Frozen { class, payload } => bind_frozen(class, payload, into),
		_ => Err(mismatch::<T>(view)),
	}
}
