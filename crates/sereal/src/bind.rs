//! Binding decoded values into typed destinations.
//!
//! [`FromSereal`] is the seam between the dynamic value graph and a caller's
//! types. References and object wrappers are looked through transparently,
//! undef clears the destination, and numeric widening is permitted where it
//! cannot lose information; anything else is a fatal type mismatch.

use std::any::type_name;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};

use crate::decode::error::{Error, ErrorKind, Result, SimpleError};
use crate::registry;
use crate::value::{Value, View};

pub use self::record::{bind_record, FieldDef, Record};

mod record;

/// Types that can be populated from a decoded Sereal value.
pub trait FromSereal: Any {
	/// Bind the value behind `view` into `into`.
	fn from_sereal(view: View<'_>, into: &mut Self) -> Result<()>;

	/// Consume an OBJECT_FREEZE payload directly into this destination.
	///
	/// Types with their own frozen representation override this; the default
	/// answers `None`, which sends resolution to the class registry.
	fn thaw_frozen(class: &str, payload: &[u8], into: &mut Self) -> Option<Result<()>> {
		let _ = (class, payload, into);
		None
	}
}

/// Resolve an OBJECT_FREEZE value into a typed destination.
///
/// Order: the destination's own capability, then the class registry (the
/// registered type is thawed and must then be the destination type), and
/// otherwise the class is reported as missing an unmarshaler.
pub fn bind_frozen<T: FromSereal>(class: &str, payload: &[u8], into: &mut T) -> Result<()> {
	if let Some(result) = T::thaw_frozen(class, payload, into) {
		return result;
	}

	match registry::thaw(class, payload) {
		Some(Ok(thawed)) => match thawed.downcast::<T>() {
			Ok(value) => {
				*into = *value;
				Ok(())
			}
			Err(_) => Err(SimpleError::new(ErrorKind::BadDestination(type_name::<T>()))
				.with_message(format!(
					"class {class:?} thaws into a different type than {}",
					type_name::<T>(),
				))
				.into()),
		},
		Some(Err(err)) => Err(SimpleError::new(ErrorKind::ThawFailed(class.to_owned()))
			.with_message(format!("FREEZE unmarshaler for class {class:?} failed: {err}"))
			.into()),
		None => Err(ErrorKind::ThawMissing(class.to_owned()).into()),
	}
}

fn mismatch<T>(view: View<'_>) -> Error {
	SimpleError::new(ErrorKind::BadDestination(type_name::<T>()))
		.with_message(format!(
			"cannot bind a {} into {}",
			view.value().kind(),
			type_name::<T>(),
		))
		.into()
}

fn out_of_range<T>(view: View<'_>) -> Error {
	SimpleError::new(ErrorKind::BadDestination(type_name::<T>()))
		.with_message(format!(
			"decoded {} does not fit in {}",
			view.value().kind(),
			type_name::<T>(),
		))
		.into()
}

macro_rules! impl_from_sereal_int {
	($($ty:ty),+ $(,)?) => {$(
		impl FromSereal for $ty {
			fn from_sereal(view: View<'_>, into: &mut Self) -> Result<()> {
				let view = view.resolved()?;
				*into = match view.value() {
					Value::Int(v) => {
						<$ty>::try_from(*v).map_err(|_| out_of_range::<$ty>(view))?
					}
					Value::UInt(v) => {
						<$ty>::try_from(*v).map_err(|_| out_of_range::<$ty>(view))?
					}
					Value::Undef | Value::CanonicalUndef => 0,
					Value::Frozen { class, payload } => {
						return bind_frozen(class, payload, into)
					}
					_ => return Err(mismatch::<$ty>(view)),
				};
				Ok(())
			}
		}
	)+};
}

impl_from_sereal_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromSereal for bool {
	fn from_sereal(view: View<'_>, into: &mut Self) -> Result<()> {
		let view = view.resolved()?;
		*into = match view.value() {
			Value::Bool(v) => *v,
			Value::Undef | Value::CanonicalUndef => false,
			Value::Frozen { class, payload } => return bind_frozen(class, payload, into),
			_ => return Err(mismatch::<bool>(view)),
		};
		Ok(())
	}
}

impl FromSereal for f64 {
	fn from_sereal(view: View<'_>, into: &mut Self) -> Result<()> {
		let view = view.resolved()?;
		*into = match view.value() {
			Value::Double(v) => *v,
			Value::Float(v) => f64::from(*v),
			Value::Undef | Value::CanonicalUndef => 0.0,
			Value::Frozen { class, payload } => return bind_frozen(class, payload, into),
			_ => return Err(mismatch::<f64>(view)),
		};
		Ok(())
	}
}

impl FromSereal for f32 {
	fn from_sereal(view: View<'_>, into: &mut Self) -> Result<()> {
		let view = view.resolved()?;
		*into = match view.value() {
			Value::Float(v) => *v,
			Value::Undef | Value::CanonicalUndef => 0.0,
			Value::Frozen { class, payload } => return bind_frozen(class, payload, into),
			_ => return Err(mismatch::<f32>(view)),
		};
		Ok(())
	}
}

impl FromSereal for String {
	fn from_sereal(view: View<'_>, into: &mut Self) -> Result<()> {
		let view = view.resolved()?;
		match view.value() {
			Value::Str(text) => {
				into.clear();
				into.push_str(text);
			}
			Value::Bytes(bytes) => {
				let text = std::str::from_utf8(bytes)
					.map_err(|_| Error::from(ErrorKind::InvalidUtf8))?;
				into.clear();
				into.push_str(text);
			}
			Value::Undef | Value::CanonicalUndef => into.clear(),
			Value::Frozen { class, payload } => return bind_frozen(class, payload, into),
			_ => return Err(mismatch::<String>(view)),
		}
		Ok(())
	}
}

/// Owned byte destination for BINARY / SHORT_BINARY / STR_UTF8 payloads.
///
/// A dedicated newtype keeps `Vec<u8>` destinations distinct from element
/// sequences. As a byte-sequence slot it also accepts a raw OBJECT_FREEZE
/// payload verbatim.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Bytes(pub Vec<u8>);

impl std::ops::Deref for Bytes {
	type Target = [u8];

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl From<Vec<u8>> for Bytes {
	fn from(bytes: Vec<u8>) -> Self {
		Self(bytes)
	}
}

impl FromSereal for Bytes {
	fn from_sereal(view: View<'_>, into: &mut Self) -> Result<()> {
		let view = view.resolved()?;
		match view.value() {
			Value::Bytes(bytes) => into.0 = bytes.clone(),
			Value::Str(text) => into.0 = text.clone().into_bytes(),
			Value::Undef | Value::CanonicalUndef => into.0.clear(),
			Value::Frozen { payload, .. } => into.0 = payload.clone(),
			_ => return Err(mismatch::<Bytes>(view)),
		}
		Ok(())
	}

	fn thaw_frozen(_class: &str, payload: &[u8], into: &mut Self) -> Option<Result<()>> {
		into.0 = payload.to_vec();
		Some(Ok(()))
	}
}

impl<T: FromSereal + Default> FromSereal for Vec<T> {
	fn from_sereal(view: View<'_>, into: &mut Self) -> Result<()> {
		let view = view.resolved()?;
		match view.value() {
			Value::Seq(_) => {
				into.clear();
				into.reserve(view.items().len());
				for item in view.items() {
					let mut element = T::default();
					T::from_sereal(item, &mut element)?;
					into.push(element);
				}
			}
			Value::Undef | Value::CanonicalUndef => into.clear(),
			Value::Frozen { class, payload } => return bind_frozen(class, payload, into),
			_ => return Err(mismatch::<Vec<T>>(view)),
		}
		Ok(())
	}
}

impl<T: FromSereal + Default, const N: usize> FromSereal for [T; N] {
	fn from_sereal(view: View<'_>, into: &mut Self) -> Result<()> {
		let view = view.resolved()?;
		match view.value() {
			Value::Seq(_) => {
				// Fixed-length slot: fill the existing slots and discard
				// decoded elements past the end.
				for (slot, item) in into.iter_mut().zip(view.items()) {
					T::from_sereal(item, slot)?;
				}
			}
			Value::Undef | Value::CanonicalUndef => {
				for slot in into.iter_mut() {
					*slot = T::default();
				}
			}
			Value::Frozen { class, payload } => return bind_frozen(class, payload, into),
			_ => return Err(mismatch::<[T; N]>(view)),
		}
		Ok(())
	}
}

impl<T: FromSereal + Default> FromSereal for Option<T> {
	fn from_sereal(view: View<'_>, into: &mut Self) -> Result<()> {
		let view = view.resolved()?;
		if view.is_undef() {
			*into = None;
		} else {
			let mut value = T::default();
			T::from_sereal(view, &mut value)?;
			*into = Some(value);
		}
		Ok(())
	}
}

/// Mapping key as text; non-UTF-8 keys degrade lossily rather than failing.
fn key_string(view: View<'_>) -> Result<String> {
	let view = view.resolved()?;
	match view.value() {
		Value::Str(text) => Ok(text.clone()),
		Value::Bytes(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
		_ => Err(ErrorKind::ExpectedStringish.into()),
	}
}

macro_rules! impl_from_sereal_map {
	($($map:ident),+ $(,)?) => {$(
		impl<T: FromSereal + Default> FromSereal for $map<String, T> {
			fn from_sereal(view: View<'_>, into: &mut Self) -> Result<()> {
				let view = view.resolved()?;
				match view.value() {
					Value::Map(_) => {
						into.clear();
						for (key, value) in view.entries() {
							let key = key_string(key)?;
							let mut element = T::default();
							T::from_sereal(value, &mut element)?;
							into.insert(key, element);
						}
					}
					Value::Undef | Value::CanonicalUndef => into.clear(),
					Value::Frozen { class, payload } => {
						return bind_frozen(class, payload, into)
					}
					_ => return Err(mismatch::<$map<String, T>>(view)),
				}
				Ok(())
			}
		}
	)+};
}

impl_from_sereal_map!(HashMap, BTreeMap);
