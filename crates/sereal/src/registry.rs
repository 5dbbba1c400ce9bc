//! Process-wide FREEZE class registry.
//!
//! OBJECT_FREEZE tokens carry a class name and an opaque payload produced by
//! the encoding side's freeze hook. When the destination type cannot consume
//! the payload itself, the decoder looks the class up here and lets the
//! registered type thaw it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// Error type returned by [`Thaw`] implementations.
pub type ThawError = Box<dyn std::error::Error + Send + Sync>;

/// The FREEZE unmarshal capability.
///
/// A registered class is instantiated from its [`Default`] value and handed
/// the payload bytes. Requiring the trait at registration time is this
/// crate's form of validating that the prototype actually exposes the
/// capability.
pub trait Thaw: Default + Any + Send {
	/// Rebuild `self` from a frozen payload.
	fn thaw(&mut self, payload: &[u8]) -> std::result::Result<(), ThawError>;
}

type Factory =
	Arc<dyn Fn(&[u8]) -> std::result::Result<Box<dyn Any + Send>, ThawError> + Send + Sync>;

static REGISTRY: OnceLock<RwLock<HashMap<String, Factory>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, Factory>> {
	REGISTRY.get_or_init(Default::default)
}

/// Register `T` as the unmarshaler for documents carrying `class`.
///
/// The registry is process-wide. Registering the same class again replaces
/// the previous unmarshaler.
pub fn register_class<T: Thaw>(class: impl Into<String>) {
	let factory: Factory = Arc::new(|payload| {
		let mut value = T::default();
		value.thaw(payload)?;
		Ok(Box::new(value) as Box<dyn Any + Send>)
	});

	let mut map = match registry().write() {
		Ok(guard) => guard,
		Err(poisoned) => poisoned.into_inner(),
	};
	map.insert(class.into(), factory);
}

/// Run the registered unmarshaler for `class` on `payload`, if any.
pub(crate) fn thaw(
	class: &str,
	payload: &[u8],
) -> Option<std::result::Result<Box<dyn Any + Send>, ThawError>> {
	let factory = {
		let map = match registry().read() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		map.get(class).cloned()
	};
	factory.map(|factory| factory(payload))
}
