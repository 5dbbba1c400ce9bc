/// Magic bytes for protocol versions 1 and 2 (`=srl` as a little-endian u32)
pub const MAGIC: u32 = 0x6C72_733D;

/// Magic bytes for protocol version 3 (`=\xF3rl`, high bit set to break text tools)
pub const MAGIC_V3: u32 = 0x6C72_F33D;

/// First four bytes of the v3 magic after an accidental UTF-8 re-encode (`=\xC3\xB3r`)
pub const MAGIC_UTF8: u32 = 0x72B3_C33D;

/// Lowest supported protocol version
pub const PROTOCOL_VERSION_MIN: u8 = 1;

/// Highest supported protocol version
pub const PROTOCOL_VERSION_MAX: u8 = 3;

/// Upper bound for any size read off the wire (string lengths, container counts)
pub const MAX_SIZE: u64 = i32::MAX as u64;

/// Default cap on interpreter recursion depth
pub const DEFAULT_MAX_DEPTH: usize = 10_000;
