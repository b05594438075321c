//! Request pipeline middleware, outermost first: admission, decode, integrity

pub mod admission;
pub mod decode;
pub mod integrity;

/// Largest request body the hub buffers
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
