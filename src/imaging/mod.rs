//! Image operation vocabulary and pure pixel operations.
//!
//! Split into two layers, mirroring how the rest of the crate consumes them:
//!
//! - [`params`]: typed parameter values ([`Quality`], [`OutputFormat`],
//!   [`Direction`]) produced by the spec validator.
//! - [`ops`]: pure functions over decoded pixels — resize, crop, mirror,
//!   filters, decode/encode. Reentrant, no side effects.

pub mod ops;
pub mod params;

pub use ops::{OperationError, crop, decode, encode, grayscale, mirror, resize, sepia};
pub use params::{Direction, OutputFormat, Quality};
