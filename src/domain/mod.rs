//! Domain layer: value types, constants and the XML document model.
//! Pure data and pure functions; no I/O.

pub mod artifact;
pub mod constants;
pub mod credential;
pub mod types;
pub mod verification;
pub mod xml;
