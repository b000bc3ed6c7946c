//! Input-shape validation for request payloads.

pub mod rules;

pub use validator::Validate;
