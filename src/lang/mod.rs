//! # Cinder value model
//!
//! This module defines the dynamically typed value that every temporary,
//! stack slot and heap cell of the virtual machine holds.
//!
//! ## Documentation conventions
//!
//! - `t[i]` denotes temporary register `i`.
//! - Coercions are written `as_bool(v)`, `as_number(v)`, `as_text(v)`.

pub mod value;

pub use value::{NULL_HANDLE, NUMBER_EPSILON, ObjectHandle, Value, ValueKind};
