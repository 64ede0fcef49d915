//! Error types and result definitions for the STIR lowering compiler.
//!
//! This crate provides a unified error type ([`Error`]) and result type alias
//! ([`Result<T>`]) used throughout the STIR crates. All operations that could
//! fail return `Result<T>`, where the error variant contains detailed
//! information about what went wrong.
//!
//! # Error Categories
//!
//! - **Lowering failures** ([`Error::UnsupportedLowering`]): a table
//!   operation the lowering pass does not recognize, or a table-valued
//!   expression in a position the pass cannot handle.
//! - **Malformed trees** ([`Error::Type`]): structural type derivation
//!   failures such as missing struct fields.
//! - **Internal errors** ([`Error::Internal`]): bugs or unexpected states.

pub mod error;
pub mod result;

pub use error::Error;
pub use result::Result;
