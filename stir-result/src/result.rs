use crate::error::Error;

/// Result type alias used throughout STIR.
///
/// This is a type alias for `std::result::Result<T, Error>`, providing a
/// convenient shorthand for functions that return STIR errors.
pub type Result<T> = std::result::Result<T, Error>;
