#![forbid(unsafe_code)]

pub mod expr;
pub use expr::*;

// Note: For API simplicity these are also exported out of `expr`.
pub mod format;
pub mod literal;
pub mod names;
pub mod subst;
pub mod types;

pub use literal::Literal;
pub use names::{Name, NameGen};
pub use subst::{substitute, BindingEnv, Bindings};
pub use types::{TypeEnv, VField, VType};
