//! The request line grammar: tokenize, validate, dispatch, format.

pub mod commands;
pub mod executor;

pub use commands::{Command, CommandKind};
pub use executor::Executor;
