pub mod command;
pub mod dialect;
pub mod error;
pub mod evaluate;
pub mod expr;
pub mod operator;
pub mod registry;
pub mod translate;
pub mod value;

pub use error::{Error, Result};
