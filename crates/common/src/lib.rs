//! Common types shared by the X OAuth relay crates

mod compare;
mod error;
mod secret;

pub use compare::constant_time_eq;
pub use error::{Error, Result};
pub use secret::Secret;
