pub mod error;
pub mod obs;
pub mod options;
pub mod query;
pub mod update;
mod util;

pub use crate::error::{Error, Result};
pub use crate::update::UpdateEngine;
