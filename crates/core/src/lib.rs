#![forbid(unsafe_code)]

pub mod catalog;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod time;

pub use catalog::{CatalogError, ContentCatalog, StaticCatalog};
pub use error::Error;
pub use time::Clock;
