mod guard;
mod index;
mod store;

pub use crate::error::ProgressError;
pub use store::ProgressStore;
