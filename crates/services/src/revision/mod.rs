mod controller;
mod flow;

pub use crate::error::RevisionFlowError;
pub use controller::{RevisionFlowController, RevisionView};
pub use flow::{Advance, RevisionFlow};
