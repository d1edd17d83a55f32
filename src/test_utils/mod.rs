//! Helpers shared by unit tests and the engine-level tests running against
//! an in-process ensemble.
mod common;
mod mock_ensemble;

pub(crate) use common::*;
pub(crate) use mock_ensemble::*;
