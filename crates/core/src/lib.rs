//! Domain types shared by the fetch-job client and orchestrator.

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::{CoreError, Result};
