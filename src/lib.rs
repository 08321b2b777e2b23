//! Form balanced student project teams sharing a meeting time.
//!
//! Students are assigned to projects so that the weakest team is as strong as
//! possible, one job at a time, with every improvement persisted and streamed.

pub mod checks;
pub mod config;
pub mod display;
pub mod encoder;
pub mod error;
pub mod loaders;
pub mod model;
pub mod orchestrator;
pub mod publisher;
pub mod remap;
pub mod server;
pub mod solver;
pub mod stats;
pub mod verifier;

pub use crate::config::Config;
pub use crate::error::{Error, Result, ValidationError};
pub use crate::orchestrator::{Job, JobState, Orchestrator};
pub use crate::publisher::SolveResult;
