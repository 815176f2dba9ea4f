//! regulator - declarative drift detection and remediation
//!
//! Operators describe **observations** (state checks against named
//! entities), **reactions** (rules mapping an observation's result to an
//! action), **actions** (commands) and **implements** (reusable observe and
//! react logic sharing one executable). Regulator merges any number of such
//! documents into one catalogue, rejecting records that describe the same
//! real-world check under different names, then picks the command that moves
//! an observed entity back to its expected state.
//!
//! ## Modules
//!
//! - **operation**: catalogue model, merge engine, action resolver
//! - **exec**: local and ssh process execution
//! - **engine**: the observe / react / correct workflow
//! - **input**, **config**, **cli**: the command-line surface

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod input;
pub mod operation;

pub use config::Config;
pub use engine::{Regulator, RunSettings};
pub use error::{RegulatorError, Result};
pub use operation::{DefaultImplements, Operations};
