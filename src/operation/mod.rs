//! Operation catalogue
//!
//! The data model for observations, reactions, actions and implements, the
//! engine that merges documents into one catalogue, and the resolver that
//! turns an observed state into the action to run.
//!
//! ```text
//!   documents ──parse──▶ merge (+ defaults) ──▶ Operations ──▶ resolver ──▶ Action
//! ```

pub mod defaults;
pub mod merge;
pub mod models;
pub mod resolver;

pub use defaults::DefaultImplements;
pub use merge::{parse_document, parse_operations};
pub use models::*;
pub use resolver::{
    compute_args, select_action, select_corrective_action, select_implement_action_by_name,
    select_observation, select_observation_result, select_observing_implement, select_reaction,
};
