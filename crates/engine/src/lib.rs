pub mod content;
pub mod error;
pub mod flow;
pub mod log;
pub mod registry;
pub mod rules;
pub mod sqlite_store;
pub mod store;

pub use content::*;
pub use error::*;
pub use flow::*;
pub use log::*;
pub use registry::*;
pub use rules::{next_status, rule_for, PartyRequirement, Requirement, TransitionRule};
pub use sqlite_store::*;
pub use store::*;
