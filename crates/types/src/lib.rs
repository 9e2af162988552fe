pub mod document;
pub mod hash;
pub mod ids;
pub mod integrity;
pub mod ledger;
pub mod principal;
pub mod run;
pub mod transaction;

pub use document::*;
pub use hash::*;
pub use ids::*;
pub use integrity::*;
pub use ledger::*;
pub use principal::*;
pub use run::*;
pub use transaction::*;

/// Seconds since the Unix epoch
pub type Timestamp = u64;

/// Current wall-clock time as a [`Timestamp`]
pub fn unix_now() -> Timestamp {
    chrono::Utc::now().timestamp().max(0) as u64
}
