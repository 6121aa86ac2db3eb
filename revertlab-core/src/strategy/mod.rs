//! The mean-reversion strategy: parameters, role handles, journal, and the
//! trade lifecycle controller.

pub mod controller;
pub mod handles;
pub mod journal;
pub mod params;

pub use controller::{Leg, LegState, LifecycleController};
pub use handles::RoleHandles;
pub use journal::{Journal, JournalEntry, JournalKind};
pub use params::{EntryOrder, Sizing, StrategyParams};
