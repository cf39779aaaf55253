//! Simulation systems, one per demographic concern.
//!
//! Priorities order them within a tick: aging > mortality > migration >
//! partnership > fertility. Aging first so death draws see current ages;
//! mortality before matching so the freshly dead never pair; births last
//! so newborns sit out the tick they arrive in.

pub mod aging;
pub mod fertility;
pub mod migration;
pub mod mortality;
pub mod partnership;

pub use aging::AgingSystem;
pub use fertility::{FertilitySystem, SurnamePolicy};
pub use migration::MigrationSystem;
pub use mortality::{GompertzMakeham, MortalityModel, MortalitySystem};
pub use partnership::PartnershipSystem;
