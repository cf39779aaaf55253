//! Village Simulation Engine
//!
//! Deterministic demographic simulation of a small population over
//! decades: a yearly clock drives aging, mortality, partnership,
//! fertility, and migration systems through a priority-ordered event
//! bus. Equal seed and configuration reproduce the event stream bit for
//! bit, and snapshots capture enough state (people, edges, RNG) to
//! resume a run exactly.

pub mod bus;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod genesis;
pub mod names;
pub mod persistence;
pub mod person;
pub mod population;
pub mod rng;
pub mod runner;
pub mod stats;
pub mod systems;

pub use bus::{EventBus, SimSystem, SystemContext};
pub use clock::{Clock, ClockState};
pub use config::{MortalityModelConfig, SimulationConfig};
pub use engine::{ObserverId, SimulationEngine, SimulationObserver, TickSummary};
pub use error::{ConfigError, ProcessorError, SimulationError, SnapshotError};
pub use events::{DeathCause, DissolutionReason, Event, EventKind, EventPayload};
pub use person::{
    Gender, HealthStatus, LifeStage, Person, PersonId, Personality, PersonalityTrait,
    WealthStatus,
};
pub use population::Population;
pub use runner::EngineRunner;
pub use stats::StatisticsCollector;
