//! Error types for the simulation engine.

use crate::clock::ClockState;
use crate::events::EventKind;
use crate::person::PersonId;

/// Configuration rejection, raised at startup or restore.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// A known key carries a value outside its permitted range.
    #[error("configuration key `{key}` out of range: {reason}")]
    OutOfRange { key: &'static str, reason: String },

    /// The input could not be parsed, or contains unknown keys.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Snapshot encode/decode failures.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u16),

    #[error("snapshot could not be decoded: {0}")]
    Decode(String),

    #[error("snapshot could not be encoded: {0}")]
    Encode(String),

    /// The decoded relationship graph references a person that is not in
    /// the snapshot, or an edge is not symmetric.
    #[error("snapshot relationship graph is corrupt: {0}")]
    CorruptGraph(String),
}

/// Failure inside a single system invocation.
///
/// Transient failures are logged and counted; the tick continues. Fatal
/// failures abort the tick and the engine rolls back to the pre-tick
/// checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("transient failure{}: {reason}", fmt_person(.person))]
    Transient {
        person: Option<PersonId>,
        reason: String,
    },

    #[error("fatal failure: {reason}")]
    Fatal { reason: String },
}

fn fmt_person(person: &Option<PersonId>) -> String {
    match person {
        Some(id) => format!(" for {id}"),
        None => String::new(),
    }
}

impl ProcessorError {
    pub fn transient(person: Option<PersonId>, reason: impl Into<String>) -> Self {
        ProcessorError::Transient {
            person,
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl ToString) -> Self {
        ProcessorError::Fatal {
            reason: reason.to_string(),
        }
    }
}

/// Top-level error surface of the engine.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An internal bug: the population graph broke one of its invariants.
    /// The engine rolls back to the pre-tick checkpoint before surfacing
    /// this.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("illegal clock transition: cannot {op} while {state:?}")]
    IllegalStateTransition { op: &'static str, state: ClockState },

    #[error("cannot seek from {current} back to {requested}")]
    TimeReversal {
        current: chrono::NaiveDate,
        requested: chrono::NaiveDate,
    },

    #[error("speed multiplier {0} outside (0, 10]")]
    InvalidSpeed(f64),

    #[error("no person with id {0}")]
    UnknownEntity(PersonId),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// A system opted out of error isolation. The tick was rolled back.
    #[error("system `{system}` failed fatally on {event:?}: {source}")]
    SystemFailure {
        system: &'static str,
        event: EventKind,
        source: ProcessorError,
    },
}
