//! Snapshot encoding and decoding.
//!
//! A snapshot is an opaque, versioned bincode byte sequence holding the
//! config, clock date, person records with their relationship edges by
//! id, the id allocator position, and the full RNG state. Restoring it
//! reproduces the simulation bit for bit, so the event stream after a
//! restore matches the run the snapshot was taken from.

use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::error::SnapshotError;
use crate::person::Person;
use crate::population::Population;
use crate::rng::RngSuite;

/// Bump when the layout changes; older payloads are rejected rather than
/// misread.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Everything the engine needs to rebuild itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotParts {
    pub config: SimulationConfig,
    pub date: chrono::NaiveDate,
    pub next_person_id: u64,
    pub people: Vec<Person>,
    pub rng: RngSuite,
    pub ticks_completed: u64,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEnvelope {
    version: u16,
    parts: SnapshotParts,
}

pub fn encode(parts: &SnapshotParts) -> Result<Vec<u8>, SnapshotError> {
    let envelope = SnapshotEnvelope {
        version: SNAPSHOT_VERSION,
        parts: parts.clone(),
    };
    bincode::serialize(&envelope).map_err(|e| SnapshotError::Encode(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<SnapshotParts, SnapshotError> {
    // The version is the first field of the envelope, so a bare u16
    // decode reads it without touching the rest of the payload.
    let version: u16 = bincode::deserialize(bytes)
        .map_err(|e| SnapshotError::Decode(e.to_string()))?;
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    let envelope: SnapshotEnvelope =
        bincode::deserialize(bytes).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    verify_graph(&envelope.parts)?;
    Ok(envelope.parts)
}

/// Rebuild the population map from decoded person records.
pub fn rebuild_population(people: Vec<Person>) -> Result<Population, SnapshotError> {
    Population::from_people(people).map_err(|e| SnapshotError::CorruptGraph(e.to_string()))
}

/// Partner edges must be symmetric and ids unique before the records are
/// allowed anywhere near the engine.
fn verify_graph(parts: &SnapshotParts) -> Result<(), SnapshotError> {
    let mut seen = std::collections::BTreeMap::new();
    for person in &parts.people {
        if seen.insert(person.id, person).is_some() {
            return Err(SnapshotError::CorruptGraph(format!(
                "duplicate person id {}",
                person.id
            )));
        }
        if person.id.0 >= parts.next_person_id {
            return Err(SnapshotError::CorruptGraph(format!(
                "person id {} beyond the allocator position",
                person.id
            )));
        }
    }
    for person in &parts.people {
        if let Some(partner_id) = person.partner() {
            let partner = seen.get(&partner_id).ok_or_else(|| {
                SnapshotError::CorruptGraph(format!(
                    "{} partnered with missing {partner_id}",
                    person.id
                ))
            })?;
            if partner.partner() != Some(person.id) {
                return Err(SnapshotError::CorruptGraph(format!(
                    "partnership {}/{partner_id} is not symmetric",
                    person.id
                )));
            }
        }
    }
    Ok(())
}
