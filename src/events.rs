//! Life-event values dispatched through the event bus.
//!
//! Events are plain values: a timestamp (the tick date) plus a tagged
//! payload. Systems subscribe by [`EventKind`], the fieldless
//! discriminator derived from the payload.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::person::{LifeStage, PersonId};

/// Cause attributed to a death event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeathCause {
    NaturalOldAge,
    Disease,
    Accident,
    Childbirth,
    InfantMortality,
    Violent,
    BirthComplication,
    Unexplained,
}

/// Why a partnership ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DissolutionReason {
    Death,
    Divorce,
    /// One partner left the population. Distinct from both death and
    /// divorce so downstream accounting stays honest.
    Emigration,
}

/// Discriminator for event subscription and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Tick,
    Aging,
    LifeStageChange,
    Death,
    PartnershipFormed,
    PartnershipDissolved,
    Birth,
    Immigration,
    Emigration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Tick {
        old_date: NaiveDate,
        new_date: NaiveDate,
    },
    Aging {
        person: PersonId,
        old_age: u32,
        new_age: u32,
        old_stage: LifeStage,
        new_stage: LifeStage,
    },
    LifeStageChange {
        person: PersonId,
        old_stage: LifeStage,
        new_stage: LifeStage,
    },
    Death {
        person: PersonId,
        cause: DeathCause,
        age_at_death: u32,
    },
    PartnershipFormed {
        a: PersonId,
        b: PersonId,
    },
    PartnershipDissolved {
        a: PersonId,
        b: PersonId,
        reason: DissolutionReason,
    },
    Birth {
        child: PersonId,
        mother: PersonId,
        father: PersonId,
    },
    Immigration {
        person: PersonId,
    },
    Emigration {
        person: PersonId,
    },
}

/// A dated life event. The date is the new date of the tick that produced
/// the event and never changes after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub date: NaiveDate,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(date: NaiveDate, payload: EventPayload) -> Self {
        Event { date, payload }
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Tick { .. } => EventKind::Tick,
            EventPayload::Aging { .. } => EventKind::Aging,
            EventPayload::LifeStageChange { .. } => EventKind::LifeStageChange,
            EventPayload::Death { .. } => EventKind::Death,
            EventPayload::PartnershipFormed { .. } => EventKind::PartnershipFormed,
            EventPayload::PartnershipDissolved { .. } => EventKind::PartnershipDissolved,
            EventPayload::Birth { .. } => EventKind::Birth,
            EventPayload::Immigration { .. } => EventKind::Immigration,
            EventPayload::Emigration { .. } => EventKind::Emigration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn kind_matches_payload() {
        let date = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        let event = Event::new(
            date,
            EventPayload::Death {
                person: PersonId(3),
                cause: DeathCause::Accident,
                age_at_death: 41,
            },
        );
        assert_eq!(event.kind(), EventKind::Death);
        assert_eq!(event.date, date);
    }

    #[test]
    fn events_serialize() {
        let date = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        let event = Event::new(
            date,
            EventPayload::PartnershipDissolved {
                a: PersonId(1),
                b: PersonId(2),
                reason: DissolutionReason::Emigration,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
