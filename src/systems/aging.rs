//! Aging system.
//!
//! Ages are derived from birth dates, so this system mutates nothing: it
//! reports each living person's year-over-year age change and any life
//! stage transition. It runs first within the tick so every later system
//! sees current ages. Persons at or past the age cap are left to the
//! mortality system, which treats them as certain deaths in the same
//! tick.

use crate::bus::{SimSystem, SystemContext};
use crate::error::ProcessorError;
use crate::events::{Event, EventKind, EventPayload};
use crate::person::LifeStage;

pub const AGING_PRIORITY: i32 = 900;

pub struct AgingSystem;

impl SimSystem for AgingSystem {
    fn name(&self) -> &'static str {
        "aging"
    }

    fn priority(&self) -> i32 {
        AGING_PRIORITY
    }

    fn handles(&self) -> &'static [EventKind] {
        &[EventKind::Tick]
    }

    fn handle(
        &mut self,
        event: &Event,
        ctx: &mut SystemContext<'_>,
    ) -> Result<(), ProcessorError> {
        let (old_date, new_date) = match event.payload {
            EventPayload::Tick { old_date, new_date } => (old_date, new_date),
            _ => return Ok(()),
        };
        let cap = ctx.config.maximum_age;
        for id in ctx.population.alive_ids() {
            let person = ctx
                .population
                .get(id)
                .map_err(|e| ProcessorError::transient(Some(id), e.to_string()))?;
            let old_age = person.age_on(old_date).min(cap);
            let new_age = person.age_on(new_date).min(cap);
            if new_age == old_age {
                continue;
            }
            let old_stage = LifeStage::from_age(old_age);
            let new_stage = LifeStage::from_age(new_age);
            ctx.publish(EventPayload::Aging {
                person: id,
                old_age,
                new_age,
                old_stage,
                new_stage,
            });
            if new_stage != old_stage {
                ctx.publish(EventPayload::LifeStageChange {
                    person: id,
                    old_stage,
                    new_stage,
                });
            }
        }
        Ok(())
    }
}
