//! Fertility system.
//!
//! Walks partnerships by ascending mother id and draws an annual birth
//! chance per couple. It runs at the lowest priority, so a newborn joins
//! the population at end-of-tick and sees neither aging nor a mortality
//! check until the next tick.

use rand::Rng;
use tracing::warn;

use crate::bus::{SimSystem, SystemContext};
use crate::error::ProcessorError;
use crate::events::{Event, EventKind, EventPayload};
use crate::names;
use crate::person::{Gender, Person, Personality};

pub const FERTILITY_PRIORITY: i32 = 500;

/// Birth chance multiplier by number of existing children (0..≥6).
const FAMILY_SIZE_FACTORS: [f64; 7] = [1.0, 0.9, 0.7, 0.4, 0.2, 0.1, 0.05];

/// Whose surname a newborn takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurnamePolicy {
    Father,
    Mother,
}

pub struct FertilitySystem {
    surname_policy: SurnamePolicy,
}

/// Linear decline from 1.2 at age 20 to 0.2 at age 45, clamped.
fn age_factor(mother_age: u32) -> f64 {
    (1.2 - 0.04 * (mother_age as f64 - 20.0)).clamp(0.2, 1.2)
}

fn family_size_factor(existing_children: usize) -> f64 {
    FAMILY_SIZE_FACTORS[existing_children.min(FAMILY_SIZE_FACTORS.len() - 1)]
}

impl FertilitySystem {
    pub fn new() -> Self {
        FertilitySystem {
            surname_policy: SurnamePolicy::Father,
        }
    }

    pub fn with_surname_policy(policy: SurnamePolicy) -> Self {
        FertilitySystem {
            surname_policy: policy,
        }
    }
}

impl Default for FertilitySystem {
    fn default() -> Self {
        FertilitySystem::new()
    }
}

impl SimSystem for FertilitySystem {
    fn name(&self) -> &'static str {
        "fertility"
    }

    fn priority(&self) -> i32 {
        FERTILITY_PRIORITY
    }

    fn handles(&self) -> &'static [EventKind] {
        &[EventKind::Tick]
    }

    fn handle(
        &mut self,
        event: &Event,
        ctx: &mut SystemContext<'_>,
    ) -> Result<(), ProcessorError> {
        if event.kind() != EventKind::Tick {
            return Ok(());
        }
        let on = event.date;
        let config = ctx.config;

        // Candidate couples keyed by the mother, ascending.
        let mut couples = Vec::new();
        for id in ctx.population.alive_ids() {
            let person = match ctx.population.get(id) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if person.gender != Gender::Female {
                continue;
            }
            let father_id = match person.partner() {
                Some(p) => p,
                None => continue,
            };
            let age = person.age_on(on);
            if age < config.child_bearing_age_min || age > config.child_bearing_age_max {
                continue;
            }
            let father_alive = ctx
                .population
                .get(father_id)
                .map(|f| f.is_alive())
                .unwrap_or(false);
            if !father_alive {
                continue;
            }
            couples.push((id, father_id, age, person.children().len()));
        }

        for (mother_id, father_id, mother_age, existing) in couples {
            let p = (config.base_fertility_rate
                * age_factor(mother_age)
                * family_size_factor(existing))
            .clamp(0.0, 1.0);
            if !ctx.rng.fertility().gen_bool(p) {
                continue;
            }
            let stream = ctx.rng.fertility();
            let gender = if stream.gen_bool(0.5) {
                Gender::Male
            } else {
                Gender::Female
            };
            let first = names::first_name(gender, &mut *stream).to_string();
            let (mother, father) = match (
                ctx.population.get(mother_id),
                ctx.population.get(father_id),
            ) {
                (Ok(m), Ok(f)) => (m, f),
                _ => {
                    warn!(mother = %mother_id, "couple vanished mid-tick");
                    continue;
                }
            };
            let last = match self.surname_policy {
                SurnamePolicy::Father => father.last_name.clone(),
                SurnamePolicy::Mother => mother.last_name.clone(),
            };
            let personality =
                Personality::inherit(&mother.personality, &father.personality, ctx.rng.fertility());
            // Children start in the better-off parent's bracket.
            let wealth = mother.wealth.max(father.wealth);

            let mut child = Person::new(ctx.ids.next_id(), gender, on, first, last);
            child.personality = personality;
            child.wealth = wealth;
            let child_id = child.id;
            ctx.population
                .add_child(
                    child,
                    mother_id,
                    father_id,
                    config.child_bearing_age_min,
                    config.child_bearing_age_max,
                )
                .map_err(|e| ProcessorError::fatal(e))?;
            ctx.publish(EventPayload::Birth {
                child: child_id,
                mother: mother_id,
                father: father_id,
            });
        }
        Ok(())
    }
}
