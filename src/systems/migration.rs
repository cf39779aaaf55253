//! Migration system: immigration arrivals and emigration departures.
//!
//! Arrival counts are Poisson-distributed around the configured annual
//! rate; every immigrant is a fresh-id adult with no local relationships.
//! Emigration is an independent per-person draw, blocked when it would
//! strand a minor with no remaining parent, and it dissolves the
//! emigrant's partnership first.

use rand::Rng;
use rand_distr::{Distribution, Poisson};

use crate::bus::{SimSystem, SystemContext};
use crate::clock::add_years;
use crate::error::ProcessorError;
use crate::events::{DissolutionReason, Event, EventKind, EventPayload};
use crate::genesis::{sample_health, sample_wealth};
use crate::names;
use crate::person::{Gender, Person, Personality};

pub const MIGRATION_PRIORITY: i32 = 700;

/// Immigrants arrive as adults in this age range.
const IMMIGRANT_AGE_RANGE: std::ops::RangeInclusive<u32> = 18..=60;

pub struct MigrationSystem;

impl SimSystem for MigrationSystem {
    fn name(&self) -> &'static str {
        "migration"
    }

    fn priority(&self) -> i32 {
        MIGRATION_PRIORITY
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

        // Emigration candidates are sampled from who was here at the start
        // of the tick; same-year arrivals do not turn straight around.
        let residents = ctx.population.alive_ids();

        // --- Immigration ---
        if config.annual_immigration > 0 {
            let poisson = Poisson::new(config.annual_immigration as f64).map_err(|e| {
                ProcessorError::fatal(format!("bad immigration rate: {e}"))
            })?;
            let arrivals = poisson.sample(ctx.rng.migration()) as u32;
            for _ in 0..arrivals {
                let stream = ctx.rng.migration();
                let gender = if stream.gen_bool(0.5) {
                    Gender::Male
                } else {
                    Gender::Female
                };
                let age = stream.gen_range(IMMIGRANT_AGE_RANGE);
                let first = names::first_name(gender, &mut *stream);
                let last = names::last_name(&mut *stream);
                let mut person = Person::new(
                    ctx.ids.next_id(),
                    gender,
                    add_years(on, -(age as i32)),
                    first,
                    last,
                );
                person.health = sample_health(stream);
                person.wealth = sample_wealth(stream);
                person.personality = Personality::random(stream);
                let id = person.id;
                ctx.population
                    .add(person)
                    .map_err(|e| ProcessorError::fatal(e))?;
                ctx.publish(EventPayload::Immigration { person: id });
            }
        }

        // --- Emigration ---
        if config.annual_emigration_rate > 0.0 {
            for id in residents {
                if ctx.rng.migration().gen::<f64>() >= config.annual_emigration_rate {
                    continue;
                }
                let person = match ctx.population.get(id) {
                    Ok(p) if p.is_alive() => p,
                    _ => continue,
                };
                // A departing parent may not strand a minor: every
                // under-age child needs another living parent who stays.
                let children = person.children();
                let strands_minor = children.iter().any(|&child_id| {
                    let child = match ctx.population.get(child_id) {
                        Ok(c) => c,
                        Err(_) => return false,
                    };
                    if !child.is_alive() || child.is_adult(on, config.adult_age) {
                        return false;
                    }
                    !child.parents().iter().any(|&parent_id| {
                        parent_id != id
                            && ctx
                                .population
                                .get(parent_id)
                                .map(|p| p.is_alive())
                                .unwrap_or(false)
                    })
                });
                if strands_minor {
                    continue;
                }
                if person.partner().is_some() {
                    let ex = ctx
                        .population
                        .dissolve_partnership(id, on)
                        .map_err(|e| ProcessorError::fatal(e))?;
                    ctx.publish(EventPayload::PartnershipDissolved {
                        a: id,
                        b: ex,
                        reason: DissolutionReason::Emigration,
                    });
                }
                ctx.population
                    .emigrate(id)
                    .map_err(|e| ProcessorError::fatal(e))?;
                ctx.publish(EventPayload::Emigration { person: id });
            }
        }
        Ok(())
    }
}
