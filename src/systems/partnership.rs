//! Partnership system.
//!
//! Pairs eligible single adults. Matching is greedy in ascending id
//! order: each unmatched person scans the candidates with larger ids,
//! takes the best-scoring one above the threshold, and a final
//! acceptance draw decides. Greedy matching is not globally optimal;
//! it is kept because it is deterministic and fast at village scale.
//!
//! Widowed and divorced persons sit out the tick of their dissolution
//! and afterwards re-enter the pool per tick with the remarriage
//! probability.

use chrono::NaiveDate;
use rand::Rng;

use crate::bus::{SimSystem, SystemContext};
use crate::error::ProcessorError;
use crate::events::{Event, EventKind, EventPayload};
use crate::person::{Person, PersonId, Personality};
use crate::population::Population;

pub const PARTNERSHIP_PRIORITY: i32 = 600;

const PERSONALITY_WEIGHT: f64 = 0.5;
const AGE_WEIGHT: f64 = 0.3;
const CHANCE_WEIGHT: f64 = 0.2;

pub struct PartnershipSystem;

/// `max(0, 1 − |Δage| / gap)`; equal ages count as fully proximate even
/// when the configured gap is zero.
fn age_proximity(age_a: u32, age_b: u32, max_age_gap: u32) -> f64 {
    let gap = age_a.abs_diff(age_b);
    if max_age_gap == 0 {
        return if gap == 0 { 1.0 } else { 0.0 };
    }
    (1.0 - gap as f64 / max_age_gap as f64).max(0.0)
}

fn score(a: &Person, b: &Person, on: NaiveDate, max_age_gap: u32, chance: f64) -> f64 {
    PERSONALITY_WEIGHT * Personality::similarity(&a.personality, &b.personality)
        + AGE_WEIGHT * age_proximity(a.age_on(on), b.age_on(on), max_age_gap)
        + CHANCE_WEIGHT * chance
}

fn candidates(population: &Population, a: &Person, b: &Person, on: NaiveDate, max_age_gap: u32) -> bool {
    a.gender != b.gender
        && a.age_on(on).abs_diff(b.age_on(on)) <= max_age_gap
        && !population.blood_related(a.id, b.id)
}

impl SimSystem for PartnershipSystem {
    fn name(&self) -> &'static str {
        "partnership"
    }

    fn priority(&self) -> i32 {
        PARTNERSHIP_PRIORITY
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

        // Eligibility pass, in id order so the remarriage draws are
        // reproducible.
        let mut pool = Vec::new();
        for id in ctx.population.single_adults(on, config.adult_age) {
            let person = ctx
                .population
                .get(id)
                .map_err(|e| ProcessorError::transient(Some(id), e.to_string()))?;
            match person.last_dissolution() {
                // Freshly dissolved this very tick: sits the round out.
                Some(when) if when == on => continue,
                // Previously partnered: gated by the remarriage draw.
                Some(_) => {
                    if !ctx
                        .rng
                        .partnership()
                        .gen_bool(config.remarriage_probability.clamp(0.0, 1.0))
                    {
                        continue;
                    }
                }
                None => {}
            }
            pool.push(id);
        }

        let mut matched = std::collections::BTreeSet::new();
        for i in 0..pool.len() {
            let a_id = pool[i];
            if matched.contains(&a_id) {
                continue;
            }
            let mut best: Option<(PersonId, f64)> = None;
            for &b_id in &pool[i + 1..] {
                if matched.contains(&b_id) {
                    continue;
                }
                let (a, b) = match (ctx.population.get(a_id), ctx.population.get(b_id)) {
                    (Ok(a), Ok(b)) => (a, b),
                    _ => continue,
                };
                if !candidates(ctx.population, a, b, on, config.max_age_gap) {
                    continue;
                }
                let chance = ctx.rng.partnership().gen::<f64>();
                let s = score(a, b, on, config.max_age_gap, chance);
                // Strict greater-than keeps the smallest id on ties.
                if best.map_or(true, |(_, best_s)| s > best_s) {
                    best = Some((b_id, s));
                }
            }
            if let Some((b_id, s)) = best {
                if s > config.partnership_threshold
                    && ctx
                        .rng
                        .partnership()
                        .gen_bool(config.partnership_probability.clamp(0.0, 1.0))
                {
                    ctx.population
                        .form_partnership(a_id, b_id, on, config.adult_age)
                        .map_err(|e| ProcessorError::fatal(e))?;
                    ctx.publish(EventPayload::PartnershipFormed { a: a_id, b: b_id });
                    matched.insert(a_id);
                    matched.insert(b_id);
                }
            }
        }
        Ok(())
    }
}
