//! Initial population generation.
//!
//! Founders carry no relationships; partnerships and families grow out of
//! the first simulated years. Attribute mixes are drawn from the genesis
//! stream so a seed fully determines the starting village.

use chrono::NaiveDate;
use rand::Rng;

use crate::clock::add_years;
use crate::config::SimulationConfig;
use crate::names;
use crate::person::{Gender, HealthStatus, Person, PersonIdAllocator, Personality, WealthStatus};
use crate::population::Population;
use crate::rng::RngSuite;

/// Founder ages are drawn uniformly from this range.
const FOUNDER_AGE_RANGE: std::ops::RangeInclusive<u32> = 0..=60;

/// Draw a plausible health mix: mostly healthy, a small sick tail.
pub(crate) fn sample_health(rng: &mut impl Rng) -> HealthStatus {
    let u = rng.gen::<f64>();
    if u < 0.92 {
        HealthStatus::Healthy
    } else if u < 0.98 {
        HealthStatus::Sick
    } else {
        HealthStatus::CriticallyIll
    }
}

/// Draw a wealth bracket weighted toward the middle.
pub(crate) fn sample_wealth(rng: &mut impl Rng) -> WealthStatus {
    let u = rng.gen::<f64>();
    if u < 0.15 {
        WealthStatus::Poor
    } else if u < 0.40 {
        WealthStatus::LowerMiddle
    } else if u < 0.75 {
        WealthStatus::Middle
    } else if u < 0.93 {
        WealthStatus::UpperMiddle
    } else {
        WealthStatus::Rich
    }
}

/// Build the founding population on the given start date.
pub fn generate(
    config: &SimulationConfig,
    ids: &mut PersonIdAllocator,
    rng: &mut RngSuite,
    on: NaiveDate,
) -> Population {
    let mut population = Population::new();
    for _ in 0..config.initial_population {
        let stream = rng.genesis();
        let gender = if stream.gen_bool(config.male_ratio) {
            Gender::Male
        } else {
            Gender::Female
        };
        let age = stream.gen_range(FOUNDER_AGE_RANGE);
        let first = names::first_name(gender, &mut *stream);
        let last = names::last_name(&mut *stream);
        let mut person = Person::new(
            ids.next_id(),
            gender,
            add_years(on, -(age as i32)),
            first,
            last,
        );
        person.health = sample_health(stream);
        person.wealth = sample_wealth(stream);
        person.personality = Personality::random(stream);
        // Founders cannot collide on id, so add never fails here.
        let _ = population.add(person);
    }
    population
}
