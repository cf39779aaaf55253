//! Mortality system.
//!
//! Annual death probability comes from a pluggable model (Gompertz–Makeham
//! baseline by default), scaled by health. Runs right after aging so the
//! draws see current ages; anyone at the age cap dies with certainty this
//! tick. Deaths dissolve partnerships in the same tick.

use rand::Rng;

use crate::bus::{SimSystem, SystemContext};
use crate::config::MortalityModelConfig;
use crate::error::ProcessorError;
use crate::events::{DeathCause, DissolutionReason, Event, EventKind, EventPayload};
use crate::person::HealthStatus;

pub const MORTALITY_PRIORITY: i32 = 800;

/// Annual baseline mortality and health adjustment.
///
/// Implementations map an age to the probability of dying within the
/// year; the health multiplier is applied on top and the product re-capped
/// to 1.0 by the caller.
pub trait MortalityModel: Send {
    fn baseline(&self, age: u32) -> f64;

    fn health_multiplier(&self, health: HealthStatus) -> f64 {
        match health {
            HealthStatus::Healthy => 0.8,
            HealthStatus::Sick => 1.5,
            HealthStatus::CriticallyIll => 5.0,
        }
    }
}

/// Gompertz–Makeham mortality with an infant/child band.
///
/// `q(age) = alpha + gamma * exp(beta * age)` beyond age 5; age 0 uses the
/// infant rate, ages 1–5 a declining fraction of it.
#[derive(Debug, Clone, PartialEq)]
pub struct GompertzMakeham {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub infant_rate: f64,
    pub child_factor: f64,
}

impl GompertzMakeham {
    /// Modern-era parameters.
    pub fn realistic() -> Self {
        GompertzMakeham {
            alpha: 1e-4,
            beta: 0.085,
            gamma: 1e-6,
            infant_rate: 0.004,
            child_factor: 0.3,
        }
    }

    /// Pre-industrial parameters: much higher background mortality and
    /// infant losses, flatter senescence.
    pub fn historical() -> Self {
        GompertzMakeham {
            alpha: 5e-3,
            beta: 0.07,
            gamma: 1e-5,
            infant_rate: 0.15,
            child_factor: 0.5,
        }
    }

    pub fn from_config(config: &MortalityModelConfig) -> Self {
        match config {
            MortalityModelConfig::Realistic => GompertzMakeham::realistic(),
            MortalityModelConfig::Historical => GompertzMakeham::historical(),
            MortalityModelConfig::Custom {
                alpha,
                beta,
                gamma,
                infant_rate,
                child_factor,
            } => GompertzMakeham {
                alpha: *alpha,
                beta: *beta,
                gamma: *gamma,
                infant_rate: *infant_rate,
                child_factor: *child_factor,
            },
        }
    }
}

impl MortalityModel for GompertzMakeham {
    fn baseline(&self, age: u32) -> f64 {
        let q = if age == 0 {
            self.infant_rate
        } else if age <= 5 {
            self.infant_rate * self.child_factor * (6 - age) as f64 / 5.0
        } else {
            self.alpha + self.gamma * (self.beta * age as f64).exp()
        };
        q.min(1.0)
    }
}

pub struct MortalitySystem {
    model: Box<dyn MortalityModel>,
}

impl MortalitySystem {
    pub fn new(model: Box<dyn MortalityModel>) -> Self {
        MortalitySystem { model }
    }

    pub fn from_config(config: &MortalityModelConfig) -> Self {
        MortalitySystem::new(Box::new(GompertzMakeham::from_config(config)))
    }

    /// Annual death probability for an age/health pair, age cap applied.
    fn probability(&self, age: u32, health: HealthStatus, maximum_age: u32) -> f64 {
        if age >= maximum_age {
            return 1.0;
        }
        (self.model.baseline(age) * self.model.health_multiplier(health)).min(1.0)
    }
}

/// Cause attribution per the age/health table.
fn attribute_cause(age: u32, health: HealthStatus, rng: &mut impl Rng) -> DeathCause {
    if age == 0 {
        return DeathCause::InfantMortality;
    }
    if age >= 80 || (age >= 60 && health != HealthStatus::Healthy) {
        return DeathCause::NaturalOldAge;
    }
    match health {
        HealthStatus::CriticallyIll => DeathCause::Disease,
        HealthStatus::Sick => {
            if rng.gen_bool(0.7) {
                DeathCause::Disease
            } else {
                DeathCause::Accident
            }
        }
        HealthStatus::Healthy => {
            if rng.gen_bool(0.9) {
                DeathCause::Accident
            } else {
                DeathCause::Disease
            }
        }
    }
}

impl SimSystem for MortalitySystem {
    fn name(&self) -> &'static str {
        "mortality"
    }

    fn priority(&self) -> i32 {
        MORTALITY_PRIORITY
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
        let date = event.date;
        let maximum_age = ctx.config.maximum_age;
        for id in ctx.population.alive_ids() {
            let (age, health) = {
                let person = ctx
                    .population
                    .get(id)
                    .map_err(|e| ProcessorError::transient(Some(id), e.to_string()))?;
                (person.age_on(date), person.health)
            };
            let q = self.probability(age, health, maximum_age);
            if ctx.rng.mortality().gen::<f64>() >= q {
                continue;
            }
            let cause = attribute_cause(age.min(maximum_age), health, ctx.rng.mortality());
            let widowed = ctx
                .population
                .record_death(id, date)
                .map_err(|e| ProcessorError::fatal(e))?;
            if let Some(partner) = widowed {
                ctx.publish(EventPayload::PartnershipDissolved {
                    a: id,
                    b: partner,
                    reason: DissolutionReason::Death,
                });
            }
            ctx.publish(EventPayload::Death {
                person: id,
                cause,
                age_at_death: age.min(maximum_age),
            });
        }
        Ok(())
    }
}
