//! Person model: identity, demographic attributes, personality.
//!
//! Relationship fields (partner, parents, children) are crate-private so
//! that every mutation goes through [`crate::population::Population`],
//! which keeps both sides of each edge in step.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::clock::years_between;

/// Stable opaque person identity. Never reused, including across
/// emigration and snapshot restore.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PersonId(pub u64);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id source. Owned by the engine, serialized into snapshots so
/// ids stay unique across restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonIdAllocator {
    next: u64,
}

impl PersonIdAllocator {
    pub fn new() -> Self {
        PersonIdAllocator { next: 1 }
    }

    pub fn from_next(next: u64) -> Self {
        PersonIdAllocator { next }
    }

    pub fn next_raw(&self) -> u64 {
        self.next
    }

    pub fn next_id(&mut self) -> PersonId {
        let id = PersonId(self.next);
        self.next += 1;
        id
    }
}

impl Default for PersonIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Sick,
    CriticallyIll,
}

/// Ordinal wealth bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WealthStatus {
    Poor,
    LowerMiddle,
    Middle,
    UpperMiddle,
    Rich,
}

impl WealthStatus {
    /// Numeric weight of the bracket, ascending from `Poor` = 0.
    pub fn weight(self) -> u8 {
        match self {
            WealthStatus::Poor => 0,
            WealthStatus::LowerMiddle => 1,
            WealthStatus::Middle => 2,
            WealthStatus::UpperMiddle => 3,
            WealthStatus::Rich => 4,
        }
    }
}

/// Named age interval, derived from age (closed intervals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LifeStage {
    Infant,
    Child,
    Adolescent,
    YoungAdult,
    Adult,
    Elderly,
}

impl LifeStage {
    pub fn from_age(age: u32) -> Self {
        match age {
            0..=2 => LifeStage::Infant,
            3..=12 => LifeStage::Child,
            13..=17 => LifeStage::Adolescent,
            18..=29 => LifeStage::YoungAdult,
            30..=59 => LifeStage::Adult,
            _ => LifeStage::Elderly,
        }
    }
}

/// The fixed trait set scored on every person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PersonalityTrait {
    Openness,
    Conscientiousness,
    Extraversion,
    Agreeableness,
    Neuroticism,
    Intelligence,
    Ambition,
    Empathy,
    Humor,
    Patience,
    Creativity,
    Resilience,
    Curiosity,
    Altruism,
    Confidence,
    Optimism,
    Cautiousness,
}

impl PersonalityTrait {
    pub const ALL: [PersonalityTrait; 17] = [
        PersonalityTrait::Openness,
        PersonalityTrait::Conscientiousness,
        PersonalityTrait::Extraversion,
        PersonalityTrait::Agreeableness,
        PersonalityTrait::Neuroticism,
        PersonalityTrait::Intelligence,
        PersonalityTrait::Ambition,
        PersonalityTrait::Empathy,
        PersonalityTrait::Humor,
        PersonalityTrait::Patience,
        PersonalityTrait::Creativity,
        PersonalityTrait::Resilience,
        PersonalityTrait::Curiosity,
        PersonalityTrait::Altruism,
        PersonalityTrait::Confidence,
        PersonalityTrait::Optimism,
        PersonalityTrait::Cautiousness,
    ];
}

/// Standard deviation of the Gaussian noise added to inherited traits.
const INHERITANCE_SIGMA: f64 = 10.0;

/// Trait scores in [0, 100], stored in `PersonalityTrait::ALL` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personality {
    scores: [u8; 17],
}

impl Personality {
    pub fn from_scores(scores: [u8; 17]) -> Self {
        let mut scores = scores;
        for s in &mut scores {
            *s = (*s).min(100);
        }
        Personality { scores }
    }

    /// Flat personality, every trait at the midpoint.
    pub fn neutral() -> Self {
        Personality { scores: [50; 17] }
    }

    /// Uniformly random scores.
    pub fn random(rng: &mut impl Rng) -> Self {
        let mut scores = [0u8; 17];
        for s in &mut scores {
            *s = rng.gen_range(0..=100);
        }
        Personality { scores }
    }

    /// Parental midpoint plus Gaussian noise, clipped to [0, 100].
    pub fn inherit(a: &Personality, b: &Personality, rng: &mut impl Rng) -> Self {
        let noise = Normal::new(0.0, INHERITANCE_SIGMA);
        let mut scores = [0u8; 17];
        for (i, s) in scores.iter_mut().enumerate() {
            let mid = (a.scores[i] as f64 + b.scores[i] as f64) / 2.0;
            let value = match &noise {
                Ok(n) => mid + n.sample(rng),
                Err(_) => mid,
            };
            *s = value.clamp(0.0, 100.0).round() as u8;
        }
        Personality { scores }
    }

    pub fn get(&self, t: PersonalityTrait) -> u8 {
        self.scores[t as usize]
    }

    pub fn set(&mut self, t: PersonalityTrait, value: u8) {
        self.scores[t as usize] = value.min(100);
    }

    /// `1 − mean(|a − b|) / 100` over all traits; 1.0 for identical
    /// personalities, approaching 0.0 for maximally distant ones.
    pub fn similarity(a: &Personality, b: &Personality) -> f64 {
        let total: u32 = a
            .scores
            .iter()
            .zip(b.scores.iter())
            .map(|(&x, &y)| (x as i32 - y as i32).unsigned_abs())
            .sum();
        1.0 - total as f64 / (a.scores.len() as f64 * 100.0)
    }
}

/// A single inhabitant.
///
/// `id`, `gender` and `birth_date` are fixed at creation. Relationship
/// edges are ids into the owning population; accessors hand out copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub first_name: String,
    pub last_name: String,
    pub death_date: Option<NaiveDate>,
    pub health: HealthStatus,
    pub wealth: WealthStatus,
    pub personality: Personality,
    pub(crate) partner: Option<PersonId>,
    pub(crate) parents: Vec<PersonId>,
    pub(crate) children: BTreeSet<PersonId>,
    /// Date of the most recent partnership dissolution, if any. Gates
    /// re-entry into the matching pool.
    pub(crate) last_dissolution: Option<NaiveDate>,
}

impl Person {
    pub fn new(
        id: PersonId,
        gender: Gender,
        birth_date: NaiveDate,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Person {
            id,
            gender,
            birth_date,
            first_name: first_name.into(),
            last_name: last_name.into(),
            death_date: None,
            health: HealthStatus::Healthy,
            wealth: WealthStatus::Middle,
            personality: Personality::neutral(),
            partner: None,
            parents: Vec::new(),
            children: BTreeSet::new(),
            last_dissolution: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.death_date.is_none()
    }

    /// Whole years of age on the given date. Dead persons stop aging at
    /// their death date.
    pub fn age_on(&self, on: NaiveDate) -> u32 {
        let end = match self.death_date {
            Some(died) if died < on => died,
            _ => on,
        };
        years_between(self.birth_date, end)
    }

    pub fn life_stage_on(&self, on: NaiveDate) -> LifeStage {
        LifeStage::from_age(self.age_on(on))
    }

    pub fn is_adult(&self, on: NaiveDate, adult_age: u32) -> bool {
        self.age_on(on) >= adult_age
    }

    pub fn partner(&self) -> Option<PersonId> {
        self.partner
    }

    pub fn parents(&self) -> Vec<PersonId> {
        self.parents.clone()
    }

    pub fn children(&self) -> Vec<PersonId> {
        self.children.iter().copied().collect()
    }

    pub fn last_dissolution(&self) -> Option<NaiveDate> {
        self.last_dissolution
    }
}
