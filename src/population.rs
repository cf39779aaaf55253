//! Population graph.
//!
//! Holds every person keyed by id, plus the alive index. All relationship
//! mutations go through methods here so both sides of an edge move
//! together; the methods check the graph invariants and emit no events
//! (events are the systems' job). Iteration orders are ascending by id,
//! which keeps every system deterministic.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::config::SimulationConfig;
use crate::error::SimulationError;
use crate::person::{Gender, Person, PersonId};

/// How far up the family tree the blood-relation check walks.
const KINSHIP_GENERATIONS: u32 = 3;

#[derive(Debug, Clone, Default)]
pub struct Population {
    people: BTreeMap<PersonId, Person>,
    alive: BTreeSet<PersonId>,
}

impl Population {
    pub fn new() -> Self {
        Population::default()
    }

    /// Rebuild a population from person records, e.g. from a snapshot.
    /// The alive index is derived; edge symmetry is the caller's problem
    /// (snapshots are verified separately).
    pub fn from_people(people: Vec<Person>) -> Result<Self, SimulationError> {
        let mut population = Population::new();
        for person in people {
            population.add(person)?;
        }
        Ok(population)
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    pub fn contains(&self, id: PersonId) -> bool {
        self.people.contains_key(&id)
    }

    pub fn get(&self, id: PersonId) -> Result<&Person, SimulationError> {
        self.people.get(&id).ok_or(SimulationError::UnknownEntity(id))
    }

    pub(crate) fn get_mut(&mut self, id: PersonId) -> Result<&mut Person, SimulationError> {
        self.people
            .get_mut(&id)
            .ok_or(SimulationError::UnknownEntity(id))
    }

    /// All persons, dead and alive, ascending by id.
    pub fn iter(&self) -> impl Iterator<Item = &Person> {
        self.people.values()
    }

    /// Ids of living persons, ascending.
    pub fn alive_ids(&self) -> Vec<PersonId> {
        self.alive.iter().copied().collect()
    }

    /// Living unpartnered adults, ascending by id.
    pub fn single_adults(&self, on: NaiveDate, adult_age: u32) -> Vec<PersonId> {
        self.alive
            .iter()
            .copied()
            .filter(|id| {
                self.people
                    .get(id)
                    .map(|p| p.partner.is_none() && p.is_adult(on, adult_age))
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn add(&mut self, person: Person) -> Result<(), SimulationError> {
        if self.people.contains_key(&person.id) {
            return Err(SimulationError::InvariantViolation(format!(
                "duplicate person id {}",
                person.id
            )));
        }
        if person.is_alive() {
            self.alive.insert(person.id);
        }
        self.people.insert(person.id, person);
        Ok(())
    }

    /// Ancestors of `id` reachable within `generations` parent steps.
    /// Departed ancestors simply end the walk on their branch.
    fn ancestors_within(&self, id: PersonId, generations: u32) -> BTreeSet<PersonId> {
        let mut out = BTreeSet::new();
        let mut frontier = vec![id];
        for _ in 0..generations {
            let mut next = Vec::new();
            for pid in frontier {
                if let Some(person) = self.people.get(&pid) {
                    for &parent in &person.parents {
                        if out.insert(parent) {
                            next.push(parent);
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        out
    }

    /// True when the two share a parent, or one is an ancestor of the
    /// other within three generations.
    pub fn blood_related(&self, a: PersonId, b: PersonId) -> bool {
        if a == b {
            return true;
        }
        let (pa, pb) = match (self.people.get(&a), self.people.get(&b)) {
            (Some(pa), Some(pb)) => (pa, pb),
            _ => return false,
        };
        if pa.parents.iter().any(|p| pb.parents.contains(p)) {
            return true;
        }
        let ancestors_a = self.ancestors_within(a, KINSHIP_GENERATIONS);
        if ancestors_a.contains(&b) {
            return true;
        }
        let ancestors_b = self.ancestors_within(b, KINSHIP_GENERATIONS);
        ancestors_b.contains(&a)
    }

    /// Join two eligible persons. Checks the partnership invariant before
    /// touching either record.
    pub fn form_partnership(
        &mut self,
        a: PersonId,
        b: PersonId,
        on: NaiveDate,
        adult_age: u32,
    ) -> Result<(), SimulationError> {
        if a == b {
            return Err(SimulationError::InvariantViolation(format!(
                "{a} cannot partner with themselves"
            )));
        }
        for id in [a, b] {
            let person = self.get(id)?;
            if !person.is_alive() {
                return Err(SimulationError::InvariantViolation(format!(
                    "{id} is dead and cannot partner"
                )));
            }
            if !person.is_adult(on, adult_age) {
                return Err(SimulationError::InvariantViolation(format!(
                    "{id} is not an adult"
                )));
            }
            if person.partner.is_some() {
                return Err(SimulationError::InvariantViolation(format!(
                    "{id} is already partnered"
                )));
            }
        }
        if self.blood_related(a, b) {
            return Err(SimulationError::InvariantViolation(format!(
                "{a} and {b} are blood-related"
            )));
        }
        // Both checked; the two writes cannot fail halfway.
        if let Some(person) = self.people.get_mut(&a) {
            person.partner = Some(b);
        }
        if let Some(person) = self.people.get_mut(&b) {
            person.partner = Some(a);
        }
        Ok(())
    }

    /// Clear a partnership from both sides. Returns the ex-partner.
    pub fn dissolve_partnership(
        &mut self,
        id: PersonId,
        on: NaiveDate,
    ) -> Result<PersonId, SimulationError> {
        let partner = self
            .get(id)?
            .partner
            .ok_or_else(|| SimulationError::InvariantViolation(format!("{id} has no partner")))?;
        if let Some(person) = self.people.get_mut(&id) {
            person.partner = None;
            person.last_dissolution = Some(on);
        }
        if let Some(person) = self.people.get_mut(&partner) {
            person.partner = None;
            person.last_dissolution = Some(on);
        }
        Ok(partner)
    }

    /// Mark a person dead. Their partnership, if any, is dissolved in the
    /// same call; the widowed partner's id is returned so the caller can
    /// publish the dissolution.
    pub fn record_death(
        &mut self,
        id: PersonId,
        on: NaiveDate,
    ) -> Result<Option<PersonId>, SimulationError> {
        {
            let person = self.get(id)?;
            if !person.is_alive() {
                return Err(SimulationError::InvariantViolation(format!(
                    "{id} is already dead"
                )));
            }
            if person.birth_date > on {
                return Err(SimulationError::InvariantViolation(format!(
                    "{id} would die before being born"
                )));
            }
        }
        let widowed = match self.get(id)?.partner {
            Some(_) => Some(self.dissolve_partnership(id, on)?),
            None => None,
        };
        if let Some(person) = self.people.get_mut(&id) {
            person.death_date = Some(on);
        }
        self.alive.remove(&id);
        Ok(widowed)
    }

    /// Insert a newborn and link it to both parents. Validates the
    /// parent-child invariant against the child's birth date.
    pub fn add_child(
        &mut self,
        child: Person,
        mother: PersonId,
        father: PersonId,
        child_bearing_age_min: u32,
        child_bearing_age_max: u32,
    ) -> Result<(), SimulationError> {
        let born = child.birth_date;
        {
            let m = self.get(mother)?;
            if m.gender != Gender::Female {
                return Err(SimulationError::InvariantViolation(format!(
                    "mother {mother} is not female"
                )));
            }
            let mother_age = m.age_on(born);
            if !m.is_alive() || mother_age < child_bearing_age_min
                || mother_age > child_bearing_age_max
            {
                return Err(SimulationError::InvariantViolation(format!(
                    "mother {mother} cannot bear a child at age {mother_age}"
                )));
            }
            let f = self.get(father)?;
            if f.gender != Gender::Male {
                return Err(SimulationError::InvariantViolation(format!(
                    "father {father} is not male"
                )));
            }
            if !f.is_alive() || f.age_on(born) < child_bearing_age_min {
                return Err(SimulationError::InvariantViolation(format!(
                    "father {father} cannot father a child"
                )));
            }
        }
        let mut child = child;
        child.parents = vec![mother, father];
        let child_id = child.id;
        self.add(child)?;
        if let Some(m) = self.people.get_mut(&mother) {
            m.children.insert(child_id);
        }
        if let Some(f) = self.people.get_mut(&father) {
            f.children.insert(child_id);
        }
        Ok(())
    }

    /// Remove a person for emigration. The record leaves the map entirely;
    /// the id is never reissued. Edges held by remaining persons keep the
    /// departed id as history. Partnered persons must be dissolved first.
    pub fn emigrate(&mut self, id: PersonId) -> Result<Person, SimulationError> {
        {
            let person = self.get(id)?;
            if !person.is_alive() {
                return Err(SimulationError::InvariantViolation(format!(
                    "{id} is dead and cannot emigrate"
                )));
            }
            if person.partner.is_some() {
                return Err(SimulationError::InvariantViolation(format!(
                    "{id} is still partnered; dissolve before emigration"
                )));
            }
        }
        self.alive.remove(&id);
        self.people
            .remove(&id)
            .ok_or(SimulationError::UnknownEntity(id))
    }

    /// Check I1–I5 and the alive index against the current date. Run by
    /// the engine at every tick boundary; any failure is a bug.
    pub fn verify_invariants(
        &self,
        on: NaiveDate,
        config: &SimulationConfig,
    ) -> Result<(), SimulationError> {
        for (&id, person) in &self.people {
            if person.id != id {
                return Err(SimulationError::InvariantViolation(format!(
                    "record for {id} carries id {}",
                    person.id
                )));
            }
            // I3: monotone time.
            if person.birth_date > on {
                return Err(SimulationError::InvariantViolation(format!(
                    "{id} born in the future"
                )));
            }
            if let Some(died) = person.death_date {
                if died < person.birth_date || died > on {
                    return Err(SimulationError::InvariantViolation(format!(
                        "{id} has death date outside [birth, now]"
                    )));
                }
            }
            // Alive index consistency.
            if person.is_alive() != self.alive.contains(&id) {
                return Err(SimulationError::InvariantViolation(format!(
                    "alive index out of step for {id}"
                )));
            }
            // I4: age cap.
            if person.is_alive() && person.age_on(on) > config.maximum_age {
                return Err(SimulationError::InvariantViolation(format!(
                    "{id} is older than the maximum age"
                )));
            }
            // I1: partnership symmetry and legality.
            if let Some(partner_id) = person.partner {
                let partner = self.get(partner_id).map_err(|_| {
                    SimulationError::InvariantViolation(format!(
                        "{id} partnered with missing {partner_id}"
                    ))
                })?;
                if partner.partner != Some(id) {
                    return Err(SimulationError::InvariantViolation(format!(
                        "partnership {id}/{partner_id} is not symmetric"
                    )));
                }
                if !person.is_alive() || !partner.is_alive() {
                    return Err(SimulationError::InvariantViolation(format!(
                        "partnership {id}/{partner_id} involves a dead person"
                    )));
                }
                if !person.is_adult(on, config.adult_age) {
                    return Err(SimulationError::InvariantViolation(format!(
                        "{id} is partnered but not adult"
                    )));
                }
                if id < partner_id && self.blood_related(id, partner_id) {
                    return Err(SimulationError::InvariantViolation(format!(
                        "partnership {id}/{partner_id} is between blood relatives"
                    )));
                }
            }
            // I2: parent-child symmetry (checked where both sides exist;
            // emigration legitimately leaves dangling ids).
            if person.parents.len() > 2 {
                return Err(SimulationError::InvariantViolation(format!(
                    "{id} has more than two parents"
                )));
            }
            for &parent_id in &person.parents {
                if let Some(parent) = self.people.get(&parent_id) {
                    if !parent.children.contains(&id) {
                        return Err(SimulationError::InvariantViolation(format!(
                            "{parent_id} does not list child {id}"
                        )));
                    }
                    let age_at_birth = parent.age_on(person.birth_date);
                    let alive_at_birth = parent
                        .death_date
                        .map(|d| d >= person.birth_date)
                        .unwrap_or(true);
                    if !alive_at_birth || age_at_birth < config.child_bearing_age_min {
                        return Err(SimulationError::InvariantViolation(format!(
                            "{parent_id} could not have parented {id}"
                        )));
                    }
                    if parent.gender == Gender::Female
                        && age_at_birth > config.child_bearing_age_max
                    {
                        return Err(SimulationError::InvariantViolation(format!(
                            "mother {parent_id} past bearing age at {id}'s birth"
                        )));
                    }
                }
            }
            for &child_id in &person.children {
                if let Some(child) = self.people.get(&child_id) {
                    if !child.parents.contains(&id) {
                        return Err(SimulationError::InvariantViolation(format!(
                            "child {child_id} does not list parent {id}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
