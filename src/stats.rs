//! Aggregate statistics over the event stream and population.
//!
//! `StatisticsCollector` is a [`SimulationObserver`]: attach it (behind
//! an `Arc<Mutex<_>>` if you need to read it back) and it keeps running
//! totals. The free functions bucket a population for reporting.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use crate::engine::{SimulationObserver, TickSummary};
use crate::events::{DeathCause, Event, EventPayload};
use crate::person::LifeStage;
use crate::population::Population;

/// Running totals across the observed simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatisticsCollector {
    pub births: u64,
    pub deaths: u64,
    pub immigrations: u64,
    pub emigrations: u64,
    pub partnerships_formed: u64,
    pub partnerships_dissolved: u64,
    pub deaths_by_cause: BTreeMap<DeathCause, u64>,
    pub last_summary: Option<TickSummary>,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        StatisticsCollector::default()
    }

    /// A collector plus the shareable handle to subscribe with.
    pub fn shared() -> (Arc<Mutex<StatisticsCollector>>, Box<dyn SimulationObserver>) {
        let collector = Arc::new(Mutex::new(StatisticsCollector::new()));
        (Arc::clone(&collector), Box::new(SharedCollector(collector)))
    }

    fn record(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::Birth { .. } => self.births += 1,
            EventPayload::Death { cause, .. } => {
                self.deaths += 1;
                *self.deaths_by_cause.entry(*cause).or_insert(0) += 1;
            }
            EventPayload::Immigration { .. } => self.immigrations += 1,
            EventPayload::Emigration { .. } => self.emigrations += 1,
            EventPayload::PartnershipFormed { .. } => self.partnerships_formed += 1,
            EventPayload::PartnershipDissolved { .. } => self.partnerships_dissolved += 1,
            _ => {}
        }
    }
}

impl SimulationObserver for StatisticsCollector {
    fn on_event(&mut self, event: &Event) {
        self.record(event);
    }

    fn on_tick_completed(&mut self, summary: &TickSummary) {
        self.last_summary = Some(*summary);
    }
}

struct SharedCollector(Arc<Mutex<StatisticsCollector>>);

impl SimulationObserver for SharedCollector {
    fn on_event(&mut self, event: &Event) {
        if let Ok(mut collector) = self.0.lock() {
            collector.record(event);
        }
    }

    fn on_tick_completed(&mut self, summary: &TickSummary) {
        if let Ok(mut collector) = self.0.lock() {
            collector.last_summary = Some(*summary);
        }
    }
}

/// Living persons per life stage.
pub fn life_stage_breakdown(
    population: &Population,
    on: NaiveDate,
) -> BTreeMap<LifeStage, u32> {
    let mut out = BTreeMap::new();
    for person in population.iter().filter(|p| p.is_alive()) {
        *out.entry(person.life_stage_on(on)).or_insert(0) += 1;
    }
    out
}

/// Living persons per decade of age (0 => 0–9, 1 => 10–19, ...).
pub fn age_histogram(population: &Population, on: NaiveDate) -> BTreeMap<u32, u32> {
    let mut out = BTreeMap::new();
    for person in population.iter().filter(|p| p.is_alive()) {
        *out.entry(person.age_on(on) / 10).or_insert(0) += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::engine::SimulationEngine;

    #[test]
    fn collector_tallies_a_run() {
        let config = SimulationConfig {
            initial_population: 50,
            random_seed: 17,
            ..SimulationConfig::default()
        };
        let mut engine = SimulationEngine::new(config).unwrap();
        let (stats, observer) = StatisticsCollector::shared();
        engine.subscribe(observer);
        engine.step(30).unwrap();

        let stats = stats.lock().unwrap();
        let by_cause: u64 = stats.deaths_by_cause.values().sum();
        assert_eq!(by_cause, stats.deaths);
        let summary = stats.last_summary.expect("summary after 30 ticks");
        assert_eq!(summary.date, engine.current_date());
        // Thirty years of default immigration brings someone in.
        assert!(stats.immigrations > 0);
    }

    #[test]
    fn breakdowns_cover_every_living_person() {
        let config = SimulationConfig {
            initial_population: 80,
            random_seed: 2,
            ..SimulationConfig::default()
        };
        let mut engine = SimulationEngine::new(config).unwrap();
        engine.step(5).unwrap();
        let on = engine.current_date();
        let stages = life_stage_breakdown(engine.population(), on);
        let decades = age_histogram(engine.population(), on);
        let alive = engine.population().alive_count() as u32;
        assert_eq!(stages.values().sum::<u32>(), alive);
        assert_eq!(decades.values().sum::<u32>(), alive);
    }
}
