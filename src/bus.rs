//! Event bus and system registry.
//!
//! Systems declare the event kinds they consume and a stable priority.
//! Per tick the bus runs one FIFO queue: the tick event seeds it, each
//! popped event runs the matching systems in `(priority desc,
//! registration order)`, and anything a handler publishes is appended to
//! the tail. Publication is synchronous, dispatch is deferred: a system
//! never observes its own event during the invocation that produced it.

use std::collections::VecDeque;

use chrono::NaiveDate;
use tracing::warn;

use crate::config::SimulationConfig;
use crate::error::ProcessorError;
use crate::events::{Event, EventKind, EventPayload};
use crate::person::PersonIdAllocator;
use crate::population::Population;
use crate::rng::RngSuite;

/// Everything a system may touch during one invocation.
pub struct SystemContext<'a> {
    pub population: &'a mut Population,
    pub rng: &'a mut RngSuite,
    pub config: &'a SimulationConfig,
    pub ids: &'a mut PersonIdAllocator,
    /// The tick date; every published event is stamped with it.
    pub date: NaiveDate,
    outbox: Vec<Event>,
}

impl SystemContext<'_> {
    /// Queue an event for dispatch after this handler returns.
    pub fn publish(&mut self, payload: EventPayload) {
        self.outbox.push(Event::new(self.date, payload));
    }
}

/// A pluggable simulation system driven by the event bus.
pub trait SimSystem: Send {
    fn name(&self) -> &'static str;

    /// Higher runs first within a tick. Ties break by registration order.
    fn priority(&self) -> i32;

    /// Event kinds this system consumes.
    fn handles(&self) -> &'static [EventKind];

    fn handle(
        &mut self,
        event: &Event,
        ctx: &mut SystemContext<'_>,
    ) -> Result<(), ProcessorError>;
}

/// Result of dispatching one tick: every event processed, in dispatch
/// order, plus the transient failure count.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub events: Vec<Event>,
    pub transient_errors: u32,
}

/// A fatal system failure. The engine rolls the tick back on receipt.
#[derive(Debug)]
pub struct DispatchFailure {
    pub system: &'static str,
    pub event: EventKind,
    pub error: ProcessorError,
}

struct Entry {
    system: Box<dyn SimSystem>,
    priority: i32,
}

#[derive(Default)]
pub struct EventBus {
    entries: Vec<Entry>,
    /// Indices into `entries`, sorted by (priority desc, registration
    /// order asc). Rebuilt on registration.
    order: Vec<usize>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub fn register(&mut self, system: Box<dyn SimSystem>) {
        let priority = system.priority();
        self.entries.push(Entry { system, priority });
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by(|&a, &b| {
            self.entries[b]
                .priority
                .cmp(&self.entries[a].priority)
                .then(a.cmp(&b))
        });
        self.order = order;
    }

    pub fn system_names(&self) -> Vec<&'static str> {
        self.order
            .iter()
            .map(|&i| self.entries[i].system.name())
            .collect()
    }

    /// Run one tick's queue to exhaustion.
    pub fn dispatch(
        &mut self,
        first: Event,
        population: &mut Population,
        rng: &mut RngSuite,
        config: &SimulationConfig,
        ids: &mut PersonIdAllocator,
    ) -> Result<DispatchOutcome, DispatchFailure> {
        let order = self.order.clone();
        let mut queue: VecDeque<Event> = VecDeque::from([first]);
        let mut processed = Vec::new();
        let mut transient_errors = 0u32;

        while let Some(event) = queue.pop_front() {
            let kind = event.kind();
            for &i in &order {
                let entry = &mut self.entries[i];
                if !entry.system.handles().contains(&kind) {
                    continue;
                }
                let mut ctx = SystemContext {
                    population: &mut *population,
                    rng: &mut *rng,
                    config,
                    ids: &mut *ids,
                    date: event.date,
                    outbox: Vec::new(),
                };
                let result = entry.system.handle(&event, &mut ctx);
                let outbox = ctx.outbox;
                match result {
                    Ok(()) => {}
                    Err(err @ ProcessorError::Transient { .. }) => {
                        warn!(system = entry.system.name(), %err, "transient system failure");
                        transient_errors += 1;
                    }
                    Err(error) => {
                        return Err(DispatchFailure {
                            system: entry.system.name(),
                            event: kind,
                            error,
                        });
                    }
                }
                // Deferred dispatch: handler output goes to the tail.
                queue.extend(outbox);
            }
            processed.push(event);
        }

        Ok(DispatchOutcome {
            events: processed,
            transient_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, EventPayload};
    use crate::person::PersonId;
    use std::sync::{Arc, Mutex};

    fn date(y: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, 1, 1).unwrap()
    }

    fn tick_event(y: i32) -> Event {
        Event::new(
            date(y),
            EventPayload::Tick {
                old_date: date(y - 1),
                new_date: date(y),
            },
        )
    }

    struct Recorder {
        name: &'static str,
        priority: i32,
        handles: &'static [EventKind],
        log: Arc<Mutex<Vec<(&'static str, EventKind)>>>,
        emit_on_tick: Option<EventPayload>,
        fail_with: Option<fn() -> ProcessorError>,
    }

    impl SimSystem for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn handles(&self) -> &'static [EventKind] {
            self.handles
        }
        fn handle(
            &mut self,
            event: &Event,
            ctx: &mut SystemContext<'_>,
        ) -> Result<(), ProcessorError> {
            self.log.lock().unwrap().push((self.name, event.kind()));
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            if event.kind() == EventKind::Tick {
                if let Some(payload) = self.emit_on_tick.take() {
                    ctx.publish(payload);
                }
            }
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        priority: i32,
        handles: &'static [EventKind],
        log: &Arc<Mutex<Vec<(&'static str, EventKind)>>>,
    ) -> Box<Recorder> {
        Box::new(Recorder {
            name,
            priority,
            handles,
            log: Arc::clone(log),
            emit_on_tick: None,
            fail_with: None,
        })
    }

    fn run(bus: &mut EventBus, event: Event) -> Result<DispatchOutcome, DispatchFailure> {
        let mut population = Population::new();
        let mut rng = RngSuite::new(0);
        let config = SimulationConfig::default();
        let mut ids = PersonIdAllocator::new();
        bus.dispatch(event, &mut population, &mut rng, &config, &mut ids)
    }

    #[test]
    fn priority_orders_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.register(recorder("low", 100, &[EventKind::Tick], &log));
        bus.register(recorder("high", 900, &[EventKind::Tick], &log));
        bus.register(recorder("mid", 500, &[EventKind::Tick], &log));
        run(&mut bus, tick_event(2001)).unwrap();
        let names: Vec<_> = log.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[test]
    fn equal_priority_ties_break_by_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.register(recorder("first", 500, &[EventKind::Tick], &log));
        bus.register(recorder("second", 500, &[EventKind::Tick], &log));
        run(&mut bus, tick_event(2001)).unwrap();
        let names: Vec<_> = log.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn published_events_dispatch_after_the_current_one() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let mut emitter = recorder("emitter", 900, &[EventKind::Tick], &log);
        emitter.emit_on_tick = Some(EventPayload::Immigration {
            person: PersonId(1),
        });
        bus.register(emitter);
        bus.register(recorder(
            "watcher",
            100,
            &[EventKind::Tick, EventKind::Immigration],
            &log,
        ));
        let outcome = run(&mut bus, tick_event(2001)).unwrap();
        // The watcher sees the tick before anyone sees the derived event.
        let entries: Vec<_> = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec![
                ("emitter", EventKind::Tick),
                ("watcher", EventKind::Tick),
                ("watcher", EventKind::Immigration),
            ]
        );
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.events[0].kind(), EventKind::Tick);
        assert_eq!(outcome.events[1].kind(), EventKind::Immigration);
    }

    #[test]
    fn transient_failure_continues_the_tick() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let mut failing = recorder("failing", 900, &[EventKind::Tick], &log);
        failing.fail_with = Some(|| ProcessorError::transient(None, "hiccup"));
        bus.register(failing);
        bus.register(recorder("after", 100, &[EventKind::Tick], &log));
        let outcome = run(&mut bus, tick_event(2001)).unwrap();
        assert_eq!(outcome.transient_errors, 1);
        let names: Vec<_> = log.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["failing", "after"]);
    }

    #[test]
    fn fatal_failure_aborts_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let mut failing = recorder("doomed", 900, &[EventKind::Tick], &log);
        failing.fail_with = Some(|| ProcessorError::fatal("broken"));
        bus.register(failing);
        bus.register(recorder("never", 100, &[EventKind::Tick], &log));
        let failure = run(&mut bus, tick_event(2001)).unwrap_err();
        assert_eq!(failure.system, "doomed");
        assert_eq!(failure.event, EventKind::Tick);
        let names: Vec<_> = log.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["doomed"]);
    }

    #[test]
    fn unhandled_kinds_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.register(recorder("deaths-only", 500, &[EventKind::Death], &log));
        run(&mut bus, tick_event(2001)).unwrap();
        assert!(log.lock().unwrap().is_empty());
    }
}
