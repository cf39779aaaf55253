//! Background runner: a thread that ticks the engine at wall-clock pace.
//!
//! The engine itself is synchronous; this is the only place a second
//! thread appears. The runner owns the loop, honours the clock's
//! play/pause state and speed multiplier, and hands each tick summary to
//! a callback. Pausing parks the loop without dropping the thread;
//! stopping the clock ends it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::clock::ClockState;
use crate::engine::{SimulationEngine, TickSummary};

/// How long a paused runner sleeps between state polls.
const PAUSE_POLL: Duration = Duration::from_millis(25);

pub struct EngineRunner {
    is_running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl EngineRunner {
    pub fn new() -> Self {
        EngineRunner {
            is_running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Start ticking the engine in the background.
    ///
    /// `base_interval` is the wall-clock time per tick at speed 1.0; the
    /// effective sleep is `base_interval / speed`. The engine must have
    /// been started (clock running or paused) before the loop does
    /// anything useful; a stopped clock ends the thread.
    pub fn start<F>(
        &mut self,
        engine: Arc<Mutex<SimulationEngine>>,
        base_interval: Duration,
        callback: F,
    ) where
        F: Fn(&TickSummary) + Send + 'static,
    {
        if self.is_running.load(Ordering::Relaxed) {
            warn!("engine runner already running");
            return;
        }

        info!(interval_ms = base_interval.as_millis() as u64, "starting engine runner");
        self.is_running.store(true, Ordering::Relaxed);
        let running = Arc::clone(&self.is_running);

        let handle = thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                let (state, speed) = {
                    let engine = engine.lock().unwrap();
                    (engine.clock_state(), engine.speed())
                };
                match state {
                    ClockState::Stopped => break,
                    ClockState::Paused => {
                        thread::sleep(PAUSE_POLL);
                        continue;
                    }
                    ClockState::Running => {}
                }
                let result = {
                    let mut engine = engine.lock().unwrap();
                    engine.step_once()
                };
                match result {
                    Ok(summary) => callback(&summary),
                    Err(err) => {
                        warn!(%err, "tick failed; stopping runner");
                        engine.lock().unwrap().stop();
                        break;
                    }
                }
                thread::sleep(base_interval.div_f64(speed.max(f64::MIN_POSITIVE)));
            }
            info!("engine runner thread stopped");
        });

        self.thread_handle = Some(handle);
    }

    /// Stop the loop and join the thread.
    pub fn stop(&mut self) {
        if !self.is_running.load(Ordering::Relaxed) {
            return;
        }
        self.is_running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join(); // Thread panic result intentionally ignored during shutdown
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }
}

impl Default for EngineRunner {
    fn default() -> Self {
        EngineRunner::new()
    }
}

impl Drop for EngineRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use std::sync::atomic::AtomicU32;

    fn engine() -> SimulationEngine {
        let config = SimulationConfig {
            initial_population: 20,
            random_seed: 8,
            ..SimulationConfig::default()
        };
        SimulationEngine::new(config).unwrap()
    }

    #[test]
    fn runner_ticks_until_stopped() {
        let engine = Arc::new(Mutex::new(engine()));
        let tick_count = Arc::new(AtomicU32::new(0));
        let tick_count_clone = Arc::clone(&tick_count);

        let mut runner = EngineRunner::new();
        engine.lock().unwrap().start().unwrap();
        runner.start(
            Arc::clone(&engine),
            Duration::from_millis(20),
            move |_summary| {
                tick_count_clone.fetch_add(1, Ordering::Relaxed);
            },
        );

        // Give it a moment to tick a few times.
        thread::sleep(Duration::from_millis(300));
        engine.lock().unwrap().stop();
        runner.stop();
        assert!(!runner.is_running());

        let count = tick_count.load(Ordering::Relaxed);
        assert!(count >= 1, "expected at least one tick, got {count}");
        assert_eq!(
            engine.lock().unwrap().ticks_completed(),
            count as u64
        );
    }

    #[test]
    fn paused_runner_does_not_tick() {
        let engine = Arc::new(Mutex::new(engine()));
        {
            let mut e = engine.lock().unwrap();
            e.start().unwrap();
            e.pause().unwrap();
        }
        let tick_count = Arc::new(AtomicU32::new(0));
        let tick_count_clone = Arc::clone(&tick_count);
        let mut runner = EngineRunner::new();
        runner.start(
            Arc::clone(&engine),
            Duration::from_millis(10),
            move |_summary| {
                tick_count_clone.fetch_add(1, Ordering::Relaxed);
            },
        );
        thread::sleep(Duration::from_millis(150));
        engine.lock().unwrap().stop();
        runner.stop();
        assert_eq!(tick_count.load(Ordering::Relaxed), 0);
    }
}
