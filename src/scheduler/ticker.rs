//! Background threads that drive the scheduler.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::Scheduler;
use crate::input::InputReceiver;

const PUMP_POLL: Duration = Duration::from_millis(50);

/// Calls [`Scheduler::tick`] at a fixed rate on its own thread.
pub struct Ticker {
    stop_flag: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn start(scheduler: Arc<Scheduler>, hz: f64) -> Self {
        let hz = if hz.is_finite() && hz > 0.0 { hz } else { 60.0 };
        let period = Duration::from_secs_f64(1.0 / hz);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));
        let stop_clone = stop_flag.clone();
        let ticks_clone = ticks.clone();

        let thread = thread::spawn(move || {
            let mut next = Instant::now() + period;
            while !stop_clone.load(Ordering::Relaxed) {
                let now = Instant::now();
                if now < next {
                    thread::sleep(next - now);
                    continue;
                }
                scheduler.tick();
                ticks_clone.fetch_add(1, Ordering::Relaxed);
                next += period;
                // Fell behind by more than a period: skip missed ticks.
                if next < now {
                    next = now + period;
                }
            }
        });
        info!(hz, "ticker started");

        Self {
            stop_flag,
            ticks,
            thread: Some(thread),
        }
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Signal the thread to stop and wait for it.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            debug!("ticker stopped");
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drains an input channel into [`Scheduler::dispatch`] on its own thread.
///
/// Exits on stop or once every sender is dropped.
pub struct Pump {
    stop_flag: Arc<AtomicBool>,
    dispatched: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl Pump {
    pub fn start(scheduler: Arc<Scheduler>, receiver: InputReceiver) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let dispatched = Arc::new(AtomicU64::new(0));
        let stop_clone = stop_flag.clone();
        let dispatched_clone = dispatched.clone();

        let thread = thread::spawn(move || {
            while !stop_clone.load(Ordering::Relaxed) {
                match receiver.recv_timeout(PUMP_POLL) {
                    Ok(sample) => {
                        scheduler.dispatch(&sample);
                        dispatched_clone.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        debug!("input channel closed");
                        break;
                    }
                }
            }
        });

        Self {
            stop_flag,
            dispatched,
            thread: Some(thread),
        }
    }

    /// Samples dispatched so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SceneClock;
    use crate::input::{input_channel, InputSample, SourceKey};
    use crate::mapping::{Mode, Range, Registry, SourceSelector};
    use crate::property::{Property, PropertyStore};
    use crate::runtime::{Runtime, RuntimeSettings};

    fn scheduler(store: Arc<PropertyStore>) -> Arc<Scheduler> {
        Arc::new(Scheduler::new(
            Arc::new(Registry::new()),
            Runtime::new(store, RuntimeSettings::default()),
            Arc::new(SceneClock::new(24.0)),
        ))
    }

    #[test]
    fn ticker_start_and_stop() {
        let store = Arc::new(PropertyStore::new());
        let mut ticker = Ticker::start(scheduler(store), 200.0);
        thread::sleep(Duration::from_millis(100));
        ticker.stop();
        assert!(ticker.ticks() > 0);
        let after = ticker.ticks();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticker.ticks(), after);
    }

    #[test]
    fn ticker_drives_motor() {
        let store = Arc::new(PropertyStore::new());
        store.insert("spin", Property::float(0.0)).unwrap();
        let s = scheduler(store.clone());
        s.registry()
            .create(SourceSelector::cc(1), "spin", Mode::Motor, Range::new(0.0, 10.0), "")
            .unwrap();
        s.dispatch(&InputSample::new(SourceKey::cc(0, 1), 1.0));

        let ticker = Ticker::start(s, 100.0);
        thread::sleep(Duration::from_millis(150));
        drop(ticker);
        assert!(store.value("spin").unwrap() > 0.0);
    }

    #[test]
    fn pump_dispatches_and_exits_on_disconnect() {
        let store = Arc::new(PropertyStore::new());
        store.insert("a", Property::float(0.0)).unwrap();
        let s = scheduler(store.clone());
        s.registry()
            .create(SourceSelector::cc(7), "a", Mode::Set, Range::default(), "")
            .unwrap();

        let (tx, rx) = input_channel();
        let mut pump = Pump::start(s, rx);
        tx.send(InputSample::new(SourceKey::cc(0, 7), 0.25)).unwrap();
        tx.send(InputSample::new(SourceKey::cc(0, 7), 0.75)).unwrap();
        drop(tx);

        let deadline = Instant::now() + Duration::from_secs(2);
        while pump.dispatched() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        pump.stop();
        assert_eq!(pump.dispatched(), 2);
        assert_eq!(store.value("a").unwrap(), 0.75);
    }
}
