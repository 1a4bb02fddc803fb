//! Scheduler: fans input samples and clock ticks out to mappings.
//!
//! Input-triggered invocations run on the caller's thread (usually the
//! pump). Ticks come from the [`Ticker`] thread. Both go through the same
//! per-mapping lock, so a sample and a tick for one mapping never overlap.

pub mod ticker;

use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::clock::Clock;
use crate::expr::CompileError;
use crate::input::{InputSample, SourceKey};
use crate::mapping::{MappingId, Mode, Range, Registry, SourceSelector};
use crate::runtime::{Outcome, Runtime};

pub use ticker::{Pump, Ticker};

/// The most recent control the user moved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastTouched {
    pub source: SourceKey,
    pub raw: f64,
}

pub struct Scheduler {
    registry: Arc<Registry>,
    runtime: Runtime,
    clock: Arc<dyn Clock>,
    last_touched: Mutex<Option<LastTouched>>,
}

impl Scheduler {
    pub fn new(registry: Arc<Registry>, runtime: Runtime, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            runtime,
            clock,
            last_touched: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Run every mapping whose selector matches the sample, in id order.
    pub fn dispatch(&self, sample: &InputSample) -> Vec<(MappingId, Outcome)> {
        *self
            .last_touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(LastTouched {
            source: sample.source,
            raw: sample.raw,
        });

        let now = self.clock.now();
        let outcomes: Vec<_> = self
            .registry
            .matching(&sample.source)
            .iter()
            .map(|entry| (entry.id(), self.runtime.on_sample(entry, sample.raw, now)))
            .collect();
        trace!(source = %sample.source, raw = sample.raw, hits = outcomes.len(), "dispatched");
        outcomes
    }

    /// Run every tick-driven mapping once.
    ///
    /// Mappings that do not want ticks are neither locked nor reported.
    pub fn tick(&self) -> Vec<(MappingId, Outcome)> {
        let now = self.clock.now();
        self.registry
            .handles()
            .iter()
            .filter(|entry| entry.wants_tick())
            .map(|entry| (entry.id(), self.runtime.on_tick(entry, now)))
            .filter(|(_, outcome)| *outcome != Outcome::Skipped)
            .collect()
    }

    pub fn last_touched(&self) -> Option<LastTouched> {
        *self
            .last_touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind the last touched control to a target.
    ///
    /// Returns `Ok(None)` when no control has been touched yet.
    pub fn bind_last_touched(
        &self,
        target_path: &str,
        mode: Mode,
        range: Range,
        expression_source: &str,
    ) -> Result<Option<MappingId>, CompileError> {
        let Some(touched) = self.last_touched() else {
            return Ok(None);
        };
        self.registry
            .create(
                SourceSelector::from(touched.source),
                target_path,
                mode,
                range,
                expression_source,
            )
            .map(Some)
    }
}
