//! Mapping runtime: one invocation turns one trigger into at most one write.
//!
//! An invocation locks the mapping, evaluates its expression, applies the
//! mode (Set or Motor), resolves the target path, and writes. Failures stay
//! local to the mapping: evaluation errors hold the previous value, and
//! resolution or write errors flag the mapping until it is updated or
//! re-resolved.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::clock::ClockReading;
use crate::expr::Env;
use crate::mapping::{DegradeReason, Health, Mapping, MappingEntry, Mode};
use crate::property::{Resolver, Slot};

/// What triggered an invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    /// A new normalized input value.
    Sample(f64),
    /// Periodic clock tick.
    Tick,
}

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The value was written.
    Applied(f64),
    /// Evaluation failed; the previous value stands.
    Held,
    /// Nothing to do: not tick-driven, or flagged unresolved.
    Skipped,
    /// The mapping was deleted mid-invocation; the write was dropped.
    Discarded,
    /// Resolution or write failed; the mapping is now flagged.
    Unresolved(String),
}

impl Outcome {
    pub fn applied(&self) -> Option<f64> {
        match self {
            Outcome::Applied(v) => Some(*v),
            _ => None,
        }
    }
}

/// Runtime tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeSettings {
    /// Upper bound on one Motor integration step, in seconds.
    pub max_step: f64,
    /// Consecutive evaluation failures before a mapping is flagged.
    pub degrade_after: u32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_step: 0.25,
            degrade_after: 8,
        }
    }
}

/// Applies mappings through a [`Resolver`].
pub struct Runtime {
    resolver: Arc<dyn Resolver>,
    settings: RuntimeSettings,
}

impl Runtime {
    pub fn new(resolver: Arc<dyn Resolver>, settings: RuntimeSettings) -> Self {
        Self { resolver, settings }
    }

    pub fn on_sample(&self, entry: &MappingEntry, raw: f64, now: ClockReading) -> Outcome {
        self.invoke(entry, Trigger::Sample(raw), now)
    }

    pub fn on_tick(&self, entry: &MappingEntry, now: ClockReading) -> Outcome {
        self.invoke(entry, Trigger::Tick, now)
    }

    /// Run one invocation.
    ///
    /// The retired flag is checked on entry and again under the entry's
    /// write gate, which `delete` passes through before returning.
    pub fn invoke(&self, entry: &MappingEntry, trigger: Trigger, now: ClockReading) -> Outcome {
        if entry.is_retired() {
            return Outcome::Discarded;
        }
        let mut mapping = entry.lock();
        let outcome = self.apply(entry, &mut mapping, trigger, now);
        entry.refresh_ticks(&mapping);
        outcome
    }

    fn apply(
        &self,
        entry: &MappingEntry,
        mapping: &mut Mapping,
        trigger: Trigger,
        now: ClockReading,
    ) -> Outcome {
        match trigger {
            Trigger::Sample(raw) => {
                mapping.state.last_raw = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };
                mapping.state.primed = true;
            }
            Trigger::Tick if !mapping.wants_tick() => return Outcome::Skipped,
            Trigger::Tick => {}
        }

        if mapping.health.is_unresolved() {
            return Outcome::Skipped;
        }

        let input = mapping.smoothed_input(now.wall_time, self.settings.max_step);
        let x = mapping.curve.apply(input);
        let env = Env::new(x, now.scene_time, now.scene_frame);
        let y = match mapping.expression.evaluate(&env) {
            Ok(y) => y,
            Err(err) => {
                self.record_failure(mapping, now, &err.to_string());
                return Outcome::Held;
            }
        };
        if mapping.state.consecutive_failures > 0 || !mapping.health.is_healthy() {
            debug!(mapping = %mapping.id, "expression recovered");
        }
        mapping.state.consecutive_failures = 0;
        mapping.health = Health::Healthy;

        let id = mapping.id;
        let path = mapping.target_path.clone();
        let mut slot = match self.resolver.resolve(&path) {
            Ok(slot) => slot,
            Err(err) => return flag_unresolved(mapping, err.to_string()),
        };

        let value = match mapping.mode {
            Mode::Set if mapping.absolute => mapping.scale(y),
            Mode::Set => mapping.range.clamp(mapping.scale(y)),
            Mode::Motor => self.integrate(mapping, slot.as_ref(), y, now),
        };

        let gate = entry.write_gate();
        if entry.is_retired() {
            debug!(mapping = %id, "mapping deleted mid-invocation, write dropped");
            return Outcome::Discarded;
        }
        let written = slot.set(value);
        drop(gate);
        if mapping.mode == Mode::Motor {
            mapping.state.last_tick_time = Some(now.wall_time);
        }
        match written {
            Ok(()) => {
                trace!(mapping = %id, target = %path, value, "applied");
                if mapping.mode == Mode::Motor {
                    mapping.state.accumulator = Some(value);
                }
                mapping.state.last_applied = Some(value);
                Outcome::Applied(value)
            }
            Err(err) => flag_unresolved(mapping, err.to_string()),
        }
    }

    /// Next Motor position. State is committed by the caller once the write
    /// succeeds.
    fn integrate(&self, mapping: &Mapping, slot: &dyn Slot, y: f64, now: ClockReading) -> f64 {
        let dt = self.step(mapping, now);
        let velocity = mapping.scale(y);
        let base = mapping.state.accumulator.unwrap_or_else(|| slot.get());
        base + velocity * dt
    }

    fn step(&self, mapping: &Mapping, now: ClockReading) -> f64 {
        match mapping.state.last_tick_time {
            Some(last) => (now.wall_time - last).clamp(0.0, self.settings.max_step),
            None => 0.0,
        }
    }

    fn record_failure(&self, mapping: &mut Mapping, now: ClockReading, reason: &str) {
        mapping.state.consecutive_failures = mapping.state.consecutive_failures.saturating_add(1);
        // A stalled motor does not catch up once the expression recovers.
        if mapping.mode == Mode::Motor {
            mapping.state.last_tick_time = Some(now.wall_time);
        }
        let failures = mapping.state.consecutive_failures;
        if failures == self.settings.degrade_after.max(1) {
            warn!(mapping = %mapping.id, failures, reason, "expression keeps failing");
            mapping.health = Health::Degraded(DegradeReason::NumericDomain);
        } else {
            trace!(mapping = %mapping.id, reason, "evaluation failed, holding value");
        }
    }
}

fn flag_unresolved(mapping: &mut Mapping, reason: String) -> Outcome {
    warn!(mapping = %mapping.id, target = %mapping.target_path, %reason, "target unavailable");
    mapping.health = Health::Degraded(DegradeReason::Unresolved(reason.clone()));
    Outcome::Unresolved(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappingPatch, Range, Registry, SourceSelector};
    use crate::property::{Property, PropertyStore};
    use assert_approx_eq::assert_approx_eq;

    fn at(wall: f64) -> ClockReading {
        ClockReading {
            wall_time: wall,
            scene_time: wall,
            scene_frame: wall * 24.0,
        }
    }

    fn setup(mode: Mode, range: Range, expr: &str) -> (Arc<PropertyStore>, Runtime, Registry) {
        let store = Arc::new(PropertyStore::new());
        store.insert("cube.x", Property::float(0.0)).unwrap();
        let runtime = Runtime::new(store.clone(), RuntimeSettings::default());
        let registry = Registry::new();
        registry
            .create(SourceSelector::cc(1), "cube.x", mode, range, expr)
            .unwrap();
        (store, runtime, registry)
    }

    #[test]
    fn set_lerps_into_range() {
        let (store, runtime, registry) = setup(Mode::Set, Range::new(-2.0, 2.0), "x");
        let entry = &registry.handles()[0].clone();
        assert_eq!(runtime.on_sample(entry, 0.75, at(0.0)), Outcome::Applied(1.0));
        assert_approx_eq!(store.value("cube.x").unwrap(), 1.0);
    }

    #[test]
    fn set_clamps_overshoot() {
        let (store, runtime, registry) = setup(Mode::Set, Range::new(0.0, 10.0), "x * 3");
        let entry = &registry.handles()[0].clone();
        runtime.on_sample(entry, 0.5, at(0.0));
        assert_approx_eq!(store.value("cube.x").unwrap(), 10.0);
    }

    #[test]
    fn reversed_range_inverts() {
        let (store, runtime, registry) = setup(Mode::Set, Range::new(5.0, 1.0), "");
        let entry = &registry.handles()[0].clone();
        runtime.on_sample(entry, 0.0, at(0.0));
        assert_approx_eq!(store.value("cube.x").unwrap(), 5.0);
        runtime.on_sample(entry, 1.0, at(0.0));
        assert_approx_eq!(store.value("cube.x").unwrap(), 1.0);
    }

    #[test]
    fn curve_shapes_input() {
        let (store, runtime, registry) = setup(Mode::Set, Range::default(), "x");
        registry
            .update(
                registry.handles()[0].id(),
                MappingPatch::default().curve(crate::mapping::Curve::QuadIn),
            )
            .unwrap();
        let entry = &registry.handles()[0].clone();
        runtime.on_sample(entry, 0.5, at(0.0));
        assert_approx_eq!(store.value("cube.x").unwrap(), 0.25);
    }

    #[test]
    fn eval_failure_holds_value() {
        let (store, runtime, registry) = setup(Mode::Set, Range::default(), "1 / x");
        let entry = &registry.handles()[0].clone();
        assert_eq!(runtime.on_sample(entry, 0.5, at(0.0)), Outcome::Applied(1.0));
        assert_eq!(runtime.on_sample(entry, 0.0, at(0.0)), Outcome::Held);
        assert_approx_eq!(store.value("cube.x").unwrap(), 1.0);
        assert_eq!(entry.lock().state.consecutive_failures, 1);
        assert!(entry.lock().health.is_healthy());
    }

    #[test]
    fn repeated_failures_degrade_then_recover() {
        let (_store, runtime, registry) = setup(Mode::Set, Range::default(), "1 / x");
        let entry = &registry.handles()[0].clone();
        for _ in 0..8 {
            runtime.on_sample(entry, 0.0, at(0.0));
        }
        assert_eq!(
            entry.lock().health,
            Health::Degraded(DegradeReason::NumericDomain)
        );
        assert!(runtime.on_sample(entry, 0.5, at(0.0)).applied().is_some());
        assert!(entry.lock().health.is_healthy());
        assert_eq!(entry.lock().state.consecutive_failures, 0);
    }

    #[test]
    fn unresolved_target_flags_and_skips() {
        let (_store, runtime, registry) = setup(Mode::Set, Range::default(), "x");
        let id = registry.handles()[0].id();
        registry
            .update(id, MappingPatch::default().target("cube.missing"))
            .unwrap();
        let entry = &registry.handles()[0].clone();

        assert!(matches!(
            runtime.on_sample(entry, 0.5, at(0.0)),
            Outcome::Unresolved(_)
        ));
        assert!(entry.lock().health.is_unresolved());
        assert_eq!(runtime.on_sample(entry, 0.6, at(0.0)), Outcome::Skipped);
        assert_eq!(entry.lock().state.last_raw, 0.6);

        registry.reresolve(id).unwrap();
        assert!(matches!(
            runtime.on_sample(entry, 0.6, at(0.0)),
            Outcome::Unresolved(_)
        ));
    }

    #[test]
    fn write_rejection_flags_mapping() {
        let store = Arc::new(PropertyStore::new());
        store.insert("locked", Property::float(0.0).read_only()).unwrap();
        let runtime = Runtime::new(store.clone(), RuntimeSettings::default());
        let registry = Registry::new();
        registry
            .create(SourceSelector::cc(1), "locked", Mode::Set, Range::default(), "")
            .unwrap();
        let entry = &registry.handles()[0].clone();
        assert!(matches!(
            runtime.on_sample(entry, 1.0, at(0.0)),
            Outcome::Unresolved(_)
        ));
        assert_eq!(store.value("locked").unwrap(), 0.0);
    }

    #[test]
    fn set_ignores_tick_unless_time_varying() {
        let (_store, runtime, registry) = setup(Mode::Set, Range::default(), "x");
        let entry = &registry.handles()[0].clone();
        assert_eq!(runtime.on_tick(entry, at(0.0)), Outcome::Skipped);
        runtime.on_sample(entry, 0.5, at(0.0));
        assert_eq!(runtime.on_tick(entry, at(0.1)), Outcome::Skipped);
    }

    #[test]
    fn time_varying_set_ticks_once_primed() {
        let (store, runtime, registry) = setup(Mode::Set, Range::new(0.0, 100.0), "time");
        let entry = &registry.handles()[0].clone();
        assert_eq!(runtime.on_tick(entry, at(0.5)), Outcome::Skipped);
        runtime.on_sample(entry, 0.0, at(0.1));
        assert_eq!(runtime.on_tick(entry, at(0.5)), Outcome::Applied(50.0));
        assert_approx_eq!(store.value("cube.x").unwrap(), 50.0);
    }

    #[test]
    fn motor_first_step_is_zero_and_seeds_from_property() {
        let (store, runtime, registry) = setup(Mode::Motor, Range::new(0.0, 2.0), "x");
        store.insert("cube.x", Property::float(3.0)).unwrap();
        let entry = &registry.handles()[0].clone();
        assert_eq!(runtime.on_sample(entry, 1.0, at(10.0)), Outcome::Applied(3.0));
        assert_eq!(entry.lock().state.accumulator, Some(3.0));
    }

    #[test]
    fn motor_integrates_velocity_over_wall_time() {
        let (store, runtime, registry) = setup(Mode::Motor, Range::new(0.0, 2.0), "x");
        let entry = &registry.handles()[0].clone();
        runtime.on_sample(entry, 0.5, at(0.0));
        for i in 1..=10 {
            runtime.on_tick(entry, at(i as f64 * 0.1));
        }
        // velocity 1.0/s for 1s
        assert_approx_eq!(store.value("cube.x").unwrap(), 1.0, 1e-9);
    }

    #[test]
    fn motor_step_is_clamped() {
        let (store, runtime, registry) = setup(Mode::Motor, Range::new(0.0, 1.0), "x");
        let entry = &registry.handles()[0].clone();
        runtime.on_sample(entry, 1.0, at(0.0));
        runtime.on_tick(entry, at(5.0));
        assert_approx_eq!(store.value("cube.x").unwrap(), 0.25);

        // Wall time going backwards integrates nothing.
        runtime.on_tick(entry, at(4.0));
        assert_approx_eq!(store.value("cube.x").unwrap(), 0.25);
    }

    #[test]
    fn motor_is_not_clamped_to_range() {
        let (store, runtime, registry) = setup(Mode::Motor, Range::new(0.0, 1.0), "x");
        let entry = &registry.handles()[0].clone();
        runtime.on_sample(entry, 1.0, at(0.0));
        for i in 1..=40 {
            runtime.on_tick(entry, at(i as f64 * 0.25));
        }
        assert_approx_eq!(store.value("cube.x").unwrap(), 10.0, 1e-9);
    }

    #[test]
    fn motor_negative_velocity() {
        let (store, runtime, registry) = setup(Mode::Motor, Range::new(-1.0, 1.0), "x");
        let entry = &registry.handles()[0].clone();
        runtime.on_sample(entry, 0.0, at(0.0));
        runtime.on_tick(entry, at(0.2));
        assert_approx_eq!(store.value("cube.x").unwrap(), -0.2, 1e-9);
    }

    #[test]
    fn retired_entry_discards() {
        let (store, runtime, registry) = setup(Mode::Set, Range::default(), "x");
        let entry = registry.handles()[0].clone();
        registry.delete(entry.id());
        assert_eq!(runtime.on_sample(&entry, 1.0, at(0.0)), Outcome::Discarded);
        assert_eq!(store.value("cube.x").unwrap(), 0.0);
    }

    #[test]
    fn motor_failed_write_does_not_advance() {
        let (store, runtime, registry) = setup(Mode::Motor, Range::new(0.0, 1.0), "x");
        let entry = &registry.handles()[0].clone();
        runtime.on_sample(entry, 1.0, at(0.0));
        runtime.on_tick(entry, at(0.1));
        assert_approx_eq!(store.value("cube.x").unwrap(), 0.1, 1e-9);

        store.insert("cube.x", Property::float(0.1).read_only()).unwrap();
        assert!(matches!(
            runtime.on_tick(entry, at(0.2)),
            Outcome::Unresolved(_)
        ));
        assert_approx_eq!(entry.lock().state.accumulator.unwrap(), 0.1, 1e-9);

        store.insert("cube.x", Property::float(0.1)).unwrap();
        registry.reresolve(entry.id()).unwrap();
        runtime.on_tick(entry, at(0.3));
        assert_approx_eq!(store.value("cube.x").unwrap(), 0.2, 1e-9);
    }

    #[test]
    fn smoothed_set_glides_on_ticks() {
        let (store, runtime, registry) = setup(Mode::Set, Range::new(0.0, 10.0), "x");
        let entry = &registry.handles()[0].clone();
        registry
            .update(entry.id(), MappingPatch::default().smoothing(0.5))
            .unwrap();

        runtime.on_sample(entry, 0.0, at(0.0));
        assert!(!entry.wants_tick());
        assert_eq!(runtime.on_sample(entry, 1.0, at(0.0)), Outcome::Applied(0.0));
        assert!(entry.wants_tick());

        // 0.5 * 12 per second over 0.1 s.
        let v = runtime.on_tick(entry, at(0.1)).applied().unwrap();
        assert_approx_eq!(v, 6.0, 1e-9);
        runtime.on_tick(entry, at(0.2));
        assert_approx_eq!(store.value("cube.x").unwrap(), 10.0);
        assert!(!entry.wants_tick());
        assert_eq!(runtime.on_tick(entry, at(0.3)), Outcome::Skipped);
    }

    #[test]
    fn absolute_set_uses_controller_scale() {
        let (store, runtime, registry) = setup(Mode::Set, Range::new(0.0, 1.0), "");
        let entry = &registry.handles()[0].clone();
        registry
            .update(entry.id(), MappingPatch::default().absolute(true))
            .unwrap();
        assert_eq!(runtime.on_sample(entry, 1.0, at(0.0)), Outcome::Applied(127.0));
        assert_approx_eq!(store.value("cube.x").unwrap(), 127.0);
    }

    #[test]
    fn sample_refreshes_tick_flag() {
        let (_store, runtime, registry) = setup(Mode::Set, Range::default(), "sin(time)");
        let entry = &registry.handles()[0].clone();
        assert!(!entry.wants_tick());
        runtime.on_sample(entry, 0.5, at(0.0));
        assert!(entry.wants_tick());
    }
}
