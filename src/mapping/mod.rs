//! Mappings: one input control bound to one property path.
//!
//! A [`Mapping`] carries its configuration (selector, target, mode, range,
//! curve, expression) and the runtime state the engine mutates between
//! invocations. Mappings live in the [`Registry`], one mutex each.

pub mod curve;
pub mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::CompiledExpression;
use crate::input::{Control, SourceKey};

pub use curve::Curve;
pub use registry::{MappingEntry, Registry, RegistryError};

/// Registry-assigned identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MappingId(pub u64);

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How an evaluated value reaches the property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Write the ranged value directly.
    #[default]
    Set,
    /// Treat the ranged value as a velocity and integrate it over time.
    Motor,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Set => write!(f, "set"),
            Mode::Motor => write!(f, "motor"),
        }
    }
}

/// Output range. `min > max` is legal and inverts the response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Linear interpolation; `t` is not clamped.
    pub fn lerp(&self, t: f64) -> f64 {
        self.min + (self.max - self.min) * t
    }

    /// Clamp to the ordered endpoints.
    pub fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.min.min(self.max), self.min.max(self.max))
    }
}

impl Default for Range {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

/// Which input samples a mapping listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSelector {
    /// `None` matches every channel.
    #[serde(default)]
    pub channel: Option<u8>,
    pub control: Control,
}

impl SourceSelector {
    pub fn cc(number: u8) -> Self {
        Self {
            channel: None,
            control: Control::Cc(number),
        }
    }

    pub fn note(number: u8) -> Self {
        Self {
            channel: None,
            control: Control::Note(number),
        }
    }

    pub fn on_channel(mut self, channel: u8) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn matches(&self, key: &SourceKey) -> bool {
        self.control == key.control && self.channel.map_or(true, |c| c == key.channel)
    }
}

impl From<SourceKey> for SourceSelector {
    fn from(key: SourceKey) -> Self {
        Self {
            channel: Some(key.channel),
            control: key.control,
        }
    }
}

impl fmt::Display for SourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            Some(ch) => write!(f, "{} (ch {})", self.control, ch + 1),
            None => write!(f, "{}", self.control),
        }
    }
}

/// Why a mapping is not applying normally.
#[derive(Debug, Clone, PartialEq)]
pub enum DegradeReason {
    /// The expression kept failing to produce a finite number.
    NumericDomain,
    /// The target path did not resolve or refused the write.
    Unresolved(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Health {
    #[default]
    Healthy,
    Degraded(DegradeReason),
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Health::Healthy)
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Health::Degraded(DegradeReason::Unresolved(_)))
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Healthy => write!(f, "ok"),
            Health::Degraded(DegradeReason::NumericDomain) => write!(f, "degraded: numeric domain"),
            Health::Degraded(DegradeReason::Unresolved(reason)) => {
                write!(f, "degraded: {reason}")
            }
        }
    }
}

/// Input smoothing speed that disables smoothing.
pub const SMOOTHING_OFF: f64 = 1.0;

const MIN_SMOOTHING: f64 = 0.01;

/// Distance the smoothed input covers per second at speed 1.
const SMOOTHING_RATE: f64 = 12.0;

/// Gap below which the smoothed input snaps onto its target.
const SMOOTHING_SNAP: f64 = 0.001;

/// Per-mapping state owned by the runtime.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuntimeState {
    /// Most recent normalized input.
    pub last_raw: f64,
    /// Motor integral. Seeded from the live property on the first write.
    pub accumulator: Option<f64>,
    /// Wall time of the last Motor integration step.
    pub last_tick_time: Option<f64>,
    /// At least one sample has arrived since the last reset.
    pub primed: bool,
    /// Smoothed input chasing `last_raw`, when smoothing is on.
    pub smoothed: Option<f64>,
    /// Wall time of the last smoothing step.
    pub last_smooth_time: Option<f64>,
    pub consecutive_failures: u32,
    pub last_applied: Option<f64>,
}

impl RuntimeState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A configured binding plus its live state.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub id: MappingId,
    pub name: String,
    pub source_selector: SourceSelector,
    pub target_path: String,
    pub mode: Mode,
    pub range: Range,
    pub curve: Curve,
    pub expression: CompiledExpression,
    /// Speed in `0.01..1.0` at which the input glides toward new samples.
    /// [`SMOOTHING_OFF`] applies samples immediately.
    pub smoothing: f64,
    /// Scale the result to the 0..=127 controller scale instead of the range.
    pub absolute: bool,
    pub state: RuntimeState,
    pub health: Health,
}

impl Mapping {
    /// Whether periodic ticks should re-evaluate this mapping.
    pub fn wants_tick(&self) -> bool {
        match self.mode {
            Mode::Motor => true,
            Mode::Set => {
                self.state.primed && (self.expression.is_time_varying() || self.is_settling())
            }
        }
    }

    pub fn is_smoothed(&self) -> bool {
        self.smoothing < SMOOTHING_OFF
    }

    /// Whether the smoothed input has yet to reach the latest sample.
    pub fn is_settling(&self) -> bool {
        self.is_smoothed()
            && self
                .state
                .smoothed
                .is_some_and(|s| s != self.state.last_raw)
    }

    /// Advance the smoothed input to wall time `now` and return the input
    /// the curve should see.
    pub fn smoothed_input(&mut self, now: f64, max_step: f64) -> f64 {
        let target = self.state.last_raw;
        if !self.is_smoothed() {
            return target;
        }
        let dt = match self.state.last_smooth_time {
            Some(last) => (now - last).clamp(0.0, max_step),
            None => 0.0,
        };
        self.state.last_smooth_time = Some(now);

        let current = *self.state.smoothed.get_or_insert(target);
        let step = self.smoothing.max(MIN_SMOOTHING) * SMOOTHING_RATE * dt;
        let next = if (target - current).abs() <= step.max(SMOOTHING_SNAP) {
            target
        } else if current < target {
            current + step
        } else {
            current - step
        };
        self.state.smoothed = Some(next);
        next
    }

    /// Map an expression result to the value domain: the range, or the
    /// controller scale in absolute mode.
    pub fn scale(&self, y: f64) -> f64 {
        if self.absolute {
            y * 127.0
        } else {
            self.range.lerp(y)
        }
    }

    pub fn summary(&self) -> MappingSummary {
        MappingSummary {
            id: self.id,
            name: self.name.clone(),
            source: self.source_selector,
            target_path: self.target_path.clone(),
            mode: self.mode,
            range: self.range,
            curve: self.curve,
            expression: self.expression.to_string(),
            smoothing: self.smoothing,
            absolute: self.absolute,
            health: self.health.clone(),
            last_applied: self.state.last_applied,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.state.reset();
        self.health = Health::Healthy;
    }
}

/// Read-only view of a mapping for listing.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingSummary {
    pub id: MappingId,
    pub name: String,
    pub source: SourceSelector,
    pub target_path: String,
    pub mode: Mode,
    pub range: Range,
    pub curve: Curve,
    pub expression: String,
    pub smoothing: f64,
    pub absolute: bool,
    pub health: Health,
    pub last_applied: Option<f64>,
}

impl fmt::Display for MappingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<16} {} -> {} [{}] {}..{} y={} ({})",
            self.id,
            self.name,
            self.source,
            self.target_path,
            self.mode,
            self.range.min,
            self.range.max,
            self.expression,
            self.health
        )
    }
}

/// Partial edit applied by [`Registry::update`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingPatch {
    pub name: Option<String>,
    pub source_selector: Option<SourceSelector>,
    pub target_path: Option<String>,
    pub mode: Option<Mode>,
    pub range: Option<Range>,
    pub curve: Option<Curve>,
    pub expression: Option<String>,
    pub smoothing: Option<f64>,
    pub absolute: Option<bool>,
}

impl MappingPatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn source(mut self, selector: SourceSelector) -> Self {
        self.source_selector = Some(selector);
        self
    }

    pub fn target(mut self, path: impl Into<String>) -> Self {
        self.target_path = Some(path.into());
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.range = Some(Range::new(min, max));
        self
    }

    pub fn curve(mut self, curve: Curve) -> Self {
        self.curve = Some(curve);
        self
    }

    pub fn expression(mut self, source: impl Into<String>) -> Self {
        self.expression = Some(source.into());
        self
    }

    pub fn smoothing(mut self, speed: f64) -> Self {
        self.smoothing = Some(speed);
        self
    }

    pub fn absolute(mut self, absolute: bool) -> Self {
        self.absolute = Some(absolute);
        self
    }
}
