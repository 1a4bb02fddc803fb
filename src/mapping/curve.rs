//! Easing curves applied to the raw controller value before the expression.
//!
//! Each curve maps an input in `[0.0, 1.0]` to an output that starts at 0.0
//! and ends at 1.0. Back and elastic curves overshoot in between.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Easing shape for a mapping's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Curve {
    #[default]
    Linear,
    QuadIn,
    QuadOut,
    QuadInOut,
    CubicOut,
    ExpoOut,
    BackOut,
    ElasticOut,
    BounceOut,
}

impl Curve {
    pub const ALL: [Curve; 9] = [
        Curve::Linear,
        Curve::QuadIn,
        Curve::QuadOut,
        Curve::QuadInOut,
        Curve::CubicOut,
        Curve::ExpoOut,
        Curve::BackOut,
        Curve::ElasticOut,
        Curve::BounceOut,
    ];

    /// Apply the curve to a normalized value.
    ///
    /// Values are clamped to `[0.0, 1.0]` before shaping.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Curve::Linear => t,
            Curve::QuadIn => t * t,
            Curve::QuadOut => 1.0 - (1.0 - t) * (1.0 - t),
            Curve::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Curve::CubicOut => 1.0 - (1.0 - t).powi(3),
            Curve::ExpoOut => {
                if t == 1.0 {
                    1.0
                } else {
                    1.0 - 2f64.powf(-10.0 * t)
                }
            }
            Curve::BackOut => {
                const C1: f64 = 1.70158;
                const C3: f64 = C1 + 1.0;
                1.0 + C3 * (t - 1.0).powi(3) + C1 * (t - 1.0).powi(2)
            }
            Curve::ElasticOut => {
                if t == 0.0 || t == 1.0 {
                    t
                } else {
                    let c4 = 2.0 * PI / 3.0;
                    2f64.powf(-10.0 * t) * ((t * 10.0 - 0.75) * c4).sin() + 1.0
                }
            }
            Curve::BounceOut => bounce_out(t),
        }
    }
}

fn bounce_out(t: f64) -> f64 {
    const N1: f64 = 7.5625;
    const D1: f64 = 2.75;
    if t < 1.0 / D1 {
        N1 * t * t
    } else if t < 2.0 / D1 {
        let t = t - 1.5 / D1;
        N1 * t * t + 0.75
    } else if t < 2.5 / D1 {
        let t = t - 2.25 / D1;
        N1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / D1;
        N1 * t * t + 0.984375
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn all_curves_pin_endpoints() {
        for curve in Curve::ALL {
            assert!(curve.apply(0.0).abs() < 1e-3, "{curve:?} at 0");
            assert!((curve.apply(1.0) - 1.0).abs() < EPSILON, "{curve:?} at 1");
        }
    }

    #[test]
    fn linear_is_identity() {
        assert!((Curve::Linear.apply(0.37) - 0.37).abs() < EPSILON);
    }

    #[test]
    fn quad_in_at_half() {
        assert!((Curve::QuadIn.apply(0.5) - 0.25).abs() < EPSILON);
    }

    #[test]
    fn quad_out_at_half() {
        assert!((Curve::QuadOut.apply(0.5) - 0.75).abs() < EPSILON);
    }

    #[test]
    fn quad_in_out_symmetric() {
        assert!((Curve::QuadInOut.apply(0.5) - 0.5).abs() < EPSILON);
        let a = Curve::QuadInOut.apply(0.25);
        let b = Curve::QuadInOut.apply(0.75);
        assert!((a + b - 1.0).abs() < EPSILON);
    }

    #[test]
    fn back_out_overshoots() {
        let peak = (1..100)
            .map(|i| Curve::BackOut.apply(i as f64 / 100.0))
            .fold(f64::MIN, f64::max);
        assert!(peak > 1.0, "back-out should overshoot, peak {peak}");
    }

    #[test]
    fn monotonic_curves() {
        for curve in [
            Curve::Linear,
            Curve::QuadIn,
            Curve::QuadOut,
            Curve::QuadInOut,
            Curve::CubicOut,
            Curve::ExpoOut,
            Curve::BounceOut,
        ] {
            let mut prev = curve.apply(0.0);
            for i in 1..=100 {
                let t = i as f64 / 100.0;
                let v = curve.apply(t);
                if curve != Curve::BounceOut {
                    assert!(v >= prev - EPSILON, "{curve:?} not monotonic at t={t}");
                }
                prev = v;
            }
        }
    }

    #[test]
    fn clamps_out_of_range_input() {
        assert!((Curve::QuadIn.apply(-0.5)).abs() < EPSILON);
        assert!((Curve::QuadIn.apply(1.5) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn default_is_linear() {
        assert_eq!(Curve::default(), Curve::Linear);
    }
}
