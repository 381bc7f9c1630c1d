// Differential-drive kinematics
// Converts arcade (linear, angular) or tank (left, right) intents into raw
// per-side output fractions. Stateless: no limiting happens here.

/// Lowest output fraction a side may be commanded
pub const MIN_OUTPUT: f64 = -1.0;
/// Highest output fraction a side may be commanded
pub const MAX_OUTPUT: f64 = 1.0;

/// A drive intent for a single control tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveIntent {
    /// `linear` is forward speed, `angular` is turn rate (positive = turn right)
    Arcade { linear: f64, angular: f64 },
    /// Direct per-side command
    Tank { left: f64, right: f64 },
}

impl DriveIntent {
    /// Raw (unlimited) left/right outputs for this intent
    pub fn raw_outputs(&self) -> (f64, f64) {
        match *self {
            DriveIntent::Arcade { linear, angular } => from_arcade(linear, angular),
            DriveIntent::Tank { left, right } => from_tank(left, right),
        }
    }

    /// True when both raw outputs are exactly zero
    pub fn is_neutral(&self) -> bool {
        let (left, right) = self.raw_outputs();
        left == 0.0 && right == 0.0
    }
}

/// Saturate a value into the output range. NaN is read as no input.
pub(crate) fn clamp_output(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(MIN_OUTPUT, MAX_OUTPUT)
    }
}

/// Arcade mixing: left = linear + angular, right = linear - angular
///
/// # Arguments
/// * `linear` - Forward output fraction (positive = forward)
/// * `angular` - Turn output fraction (positive = turn right)
///
/// # Returns
/// `(raw_left, raw_right)`, each saturated to [-1, 1]
pub fn from_arcade(linear: f64, angular: f64) -> (f64, f64) {
    let linear = clamp_output(linear);
    let angular = clamp_output(angular);

    (
        clamp_output(linear + angular),
        clamp_output(linear - angular),
    )
}

/// Tank passthrough with saturation
pub fn from_tank(left: f64, right: f64) -> (f64, f64) {
    (clamp_output(left), clamp_output(right))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arcade_straight() {
        assert_eq!(from_arcade(0.5, 0.0), (0.5, 0.5));
        assert_eq!(from_arcade(-0.25, 0.0), (-0.25, -0.25));
    }

    #[test]
    fn test_arcade_turn_right_slows_right_side() {
        // Positive angular steers right: the right side runs slower than the left
        let (left, right) = from_arcade(0.4, 0.2);
        assert!(left > right);

        // Spin in place
        assert_eq!(from_arcade(0.0, 1.0), (1.0, -1.0));
    }

    #[test]
    fn test_arcade_saturates() {
        // 0.6 + 0.6 = 1.2 is clamped, the other side lands on zero
        let (left, right) = from_arcade(0.6, 0.6);
        assert_eq!(left, 1.0);
        assert_eq!(right, 0.0);
    }

    #[test]
    fn test_arcade_outputs_stay_in_range() {
        // Sweep inputs up to twice the unit range
        let steps: Vec<f64> = (-20..=20).map(|i| i as f64 / 10.0).collect();
        for &linear in &steps {
            for &angular in &steps {
                let (left, right) = from_arcade(linear, angular);
                assert!(
                    (MIN_OUTPUT..=MAX_OUTPUT).contains(&left),
                    "left {} out of range for ({}, {})",
                    left,
                    linear,
                    angular
                );
                assert!(
                    (MIN_OUTPUT..=MAX_OUTPUT).contains(&right),
                    "right {} out of range for ({}, {})",
                    right,
                    linear,
                    angular
                );
            }
        }
    }

    #[test]
    fn test_tank_identity_with_clamp() {
        for &(x, y) in &[(0.3, -0.7), (1.5, -3.0), (-1.0, 1.0), (0.0, 0.0)] {
            assert_eq!(from_tank(x, y), (x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0)));
        }
    }

    #[test]
    fn test_nan_input_reads_as_zero() {
        assert_eq!(from_tank(f64::NAN, 0.5), (0.0, 0.5));
        assert_eq!(from_arcade(f64::NAN, f64::NAN), (0.0, 0.0));
    }

    #[test]
    fn test_conversion_is_pure() {
        let intent = DriveIntent::Arcade {
            linear: 0.3,
            angular: -0.1,
        };
        assert_eq!(intent.raw_outputs(), intent.raw_outputs());
    }

    #[test]
    fn test_intent_dispatch() {
        let tank = DriveIntent::Tank {
            left: 2.0,
            right: -0.5,
        };
        assert_eq!(tank.raw_outputs(), (1.0, -0.5));
        assert!(!tank.is_neutral());

        let idle = DriveIntent::Arcade {
            linear: 0.0,
            angular: 0.0,
        };
        assert!(idle.is_neutral());
    }
}
