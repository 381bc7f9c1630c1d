// Rate-limited differential drive
//
// Composition of the stateless kinematics with one slew-rate limiter per side.
// The host calls exactly one of drive/drive_arcade/drive_tank/stop per tick
// with the measured elapsed time.

use serde::{Deserialize, Serialize};

use super::kinematics::DriveIntent;
use super::slew::SlewRateLimiter;

/// Limited per-side output for one tick, each side in [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DriveOutput {
    pub left: f64,
    pub right: f64,
}

impl DriveOutput {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

/// Differential drive whose per-side outputs are slew-rate limited
#[derive(Debug, Clone, Default)]
pub struct DampenedDrive {
    left: SlewRateLimiter,
    right: SlewRateLimiter,
}

impl DampenedDrive {
    /// Create a drive limited to `rate_limit` output-fraction per second on both sides
    pub fn new(rate_limit: f64) -> Self {
        Self {
            left: SlewRateLimiter::new(rate_limit),
            right: SlewRateLimiter::new(rate_limit),
        }
    }

    /// Create a drive with no dampening
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Apply one intent over `dt` seconds
    pub fn drive(&mut self, intent: DriveIntent, dt: f64) -> DriveOutput {
        let (raw_left, raw_right) = intent.raw_outputs();

        DriveOutput {
            left: self.left.update(raw_left, dt),
            right: self.right.update(raw_right, dt),
        }
    }

    /// Arcade drive: `angular` positive turns right
    pub fn drive_arcade(&mut self, linear: f64, angular: f64, dt: f64) -> DriveOutput {
        self.drive(DriveIntent::Arcade { linear, angular }, dt)
    }

    pub fn drive_tank(&mut self, left: f64, right: f64, dt: f64) -> DriveOutput {
        self.drive(DriveIntent::Tank { left, right }, dt)
    }

    /// Ramp both sides towards zero under the rate limit
    ///
    /// This does not cut output instantly: reaching zero takes
    /// `|last_output| / rate_limit` seconds. An immediate cut has to happen at
    /// the motor sink.
    pub fn stop(&mut self, dt: f64) -> DriveOutput {
        self.drive_tank(0.0, 0.0, dt)
    }

    /// Set the same rate limit on both sides, effective from the next tick
    pub fn set_rate_limit(&mut self, rate_limit: f64) {
        self.left.set_rate_limit(rate_limit);
        self.right.set_rate_limit(rate_limit);
    }

    /// Current rate limit (both sides are configured identically)
    pub fn rate_limit(&self) -> f64 {
        self.left.rate_limit()
    }

    /// Most recent limited output
    pub fn last_output(&self) -> DriveOutput {
        DriveOutput {
            left: self.left.last_output(),
            right: self.right.last_output(),
        }
    }
}
