// Per-side slew-rate limiter ("dampening")
//
// Bounds how fast a single output fraction may change: between two updates
// separated by `dt` seconds the output moves by at most `rate_limit * dt`.
// Runs on the actuation path, so nothing here fails: bad numbers are saturated.

use tracing::warn;

use super::kinematics::{MAX_OUTPUT, MIN_OUTPUT};

/// Slew-rate limiter state for one drive side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlewRateLimiter {
    /// Previously emitted (already limited) output, always in [-1, 1]
    last_output: f64,
    /// Maximum |delta output| per second. `f64::INFINITY` disables limiting.
    rate_limit: f64,
}

impl SlewRateLimiter {
    /// Create a limiter starting at zero output
    ///
    /// A NaN or non-positive `rate_limit` falls back to unbounded.
    pub fn new(rate_limit: f64) -> Self {
        let rate_limit = if is_valid_rate(rate_limit) {
            rate_limit
        } else {
            warn!(
                "Invalid rate limit {} at construction, running unbounded",
                rate_limit
            );
            f64::INFINITY
        };

        Self {
            last_output: 0.0,
            rate_limit,
        }
    }

    /// Create a pass-through limiter (no dampening)
    pub fn unbounded() -> Self {
        Self::new(f64::INFINITY)
    }

    pub fn rate_limit(&self) -> f64 {
        self.rate_limit
    }

    pub fn last_output(&self) -> f64 {
        self.last_output
    }

    pub fn is_unbounded(&self) -> bool {
        self.rate_limit == f64::INFINITY
    }

    /// Replace the rate limit for subsequent updates
    ///
    /// `last_output` is untouched, so the next update ramps from wherever the
    /// output currently is under the new limit. Invalid values are ignored.
    pub fn set_rate_limit(&mut self, rate_limit: f64) {
        if !is_valid_rate(rate_limit) {
            warn!(
                "Ignoring invalid rate limit {}, keeping {}",
                rate_limit, self.rate_limit
            );
            return;
        }
        self.rate_limit = rate_limit;
    }

    /// Step the limiter towards `target` over `dt` seconds
    ///
    /// # Arguments
    /// * `target` - Desired output fraction (clamped to [-1, 1]; NaN holds)
    /// * `dt` - Seconds since the previous update (negative or NaN reads as 0)
    ///
    /// # Returns
    /// The new output, which is also stored as `last_output`
    pub fn update(&mut self, target: f64, dt: f64) -> f64 {
        if target.is_nan() {
            return self.last_output;
        }
        let target = target.clamp(MIN_OUTPUT, MAX_OUTPUT);

        // Unbounded tracks the target even on a zero-length tick
        if self.is_unbounded() {
            self.last_output = target;
            return target;
        }

        let dt = if dt > 0.0 { dt } else { 0.0 };
        let max_delta = self.rate_limit * dt;
        let delta = (target - self.last_output).clamp(-max_delta, max_delta);

        self.last_output = (self.last_output + delta).clamp(MIN_OUTPUT, MAX_OUTPUT);
        self.last_output
    }
}

impl Default for SlewRateLimiter {
    fn default() -> Self {
        Self::unbounded()
    }
}

fn is_valid_rate(rate_limit: f64) -> bool {
    rate_limit > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_response_ramps() {
        let mut limiter = SlewRateLimiter::new(0.5);
        assert_eq!(limiter.update(1.0, 1.0), 0.5);
        assert_eq!(limiter.update(1.0, 1.0), 1.0);
        // Already at target
        assert_eq!(limiter.update(1.0, 1.0), 1.0);
    }

    #[test]
    fn test_falling_edge_is_limited() {
        let mut limiter = SlewRateLimiter::unbounded();
        limiter.update(1.0, 0.02);
        limiter.set_rate_limit(2.0);

        let out = limiter.update(-1.0, 0.1);
        assert!((out - 0.8).abs() < 1e-12, "got {}", out);
    }

    #[test]
    fn test_zero_dt_holds_output() {
        let mut limiter = SlewRateLimiter::new(3.0);
        limiter.update(0.6, 0.1);
        let held = limiter.last_output();

        for &target in &[1.0, -1.0, 0.0, 42.0] {
            assert_eq!(limiter.update(target, 0.0), held);
        }
    }

    #[test]
    fn test_negative_and_nan_dt_read_as_zero() {
        let mut limiter = SlewRateLimiter::new(1.0);
        assert_eq!(limiter.update(1.0, -5.0), 0.0);
        assert_eq!(limiter.update(1.0, f64::NAN), 0.0);
    }

    #[test]
    fn test_unbounded_passes_through() {
        let mut limiter = SlewRateLimiter::unbounded();
        for &(target, dt) in &[(0.7, 0.02), (-1.0, 0.0), (3.0, 0.001), (-2.5, 10.0)] {
            assert_eq!(limiter.update(target, dt), f64::clamp(target, -1.0, 1.0));
        }
    }

    #[test]
    fn test_rate_bound_holds_over_sequence() {
        let rate = 1.7;
        let mut limiter = SlewRateLimiter::new(rate);
        let mut previous = limiter.last_output();

        // Deterministic pseudo-random targets and tick lengths
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let target = ((seed % 4001) as f64 / 1000.0) - 2.0;
            let dt = ((seed >> 20) % 60) as f64 / 1000.0;

            let out = limiter.update(target, dt);
            assert!(
                (out - previous).abs() <= rate * dt + 1e-12,
                "step {} -> {} exceeds {} over {}s",
                previous,
                out,
                rate,
                dt
            );
            assert!((-1.0..=1.0).contains(&out));
            previous = out;
        }
    }

    #[test]
    fn test_reconfigure_is_not_retroactive() {
        let mut limiter = SlewRateLimiter::new(10.0);
        limiter.update(1.0, 0.05); // 0.5
        let before = limiter.last_output();

        limiter.set_rate_limit(1.0);
        assert_eq!(limiter.last_output(), before);

        let out = limiter.update(-1.0, 0.1);
        assert!((out - (before - 0.1)).abs() < 1e-12, "got {}", out);
    }

    #[test]
    fn test_invalid_rate_limits() {
        assert!(SlewRateLimiter::new(f64::NAN).is_unbounded());
        assert!(SlewRateLimiter::new(-1.0).is_unbounded());
        assert!(SlewRateLimiter::new(0.0).is_unbounded());

        let mut limiter = SlewRateLimiter::new(2.0);
        limiter.set_rate_limit(f64::NAN);
        limiter.set_rate_limit(-3.0);
        assert_eq!(limiter.rate_limit(), 2.0);
    }

    #[test]
    fn test_non_finite_targets() {
        let mut limiter = SlewRateLimiter::unbounded();
        limiter.update(0.25, 0.02);
        assert_eq!(limiter.update(f64::NAN, 0.02), 0.25);
        assert_eq!(limiter.update(f64::INFINITY, 0.02), 1.0);
        assert_eq!(limiter.update(f64::NEG_INFINITY, 0.02), -1.0);
    }
}
