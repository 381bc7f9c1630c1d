// Timeouts, topics, drive constants
use std::time::Duration;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "drive/cmd/base"; // drive commands
pub const TOPIC_CMD_CONFIG: &str = "drive/cmd/config"; // rate limit, neutral mode, interlock
pub const TOPIC_RT_BASE: &str = "drive/rt/base"; // limited per-side output
pub const TOPIC_HEALTH: &str = "drive/state/health"; // health status

// Drive dampening: max change of output fraction per second.
// 1.5/s takes a side from rest to full output in ~0.67 s.
pub const ACCELERATION_RATE_LIMIT: f64 = 1.5;

// Servo bus
pub const MOTOR_PORT: &str = "/dev/ttyACM0";

// Enable hardware motor control (set to false for simulation/testing)
pub const MOTOR_ENABLED: bool = true;

// Ganged servos per side: [front, back]
pub const LEFT_MOTOR_IDS: [u8; 2] = [1, 2];
pub const RIGHT_MOTOR_IDS: [u8; 2] = [3, 4];

// Right side is mounted mirrored
pub const RIGHT_INVERTED: bool = true;

// Supply current protection, applied once when the servos are initialized
pub const DRIVE_CURRENT_LIMIT_AMPS: f64 = 1.5;
pub const DRIVE_TRIGGER_THRESHOLD_AMPS: f64 = 2.5;
pub const DRIVE_TRIGGER_THRESHOLD_TIME: Duration = Duration::from_secs(2);

/// Values the runtime actually uses, defaults taken from the constants above
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub loop_hz: u64,
    pub cmd_timeout: Duration,
    /// `f64::INFINITY` disables dampening
    pub rate_limit: f64,
    pub motor_port: String,
    pub motor_enabled: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            loop_hz: LOOP_HZ,
            cmd_timeout: CMD_TIMEOUT,
            rate_limit: ACCELERATION_RATE_LIMIT,
            motor_port: MOTOR_PORT.to_string(),
            motor_enabled: MOTOR_ENABLED,
        }
    }
}

impl RuntimeConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(1000 / self.loop_hz.max(1))
    }
}
