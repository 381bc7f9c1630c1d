// Hardware sink for the differential drive
//
// Fans each side's output out to the ganged servos of that side over a single
// sync write. Current limiting lives here as its own protective layer and is
// configured once at initialisation; it never touches the slew behaviour.

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::feetech::{
    CURRENT_UNIT_AMPS, FeetechBus, FeetechError, OperatingMode, PWM_RANGE, Register,
};
use super::sink::{MotorSink, NeutralMode};
use crate::config::{
    DRIVE_CURRENT_LIMIT_AMPS, DRIVE_TRIGGER_THRESHOLD_AMPS, DRIVE_TRIGGER_THRESHOLD_TIME,
    LEFT_MOTOR_IDS, RIGHT_INVERTED, RIGHT_MOTOR_IDS,
};

/// Which servos make up each side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveLayout {
    pub left_ids: [u8; 2],
    pub right_ids: [u8; 2],
    /// The right side is mounted mirrored and spins the other way for "forward"
    pub invert_right: bool,
}

impl Default for DriveLayout {
    fn default() -> Self {
        Self {
            left_ids: LEFT_MOTOR_IDS,
            right_ids: RIGHT_MOTOR_IDS,
            invert_right: RIGHT_INVERTED,
        }
    }
}

impl DriveLayout {
    /// Every servo, left side first
    pub fn motor_ids(&self) -> [u8; 4] {
        [
            self.left_ids[0],
            self.left_ids[1],
            self.right_ids[0],
            self.right_ids[1],
        ]
    }
}

/// Supply current protection
///
/// Once draw stays above `trigger_threshold_amps` for `trigger_threshold_time`
/// the servo drops to `limit_amps`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentLimit {
    pub enabled: bool,
    pub limit_amps: f64,
    pub trigger_threshold_amps: f64,
    pub trigger_threshold_time: Duration,
}

impl Default for CurrentLimit {
    fn default() -> Self {
        Self {
            enabled: true,
            limit_amps: DRIVE_CURRENT_LIMIT_AMPS,
            trigger_threshold_amps: DRIVE_TRIGGER_THRESHOLD_AMPS,
            trigger_threshold_time: DRIVE_TRIGGER_THRESHOLD_TIME,
        }
    }
}

impl CurrentLimit {
    /// Register encoding: (protection current, protective torque %, over-current time)
    ///
    /// The servo expresses the post-trip limit as a share of full torque, so
    /// `limit_amps` is scaled against the trigger threshold.
    pub fn register_values(&self) -> (u16, u8, u8) {
        let threshold = self.trigger_threshold_amps.max(0.0);
        let current_units = (threshold / CURRENT_UNIT_AMPS).round().min(u16::MAX as f64) as u16;

        let torque_pct = if threshold > 0.0 {
            (self.limit_amps / threshold * 100.0).round().clamp(0.0, 100.0) as u8
        } else {
            0
        };

        let time_units = (self.trigger_threshold_time.as_millis() / 10).min(u8::MAX as u128) as u8;

        (current_units, torque_pct, time_units)
    }
}

/// Output fraction to signed PWM
fn to_pwm(output: f64) -> i16 {
    if output.is_nan() {
        return 0;
    }
    (output.clamp(-1.0, 1.0) * PWM_RANGE as f64).round() as i16
}

/// Differential drive on a Feetech servo bus, two servos per side
pub struct FeetechDrive<T: Read + Write = Box<dyn SerialPort>> {
    bus: FeetechBus<T>,
    layout: DriveLayout,
    neutral_mode: NeutralMode,
    torque_enabled: bool,
}

impl FeetechDrive {
    pub fn open(port: &str, layout: DriveLayout) -> Result<Self, FeetechError> {
        info!("Opening drive bus on {}", port);
        let bus = FeetechBus::open(port)?;
        Ok(Self::with_bus(bus, layout))
    }
}

impl<T: Read + Write> FeetechDrive<T> {
    /// Wrap an already-open bus. Torque is assumed off until `initialize`.
    pub fn with_bus(bus: FeetechBus<T>, layout: DriveLayout) -> Self {
        Self {
            bus,
            layout,
            neutral_mode: NeutralMode::Brake,
            torque_enabled: false,
        }
    }

    pub fn layout(&self) -> DriveLayout {
        self.layout
    }

    pub fn torque_enabled(&self) -> bool {
        self.torque_enabled
    }

    pub fn bus(&self) -> &FeetechBus<T> {
        &self.bus
    }

    /// Check every servo answers, switch to PWM mode, apply current limits and
    /// enable torque
    pub fn initialize(&mut self, current_limit: &CurrentLimit) -> Result<(), FeetechError> {
        let ids = self.layout.motor_ids();
        info!("Initializing drive servos {:?} for PWM control", ids);

        for id in ids {
            if !self.bus.ping(id)? {
                warn!("Servo {} not responding to ping", id);
                return Err(FeetechError::Timeout { id });
            }
            debug!("Servo {} responding", id);
        }

        // Mode changes need torque off
        self.set_torque(false)?;
        for id in ids {
            self.bus.set_operating_mode(id, OperatingMode::Pwm)?;
        }

        self.apply_current_limit(current_limit)?;
        self.set_torque(true)?;

        info!("Drive servos initialized");
        Ok(())
    }

    /// Write the current protection registers on every servo
    pub fn apply_current_limit(&mut self, limit: &CurrentLimit) -> Result<(), FeetechError> {
        if !limit.enabled {
            info!("Current limiting disabled, leaving servo protection untouched");
            return Ok(());
        }

        let (current, torque_pct, time) = limit.register_values();
        info!(
            "Current limit: {:.2} A after {:.2} A for {:?}",
            limit.limit_amps, limit.trigger_threshold_amps, limit.trigger_threshold_time
        );

        for id in self.layout.motor_ids() {
            self.bus.write_u16(id, Register::ProtectionCurrent, current)?;
            self.bus.write_u8(id, Register::ProtectiveTorque, torque_pct)?;
            self.bus.write_u8(id, Register::OverCurrentTime, time)?;
        }
        Ok(())
    }

    /// Present current per servo, in `motor_ids()` order
    pub fn present_currents(&mut self) -> Result<[f64; 4], FeetechError> {
        let mut currents = [0.0; 4];
        for (slot, id) in currents.iter_mut().zip(self.layout.motor_ids()) {
            *slot = self.bus.present_current(id)?;
        }
        Ok(currents)
    }

    /// Best effort across the servos: a failed write leaves the earlier servos
    /// switched, and `torque_enabled` only flips once every servo acknowledged,
    /// so the next `accept` retries the whole toggle.
    fn set_torque(&mut self, enabled: bool) -> Result<(), FeetechError> {
        debug!("Setting drive torque enabled={}", enabled);
        for id in self.layout.motor_ids() {
            if enabled {
                self.bus.enable_torque(id)?;
            } else {
                self.bus.disable_torque(id)?;
            }
        }
        self.torque_enabled = enabled;
        Ok(())
    }

    fn write_pwm(&mut self, left: i16, right: i16) -> Result<(), FeetechError> {
        let DriveLayout {
            left_ids,
            right_ids,
            ..
        } = self.layout;
        let data = [
            (left_ids[0], left),
            (left_ids[1], left),
            (right_ids[0], right),
            (right_ids[1], right),
        ];
        self.bus.sync_write_pwm(&data)
    }
}

impl<T: Read + Write> MotorSink for FeetechDrive<T> {
    type Error = FeetechError;

    fn accept(&mut self, left: f64, right: f64) -> Result<(), FeetechError> {
        let left_pwm = to_pwm(left);
        let mut right_pwm = to_pwm(right);
        if self.layout.invert_right {
            right_pwm = -right_pwm;
        }

        // Coast releases the servos whenever both sides sit at zero
        let hold = self.neutral_mode == NeutralMode::Brake || left_pwm != 0 || right_pwm != 0;
        if hold != self.torque_enabled {
            self.set_torque(hold)?;
        }

        self.write_pwm(left_pwm, right_pwm)
    }

    fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result<(), FeetechError> {
        info!("Drive neutral mode: {:?}", mode);
        self.neutral_mode = mode;
        if mode == NeutralMode::Brake && !self.torque_enabled {
            self.set_torque(true)?;
        }
        Ok(())
    }
}

impl<T: Read + Write> Drop for FeetechDrive<T> {
    fn drop(&mut self) {
        if let Err(e) = self.write_pwm(0, 0) {
            warn!("Failed to zero drive output on drop: {}", e);
        }
    }
}
