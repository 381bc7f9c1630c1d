// Drive subsystem
//
// Boundary between the host loop and the numeric core: owns the dampened
// drive, the motor sink, the neutral mode and an optional mechanical
// interlock. The interlock check lives here so the core itself never fails.

use std::sync::Arc;
use tracing::{info, warn};

use super::controller::{DampenedDrive, DriveOutput};
use super::kinematics::DriveIntent;
use crate::motor::{MotorSink, NeutralMode};

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    /// Nonzero output requested while an interlock forbids motion
    #[error("Illegal operation: drive is interlocked ({reason})")]
    IllegalOperation { reason: Arc<str> },

    #[error("Motor sink error: {0}")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),
}

fn sink_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> DriveError {
    DriveError::Sink(Box::new(e))
}

/// Drive train: rate-limited controller wired to a motor sink
pub struct DriveBase<S: MotorSink> {
    drive: DampenedDrive,
    sink: S,
    neutral_mode: NeutralMode,
    interlock: Option<Arc<str>>,
}

impl<S: MotorSink> DriveBase<S> {
    pub fn new(sink: S, rate_limit: f64) -> Self {
        info!("Drive base created, rate limit {}/s", rate_limit);
        Self {
            drive: DampenedDrive::new(rate_limit),
            sink,
            neutral_mode: NeutralMode::Brake,
            interlock: None,
        }
    }

    /// Run one tick of `intent` and dispatch the limited output
    ///
    /// Refused with `IllegalOperation` (and nothing dispatched) when an
    /// interlock is engaged and the intent is not neutral.
    pub fn drive(&mut self, intent: DriveIntent, dt: f64) -> Result<DriveOutput, DriveError> {
        if let Some(reason) = &self.interlock {
            if !intent.is_neutral() {
                return Err(DriveError::IllegalOperation {
                    reason: Arc::clone(reason),
                });
            }
        }

        let output = self.drive.drive(intent, dt);
        self.sink
            .accept(output.left, output.right)
            .map_err(sink_error)?;
        Ok(output)
    }

    pub fn arcade_drive(
        &mut self,
        linear: f64,
        angular: f64,
        dt: f64,
    ) -> Result<DriveOutput, DriveError> {
        self.drive(DriveIntent::Arcade { linear, angular }, dt)
    }

    pub fn tank_drive(
        &mut self,
        left: f64,
        right: f64,
        dt: f64,
    ) -> Result<DriveOutput, DriveError> {
        self.drive(DriveIntent::Tank { left, right }, dt)
    }

    /// Decelerate towards zero; always allowed, even when interlocked
    pub fn stop_drive(&mut self, dt: f64) -> Result<DriveOutput, DriveError> {
        self.tank_drive(0.0, 0.0, dt)
    }

    pub fn set_rate_limit(&mut self, rate_limit: f64) {
        info!("Drive rate limit set to {}/s", rate_limit);
        self.drive.set_rate_limit(rate_limit);
    }

    pub fn rate_limit(&self) -> f64 {
        self.drive.rate_limit()
    }

    pub fn last_output(&self) -> DriveOutput {
        self.drive.last_output()
    }

    pub fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result<(), DriveError> {
        self.sink.set_neutral_mode(mode).map_err(sink_error)?;
        self.neutral_mode = mode;
        Ok(())
    }

    /// Brake -> Coast, Coast -> Brake. Returns the new mode.
    pub fn toggle_neutral_mode(&mut self) -> Result<NeutralMode, DriveError> {
        let mode = self.neutral_mode.toggled();
        self.set_neutral_mode(mode)?;
        Ok(mode)
    }

    pub fn neutral_mode(&self) -> NeutralMode {
        self.neutral_mode
    }

    pub fn engage_interlock(&mut self, reason: impl Into<Arc<str>>) {
        let reason: Arc<str> = reason.into();
        warn!("Drive interlock engaged: {}", reason);
        self.interlock = Some(reason);
    }

    pub fn release_interlock(&mut self) {
        if self.interlock.take().is_some() {
            info!("Drive interlock released");
        }
    }

    pub fn interlock(&self) -> Option<&str> {
        self.interlock.as_deref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
