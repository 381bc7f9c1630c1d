// Motor output sink
//
// The drive core only produces numbers; a sink turns a (left, right) pair into
// whatever the hardware needs. Keeps the core free of any motor-driver type.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// What the motors do when commanded to zero output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeutralMode {
    /// Actively hold the wheels
    #[default]
    Brake,
    /// Let the wheels spin freely
    Coast,
}

impl NeutralMode {
    /// Brake -> Coast, Coast -> Brake
    pub fn toggled(self) -> Self {
        match self {
            NeutralMode::Brake => NeutralMode::Coast,
            NeutralMode::Coast => NeutralMode::Brake,
        }
    }
}

/// Anything that can take a per-side output pair
pub trait MotorSink {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Dispatch one tick of output, each side in [-1, 1]
    fn accept(&mut self, left: f64, right: f64) -> Result<(), Self::Error>;

    /// Change the neutral behaviour of every motor behind this sink
    fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result<(), Self::Error>;
}

/// Sink used when hardware is disabled: remembers what it was told
#[derive(Debug, Clone, Default)]
pub struct SimulatedSink {
    last: (f64, f64),
    neutral_mode: NeutralMode,
    accepted: u64,
}

impl SimulatedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted (left, right)
    pub fn last(&self) -> (f64, f64) {
        self.last
    }

    pub fn neutral_mode(&self) -> NeutralMode {
        self.neutral_mode
    }

    /// Number of outputs accepted so far
    pub fn accepted(&self) -> u64 {
        self.accepted
    }
}

impl MotorSink for SimulatedSink {
    type Error = std::convert::Infallible;

    fn accept(&mut self, left: f64, right: f64) -> Result<(), Self::Error> {
        debug!("Simulated output: left={:.3}, right={:.3}", left, right);
        self.last = (left, right);
        self.accepted += 1;
        Ok(())
    }

    fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result<(), Self::Error> {
        debug!("Simulated neutral mode: {:?}", mode);
        self.neutral_mode = mode;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_neutral_mode() {
        assert_eq!(NeutralMode::Brake.toggled(), NeutralMode::Coast);
        assert_eq!(NeutralMode::Coast.toggled(), NeutralMode::Brake);
        assert_eq!(NeutralMode::default(), NeutralMode::Brake);
    }

    #[test]
    fn test_simulated_sink_records() {
        let mut sink = SimulatedSink::new();
        sink.accept(0.25, -0.5).unwrap();
        sink.set_neutral_mode(NeutralMode::Coast).unwrap();

        assert_eq!(sink.last(), (0.25, -0.5));
        assert_eq!(sink.accepted(), 1);
        assert_eq!(sink.neutral_mode(), NeutralMode::Coast);
    }

    #[test]
    fn test_neutral_mode_json() {
        let json = serde_json::to_string(&NeutralMode::Coast).unwrap();
        assert_eq!(json, "\"coast\"");
    }
}
