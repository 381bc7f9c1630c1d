// Motor output for the differential drive
//
// Provides:
// - The MotorSink capability the drive dispatches to
// - Feetech STS serial protocol implementation
// - Two-servos-per-side hardware sink with current limiting

mod drive;
pub mod feetech;
mod sink;

pub use drive::{CurrentLimit, DriveLayout, FeetechDrive};
pub use feetech::{FeetechBus, FeetechError};
pub use sink::{MotorSink, NeutralMode, SimulatedSink};
