// Rate-limited differential drive
//
// Provides:
// - Arcade/tank kinematics (intent -> raw per-side output)
// - Per-side slew-rate limiting
// - The drive controller composing both, and the drive subsystem that
//   dispatches its output to a motor sink

mod controller;
pub mod kinematics;
pub mod slew;
mod subsystem;

pub use controller::{DampenedDrive, DriveOutput};
pub use kinematics::{DriveIntent, from_arcade, from_tank};
pub use slew::SlewRateLimiter;
pub use subsystem::{DriveBase, DriveError};
