// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::drive::DriveIntent;
use crate::motor::NeutralMode;

// Command from teleop/scripts -> runtime
// Tagged by "mode": {"mode":"arcade","linear":0.5,"angular":0.0}
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DriveCommand {
    Arcade { linear: f64, angular: f64 },
    Tank { left: f64, right: f64 },
    Stop,
}

impl DriveCommand {
    /// Intent for the drive core, `Stop` is a zero tank command
    pub fn intent(&self) -> DriveIntent {
        match *self {
            DriveCommand::Arcade { linear, angular } => DriveIntent::Arcade { linear, angular },
            DriveCommand::Tank { left, right } => DriveIntent::Tank { left, right },
            DriveCommand::Stop => DriveIntent::Tank {
                left: 0.0,
                right: 0.0,
            },
        }
    }
}

// Reconfiguration requests, processed between ticks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ConfigCommand {
    /// `null` removes the limit
    SetRateLimit { rate_limit: Option<f64> },
    SetNeutralMode { mode: NeutralMode },
    ToggleNeutralMode,
    EngageInterlock { reason: String },
    ReleaseInterlock,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Interlocked,
    SinkFault,
}
