// Keyboard teleop: W/S drive, A/D turn, R/F speed, B brake/coast, Space stop, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use diffdrive_zenoh_runtime::config::{TOPIC_CMD_BASE, TOPIC_CMD_CONFIG};
use diffdrive_zenoh_runtime::messages::{ConfigCommand, DriveCommand};
use std::time::{Duration, Instant};
use tracing::info;

const SPEEDS: [f64; 3] = [0.25, 0.5, 1.0]; // output fraction
const TURN_SPEEDS: [f64; 3] = [0.2, 0.4, 0.7]; // output fraction
const INPUT_TIMEOUT_MS: u64 = 100; // Reset to zero after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_cmd = session.declare_publisher(TOPIC_CMD_BASE).await?;
    let pub_config = session.declare_publisher(TOPIC_CMD_CONFIG).await?;

    info!("Controls: W/S=drive, A/D=turn, R/F=speed, B=brake/coast, Space=stop, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_cmd, &pub_config).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    pub_cmd: &zenoh::pubsub::Publisher<'_>,
    pub_config: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent arcade state
    let mut linear = 0.0;
    let mut angular = 0.0;
    let mut last_movement_input = Instant::now();
    let mut stop_requested = false;

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        linear = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        linear = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    // Positive angular turns right
                    KeyCode::Char('a') if pressed => {
                        angular = -TURN_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        angular = TURN_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char(' ') if pressed => {
                        linear = 0.0;
                        angular = 0.0;
                        stop_requested = true;
                    }

                    KeyCode::Char('b') if pressed => {
                        let toggle = serde_json::to_string(&ConfigCommand::ToggleNeutralMode)?;
                        pub_config.put(toggle).await?;
                        info!("Toggled neutral mode");
                    }

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            linear = 0.0;
            angular = 0.0;
        }

        // Always publish at ~50Hz
        let cmd = if stop_requested {
            stop_requested = false;
            DriveCommand::Stop
        } else {
            DriveCommand::Arcade { linear, angular }
        };
        pub_cmd.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
