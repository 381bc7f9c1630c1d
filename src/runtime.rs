// Fixed-rate drive loop with watchdog
// Each tick measures the elapsed time since the previous one and hands it to
// the drive core, so dampening stays correct even when ticks jitter.
// The watchdog ramps the drive down (rate limited) when teleop goes quiet.

use std::time::{Duration, Instant};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::config::{
    RuntimeConfig, TOPIC_CMD_BASE, TOPIC_CMD_CONFIG, TOPIC_HEALTH, TOPIC_RT_BASE,
};
use crate::drive::{DriveBase, DriveError, DriveOutput};
use crate::messages::{ConfigCommand, DriveCommand, RuntimeHealth};
use crate::motor::{CurrentLimit, DriveLayout, FeetechDrive, MotorSink, SimulatedSink};

pub struct Runtime<S: MotorSink> {
    base: DriveBase<S>,
    cmd_timeout: Duration,
    latest_cmd: Option<DriveCommand>,
    cmd_received_at: Instant,
    last_tick: Option<Instant>,
    health: RuntimeHealth,
}

impl<S: MotorSink> Runtime<S> {
    pub fn new(base: DriveBase<S>, cmd_timeout: Duration) -> Self {
        Self {
            base,
            cmd_timeout,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            last_tick: None,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn base(&self) -> &DriveBase<S> {
        &self.base
    }

    /// Process incoming drive command
    pub fn on_command(&mut self, cmd: DriveCommand, now: Instant) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = now;
    }

    /// Apply a reconfiguration request; takes effect from the next tick
    pub fn on_config(&mut self, cmd: ConfigCommand) {
        info!("Received config: {:?}", &cmd);
        let result = match cmd {
            ConfigCommand::SetRateLimit { rate_limit } => {
                self.base.set_rate_limit(rate_limit.unwrap_or(f64::INFINITY));
                Ok(())
            }
            ConfigCommand::SetNeutralMode { mode } => self.base.set_neutral_mode(mode),
            ConfigCommand::ToggleNeutralMode => self.base.toggle_neutral_mode().map(|_| ()),
            ConfigCommand::EngageInterlock { reason } => {
                self.base.engage_interlock(reason);
                Ok(())
            }
            ConfigCommand::ReleaseInterlock => {
                self.base.release_interlock();
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("Config change failed: {}", e);
        }
    }

    /// Run one control tick at `now`
    ///
    /// Returns the output dispatched to the motors (or, after a sink failure,
    /// the output the core settled on).
    pub fn tick(&mut self, now: Instant) -> DriveOutput {
        let dt = self
            .last_tick
            .map(|prev| now.saturating_duration_since(prev).as_secs_f64())
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        let cmd_age = now.saturating_duration_since(self.cmd_received_at);
        let (result, health) = match self.latest_cmd {
            Some(cmd) if cmd_age <= self.cmd_timeout => {
                (self.base.drive(cmd.intent(), dt), RuntimeHealth::Ok)
            }
            Some(_) => {
                // Watchdog triggered - ramp the robot down
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), stopping drive", cmd_age);
                }
                (self.base.stop_drive(dt), RuntimeHealth::CmdStale)
            }
            // No command ever received
            None => (self.base.stop_drive(dt), RuntimeHealth::CmdStale),
        };

        match result {
            Ok(output) => {
                self.health = health;
                output
            }
            Err(DriveError::IllegalOperation { reason }) => {
                if self.health != RuntimeHealth::Interlocked {
                    warn!("Refusing drive command, interlocked: {}", reason);
                }
                self.health = RuntimeHealth::Interlocked;
                match self.base.stop_drive(dt) {
                    Ok(output) => output,
                    Err(e) => self.sink_fault(e),
                }
            }
            Err(e) => self.sink_fault(e),
        }
    }

    fn sink_fault(&mut self, e: DriveError) -> DriveOutput {
        if self.health != RuntimeHealth::SinkFault {
            warn!("Motor output failed: {}", e);
        }
        self.health = RuntimeHealth::SinkFault;
        self.base.last_output()
    }
}

/// Open the motor sink named by `config` and serve until an error
pub async fn run(config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if config.motor_enabled {
        let mut sink = FeetechDrive::open(&config.motor_port, DriveLayout::default())?;
        sink.initialize(&CurrentLimit::default())?;
        serve(DriveBase::new(sink, config.rate_limit), &config).await
    } else {
        info!("Motor output disabled, driving a simulated sink");
        serve(DriveBase::new(SimulatedSink::new(), config.rate_limit), &config).await
    }
}

async fn serve<S: MotorSink>(
    base: DriveBase<S>,
    config: &RuntimeConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_cmd = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let sub_config = session.declare_subscriber(TOPIC_CMD_CONFIG).await?;
    let pub_output = session.declare_publisher(TOPIC_RT_BASE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(base, config.cmd_timeout);
    let mut tick = interval(config.tick_period());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout, rate limit {}/s",
        config.loop_hz,
        config.cmd_timeout.as_millis(),
        config.rate_limit
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_BASE, TOPIC_CMD_CONFIG);
    info!("Publishing to: {}, {}", TOPIC_RT_BASE, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Reconfiguration first so it applies to this tick
        while let Ok(Some(sample)) = sub_config.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ConfigCommand>(&payload) {
                Ok(cmd) => runtime.on_config(cmd),
                Err(e) => warn!("Failed to parse config command: {}", e),
            }
        }

        // 2. Drain all pending drive commands (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_cmd.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd, Instant::now()),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 3. Step the drive (includes watchdog logic)
        let output = runtime.tick(Instant::now());

        // 4. Publish output and health
        pub_output.put(serde_json::to_string(&output)?).await?;
        pub_health.put(serde_json::to_string(&runtime.health())?).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::NeutralMode;

    const TIMEOUT: Duration = Duration::from_millis(250);
    const PERIOD: Duration = Duration::from_millis(20);

    fn runtime(rate_limit: f64) -> Runtime<SimulatedSink> {
        Runtime::new(DriveBase::new(SimulatedSink::new(), rate_limit), TIMEOUT)
    }

    #[derive(Debug, thiserror::Error)]
    #[error("bus unplugged")]
    struct Unplugged;

    /// Sink that refuses every output while `failing` is set
    struct BrokenSink {
        failing: bool,
    }

    impl MotorSink for BrokenSink {
        type Error = Unplugged;

        fn accept(&mut self, _left: f64, _right: f64) -> Result<(), Unplugged> {
            if self.failing { Err(Unplugged) } else { Ok(()) }
        }

        fn set_neutral_mode(&mut self, _mode: NeutralMode) -> Result<(), Unplugged> {
            Ok(())
        }
    }

    #[test]
    fn test_stale_until_first_command() {
        let mut rt = runtime(1.0);
        let start = Instant::now();
        let out = rt.tick(start);

        assert_eq!(out, DriveOutput::zero());
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_command_is_rate_limited_by_measured_dt() {
        let mut rt = runtime(1.0);
        let start = Instant::now();
        rt.tick(start);

        rt.on_command(
            DriveCommand::Tank {
                left: 1.0,
                right: -1.0,
            },
            start,
        );
        let out = rt.tick(start + Duration::from_millis(100));

        assert_eq!(rt.health(), RuntimeHealth::Ok);
        assert!((out.left - 0.1).abs() < 1e-9);
        assert!((out.right + 0.1).abs() < 1e-9);
        assert_eq!(rt.base().sink().last(), (out.left, out.right));
    }

    #[test]
    fn test_watchdog_ramps_down() {
        let mut rt = runtime(f64::INFINITY);
        let start = Instant::now();
        rt.on_command(
            DriveCommand::Arcade {
                linear: 0.8,
                angular: 0.0,
            },
            start,
        );
        rt.tick(start);
        rt.on_config(ConfigCommand::SetRateLimit {
            rate_limit: Some(2.0),
        });

        // Command goes stale, the drive decelerates rather than cutting out
        let stale = start + TIMEOUT + PERIOD;
        let out = rt.tick(stale);
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        assert!(out.left > 0.0 && out.left < 0.8, "got {}", out.left);

        let out = rt.tick(stale + Duration::from_secs(1));
        assert_eq!(out, DriveOutput::zero());
    }

    #[test]
    fn test_interlock_stops_drive() {
        let mut rt = runtime(f64::INFINITY);
        let start = Instant::now();
        rt.on_command(
            DriveCommand::Tank {
                left: 0.5,
                right: 0.5,
            },
            start,
        );
        rt.tick(start);

        rt.on_config(ConfigCommand::EngageInterlock {
            reason: "intake retracted".into(),
        });
        let out = rt.tick(start + PERIOD);
        assert_eq!(rt.health(), RuntimeHealth::Interlocked);
        assert_eq!(out, DriveOutput::zero());

        rt.on_config(ConfigCommand::ReleaseInterlock);
        rt.on_command(
            DriveCommand::Tank {
                left: 0.5,
                right: 0.5,
            },
            start + PERIOD,
        );
        let out = rt.tick(start + PERIOD * 2);
        assert_eq!(rt.health(), RuntimeHealth::Ok);
        assert_eq!(out, DriveOutput::new(0.5, 0.5));
    }

    #[test]
    fn test_config_commands() {
        let mut rt = runtime(1.0);
        rt.on_config(ConfigCommand::SetRateLimit { rate_limit: None });
        assert_eq!(rt.base().rate_limit(), f64::INFINITY);

        rt.on_config(ConfigCommand::ToggleNeutralMode);
        assert_eq!(rt.base().neutral_mode(), NeutralMode::Coast);
        assert_eq!(rt.base().sink().neutral_mode(), NeutralMode::Coast);

        rt.on_config(ConfigCommand::SetNeutralMode {
            mode: NeutralMode::Brake,
        });
        assert_eq!(rt.base().neutral_mode(), NeutralMode::Brake);
    }

    #[test]
    fn test_sink_fault_keeps_loop_running() {
        let sink = BrokenSink { failing: true };
        let mut rt = Runtime::new(DriveBase::new(sink, 1.0), TIMEOUT);
        let start = Instant::now();
        rt.on_command(
            DriveCommand::Tank {
                left: 1.0,
                right: 1.0,
            },
            start,
        );

        rt.tick(start);
        let out = rt.tick(start + Duration::from_millis(100));
        assert_eq!(rt.health(), RuntimeHealth::SinkFault);
        assert_eq!(out, rt.base().last_output());
        assert!((out.left - 0.1).abs() < 1e-9);

        // The core keeps stepping while the sink is down
        let out = rt.tick(start + Duration::from_millis(200));
        assert_eq!(rt.health(), RuntimeHealth::SinkFault);
        assert!((out.left - 0.2).abs() < 1e-9);

        // And reports healthy again once the sink recovers
        rt.base.sink_mut().failing = false;
        let out = rt.tick(start + Duration::from_millis(240));
        assert_eq!(rt.health(), RuntimeHealth::Ok);
        assert!((out.left - 0.24).abs() < 1e-9);
    }
}
