use clap::Parser;
use tracing_subscriber::EnvFilter;

use diffdrive_zenoh_runtime::config::RuntimeConfig;

/// Rate-limited differential drive runtime
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Serial port of the servo bus
    #[arg(long)]
    port: Option<String>,

    /// Max change of output fraction per second on each side
    #[arg(long, conflicts_with = "unbounded", value_parser = parse_rate_limit)]
    rate_limit: Option<f64>,

    /// Disable dampening entirely
    #[arg(long)]
    unbounded: bool,

    /// Drive a simulated sink instead of the servos
    #[arg(long)]
    simulate: bool,
}

/// Rate limits must be positive; use --unbounded to turn dampening off
fn parse_rate_limit(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse::<f64>().map_err(|e| e.to_string())?;
    if rate > 0.0 {
        Ok(rate)
    } else {
        Err(format!("rate limit must be greater than 0, got {}", s))
    }
}

impl Args {
    fn into_config(self) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        if let Some(port) = self.port {
            config.motor_port = port;
        }
        if let Some(rate_limit) = self.rate_limit {
            config.rate_limit = rate_limit;
        }
        if self.unbounded {
            config.rate_limit = f64::INFINITY;
        }
        if self.simulate {
            config.motor_enabled = false;
        }
        config
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let config = Args::parse().into_config();

    if let Err(e) = diffdrive_zenoh_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
