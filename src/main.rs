//! # Tide Predictor Command Line
//!
//! ```text
//! tide-predictor predict [INSTANT...]   heights in meters (default: now)
//! tide-predictor curve [INSTANT]        ASCII chart of ±12 h around INSTANT
//! tide-predictor rebuild                refit from fresh observations
//! ```
//!
//! Instants are RFC 3339; instants without an offset are read as UTC.
//! Set `RUST_LOG` to change log verbosity (default `info`).

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use std::env;
use std::sync::Arc;
use tide_predictor::config::Config;
use tide_predictor::lifecycle::TideService;
use tide_predictor::renderer::render_ascii;
use tide_predictor::tide_data::parse_instant;
use tracing_subscriber::EnvFilter;

const CURVE_HALF_WINDOW_HOURS: i64 = 12;
const CURVE_STEP_MINUTES: i64 = 10;

enum Command {
    Predict(Vec<DateTime<Utc>>),
    Curve(DateTime<Utc>),
    Rebuild,
}

fn parse_instants(args: &[String]) -> anyhow::Result<Vec<DateTime<Utc>>> {
    args.iter()
        .map(|s| parse_instant(s).ok_or_else(|| anyhow!("not a valid instant: {s}")))
        .collect()
}

fn parse_command(args: &[String]) -> anyhow::Result<Command> {
    match args.split_first() {
        None => Ok(Command::Predict(vec![Utc::now()])),
        Some((cmd, rest)) => match cmd.as_str() {
            "predict" if rest.is_empty() => Ok(Command::Predict(vec![Utc::now()])),
            "predict" => Ok(Command::Predict(parse_instants(rest)?)),
            "curve" => match rest {
                [] => Ok(Command::Curve(Utc::now())),
                [at] => Ok(Command::Curve(
                    parse_instant(at).ok_or_else(|| anyhow!("not a valid instant: {at}"))?,
                )),
                _ => bail!("curve takes at most one instant"),
            },
            "rebuild" => Ok(Command::Rebuild),
            other => bail!("unknown command '{other}' (expected predict, curve or rebuild)"),
        },
    }
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = parse_command(&args)?;

    let config = Config::load();
    // The blocking HTTP client must be built outside the async runtime
    let service = Arc::new(TideService::from_config(&config).context("building tide service")?);

    let rt = tokio::runtime::Runtime::new()?;
    // `service` is dropped after the runtime, outside any async context
    rt.block_on(run(command, Arc::clone(&service)))
}

async fn run(command: Command, service: Arc<TideService>) -> anyhow::Result<()> {
    match command {
        Command::Predict(times) => {
            let heights = {
                let times = times.clone();
                tokio::task::spawn_blocking(move || service.predict_tides(&times)).await??
            };
            for (t, h) in times.iter().zip(heights) {
                println!("{}  {h:.2} m", t.format("%Y-%m-%d %H:%M UTC"));
            }
        }
        Command::Curve(center) => {
            let curve = tokio::task::spawn_blocking(move || {
                service.curve(&center, CURVE_HALF_WINDOW_HOURS, CURVE_STEP_MINUTES)
            })
            .await??;
            print!("{}", render_ascii(&curve));
        }
        Command::Rebuild => {
            let rebuilt = tokio::task::spawn_blocking(move || service.rebuild_model()).await?;
            if !rebuilt {
                bail!("model rebuild failed; previous model kept");
            }
            println!("model rebuilt");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_command() {
        assert!(matches!(parse_command(&[]), Ok(Command::Predict(t)) if t.len() == 1));
        assert!(matches!(
            parse_command(&args(&["predict", "2025-05-01T00:00:00Z", "2025-05-01 06:00:00"])),
            Ok(Command::Predict(t)) if t.len() == 2
        ));
        assert!(matches!(parse_command(&args(&["rebuild"])), Ok(Command::Rebuild)));
        assert!(matches!(
            parse_command(&args(&["curve", "2025-05-01T12:00:00+01:00"])),
            Ok(Command::Curve(_))
        ));
    }

    #[test]
    fn test_parse_command_errors() {
        assert!(parse_command(&args(&["predict", "yesterday"])).is_err());
        assert!(parse_command(&args(&["curve", "a", "b"])).is_err());
        assert!(parse_command(&args(&["draw"])).is_err());
    }
}
