use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Seeded sql-pool stress simulator")]
pub(crate) struct Args {
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) duration: Option<Duration>,
    #[arg(long)]
    pub(crate) iterations: Option<u64>,
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    #[arg(long, default_value_t = 4)]
    pub(crate) pool_size: usize,
    #[arg(long, default_value_t = 2)]
    pub(crate) min_size: usize,
    #[arg(long, default_value_t = 8)]
    pub(crate) tasks: usize,
    /// Chance a borrower finds its connection broken before returning it.
    #[arg(long, default_value_t = 0.03)]
    pub(crate) invalidate_rate: f64,
    /// Chance a borrower closes its connection itself before returning it.
    #[arg(long, default_value_t = 0.01)]
    pub(crate) close_rate: f64,
    /// Chance a borrower drops its connection without returning it.
    #[arg(long, default_value_t = 0.02)]
    pub(crate) abandon_rate: f64,
    /// Chance per step that the database goes away for a while.
    #[arg(long, default_value_t = 0.002)]
    pub(crate) outage_rate: f64,
    #[arg(long, default_value_t = 0.01)]
    pub(crate) refresh_rate: f64,
    #[arg(long, default_value_t = 0.05)]
    pub(crate) sleep_rate: f64,
    /// How long a step waits for a connection before giving up.
    #[arg(long, default_value_t = 2)]
    pub(crate) acquire_timeout_ms: u64,
    #[arg(long)]
    pub(crate) log: Option<PathBuf>,
    #[arg(long)]
    pub(crate) quick: bool,
    #[arg(long)]
    pub(crate) stress: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimConfig {
    pub(crate) duration_ms: Option<u64>,
    pub(crate) iterations: Option<u64>,
    pub(crate) seed: u64,
    pub(crate) pool_size: usize,
    pub(crate) min_size: usize,
    pub(crate) tasks: usize,
    pub(crate) invalidate_rate: f64,
    pub(crate) close_rate: f64,
    pub(crate) abandon_rate: f64,
    pub(crate) outage_rate: f64,
    pub(crate) refresh_rate: f64,
    pub(crate) sleep_rate: f64,
    pub(crate) acquire_timeout_ms: u64,
    pub(crate) log: Option<PathBuf>,
    pub(crate) preset: Option<String>,
    pub(crate) first_steps: usize,
    pub(crate) tail_steps: usize,
}

impl SimConfig {
    pub(crate) fn from_args(args: Args) -> Self {
        let pool_size = args.pool_size.max(1);
        let mut config = SimConfig {
            duration_ms: args
                .duration
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            iterations: args.iterations,
            seed: args.seed.unwrap_or_else(random_seed),
            pool_size,
            min_size: args.min_size.min(pool_size),
            tasks: args.tasks.max(1),
            invalidate_rate: clamp_rate(args.invalidate_rate),
            close_rate: clamp_rate(args.close_rate),
            abandon_rate: clamp_rate(args.abandon_rate),
            outage_rate: clamp_rate(args.outage_rate),
            refresh_rate: clamp_rate(args.refresh_rate),
            sleep_rate: clamp_rate(args.sleep_rate),
            acquire_timeout_ms: args.acquire_timeout_ms.max(1),
            log: args.log,
            preset: None,
            first_steps: 30,
            tail_steps: 80,
        };

        if args.iterations.is_none() && args.duration.is_none() {
            config.iterations = Some(5_000);
        }
        if args.quick {
            config.apply_quick();
        }
        if args.stress {
            config.apply_stress();
        }

        config
    }

    fn apply_quick(&mut self) {
        self.preset = Some("quick".to_string());
        self.iterations = Some(2_000);
        self.duration_ms = None;
        self.pool_size = 2;
        self.min_size = 1;
        self.tasks = 4;
        self.invalidate_rate = 0.05;
        self.close_rate = 0.02;
        self.abandon_rate = 0.02;
        self.outage_rate = 0.005;
        self.refresh_rate = 0.02;
        self.sleep_rate = 0.05;
    }

    fn apply_stress(&mut self) {
        self.preset = Some("stress".to_string());
        self.iterations = Some(100_000);
        self.duration_ms = None;
        self.pool_size = 16;
        self.min_size = 8;
        self.tasks = 64;
        self.invalidate_rate = 0.05;
        self.close_rate = 0.02;
        self.abandon_rate = 0.03;
        self.outage_rate = 0.001;
        self.refresh_rate = 0.01;
        self.sleep_rate = 0.08;
    }
}

fn clamp_rate(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

fn random_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    now.as_secs() ^ u64::from(now.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_rate_limits_bounds() {
        assert_eq!(clamp_rate(-1.0), 0.0);
        assert_eq!(clamp_rate(2.0), 1.0);
        assert_eq!(clamp_rate(0.5), 0.5);
        assert_eq!(clamp_rate(f64::NAN), 0.0);
    }

    #[test]
    fn min_size_never_exceeds_pool_size() {
        let args = Args::parse_from(["simulator", "--pool-size", "3", "--min-size", "9"]);
        let config = SimConfig::from_args(args);
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.min_size, 3);
        assert_eq!(config.iterations, Some(5_000));
    }
}
