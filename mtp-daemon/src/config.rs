use std::env;
use std::time::Duration;

use mtp_shared::{DEFAULT_LOSS_PROBABILITY, DEFAULT_NAMESPACE, GARBAGE_COLLECTOR_INTERVAL_SECONDS, T_SECONDS};

/// Host-local tuning knobs, read once at startup. Everything that must agree byte-for-byte between
/// peers (buffer widths, the wire header layout) stays a compile-time constant in `mtp-shared`;
/// only timing and test-loss-injection are runtime-configurable.
#[derive(Clone)]
pub struct Config {
	pub namespace: String,
	pub tick: Duration,
	pub gc_interval: Duration,
	pub loss_probability: f64,
}

impl Config {
	pub fn from_env() -> Self {
		Self {
			namespace: env::var("MTP_NAMESPACE").unwrap_or_else(|_| DEFAULT_NAMESPACE.to_owned()),
			tick: Duration::from_secs(env_u64("MTP_TICK_SECONDS", T_SECONDS)),
			gc_interval: Duration::from_secs(env_u64("MTP_GC_INTERVAL_SECONDS", GARBAGE_COLLECTOR_INTERVAL_SECONDS)),
			loss_probability: env_f64("MTP_LOSS_PROBABILITY", DEFAULT_LOSS_PROBABILITY),
		}
	}
}

fn env_u64(name: &str, default: u64) -> u64 {
	env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
	env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
