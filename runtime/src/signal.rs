use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::error;

/// A flag flipped by a Ctrl+C / SIGINT handler, shared across the daemon's worker threads so each
/// can notice a shutdown request at its own next wakeup instead of being torn down mid-operation.
#[derive(Clone)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
	/// Install the signal handler. Must be called at most once per process.
	pub fn install() -> Self {
		let flag = Arc::new(AtomicBool::new(false));

		let handler_flag = flag.clone();
		if let Err(err) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed)) {
			error!("Error occurred while setting Ctrl+C handler: {err}");
		}

		Self(flag)
	}

	/// Returns whether shutdown has been requested.
	pub fn requested(&self) -> bool {
		self.0.load(Ordering::Relaxed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fresh_flag_is_not_requested() {
		let flag = Arc::new(AtomicBool::new(false));
		assert!(!Shutdown(flag).requested());
	}
}
