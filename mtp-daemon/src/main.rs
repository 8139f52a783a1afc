//! The MTP daemon: owns the shared socket table, services socket-creation/bind requests on the
//! control loop, and runs the Sender, Receiver, and Reaper workers (§4.4-§4.7).

mod config;
mod control;
mod reaper;
mod receiver;
mod sender;
mod sockets;
#[cfg(test)]
mod tests;

use std::process;
use std::sync::Arc;
use std::thread;

use config::Config;
use runtime::signal::Shutdown;
use runtime::Logger;
use sockets::SocketRegistry;

fn main() {
	Logger::from_env().install();

	let config = Config::from_env();
	log::info!(
		"starting MTP daemon: namespace={} tick={:?} gc_interval={:?} loss_probability={}",
		config.namespace,
		config.tick,
		config.gc_interval,
		config.loss_probability
	);

	let region = match mtp_ipc::Region::create(&config.namespace) {
		Ok(region) => Arc::new(region),
		Err(()) => {
			log::error!("failed to create shared MTP region, exiting");
			process::exit(1);
		}
	};

	let sockets = Arc::new(SocketRegistry::new());
	let shutdown = Shutdown::install();

	let control_handle = {
		let region = Arc::clone(&region);
		let sockets = Arc::clone(&sockets);
		let shutdown = shutdown.clone();
		thread::Builder::new().name("control".to_owned()).spawn(move || control::run(&region, &sockets, &shutdown)).expect("failed to spawn control loop thread")
	};

	let sender_handle = {
		let region = Arc::clone(&region);
		let sockets = Arc::clone(&sockets);
		let config = config.clone();
		let shutdown = shutdown.clone();
		thread::Builder::new().name("sender".to_owned()).spawn(move || sender::run(&region, &sockets, &config, &shutdown)).expect("failed to spawn sender thread")
	};

	let receiver_handle = {
		let region = Arc::clone(&region);
		let sockets = Arc::clone(&sockets);
		let config = config.clone();
		let shutdown = shutdown.clone();
		thread::Builder::new()
			.name("receiver".to_owned())
			.spawn(move || receiver::run(&region, &sockets, &config, &shutdown))
			.expect("failed to spawn receiver thread")
	};

	let reaper_handle = {
		let region = Arc::clone(&region);
		let sockets = Arc::clone(&sockets);
		let config = config.clone();
		let shutdown = shutdown.clone();
		thread::Builder::new().name("reaper".to_owned()).spawn(move || reaper::run(&region, &sockets, &config, &shutdown)).expect("failed to spawn reaper thread")
	};

	for handle in [sender_handle, receiver_handle, reaper_handle] {
		let _ = handle.join();
	}

	// The control loop blocks on the rendezvous semaphore with no timeout (§4.4 gives it none); it
	// is left running and torn down by process exit below rather than joined.
	drop(control_handle);

	log::info!("shutting down, tearing down shared MTP region");
	region.teardown();
}
