use std::env;
use std::str::FromStr;
use std::time::SystemTime;

use log::{Level, LevelFilter};
use nu_ansi_term::ansi::RESET;
use nu_ansi_term::{Color, Style};

pub struct Logger {
	max_level: LevelFilter,
}

impl Logger {
	/// Build a logger reading its level from the `MTP_LOG` environment variable
	/// (`trace`/`debug`/`info`/`warn`/`error`), defaulting to `info` if unset or unparsable.
	pub fn from_env() -> Self {
		let max_level = env::var("MTP_LOG").ok().and_then(|v| LevelFilter::from_str(&v).ok()).unwrap_or(LevelFilter::Info);

		Self { max_level }
	}

	/// Install this logger as the global `log` backend.
	pub fn install(self) {
		let max_level = self.max_level;
		log::set_boxed_logger(Box::new(self)).expect("logger already installed");
		log::set_max_level(max_level);
	}
}

impl log::Log for Logger {
	fn enabled(&self, metadata: &log::Metadata) -> bool {
		metadata.level() <= self.max_level
	}

	fn log(&self, record: &log::Record) {
		let time = humantime::format_rfc3339_nanos(SystemTime::now());

		let dim = Style::new().dimmed().prefix();

		eprintln!(
			"{dim}{time}{RESET} {}{:5}{RESET} {}{}{RESET}{dim}:{RESET} {}",
			match record.level() {
				Level::Trace => Color::Purple,
				Level::Debug => Color::Blue,
				Level::Info => Color::Green,
				Level::Warn => Color::Yellow,
				Level::Error => Color::Red,
			}
			.bold()
			.prefix(),
			record.level(),
			Style::new().bold().prefix(),
			record.target(),
			record.args()
		);
	}

	fn flush(&self) {}
}
