use clap::{value_parser, Arg, ArgMatches, Command};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dirmirror::config::Config;
use dirmirror::dispatcher::SyncDispatcher;
use dirmirror::error::SyncError;
use dirmirror::logging::*;
use dirmirror::{serve, validation, watch};

///////////////////////
// Utility functions //
///////////////////////

/// Defaults < config file < environment < command line
fn load_config(matches: &ArgMatches) -> Result<Config, SyncError> {
	let mut config = Config::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

	if let Some(host) = matches.get_one::<String>("host") {
		config.host = host.clone();
	}
	if let Some(port) = matches.get_one::<u16>("port") {
		config.port = *port;
	}
	if let Some(block_size) = matches.get_one::<usize>("block-size") {
		config.block_size = *block_size;
	}

	config.validate()?;
	Ok(config)
}

fn directory_arg(matches: &ArgMatches) -> Result<PathBuf, SyncError> {
	let dir = matches.get_one::<PathBuf>("dir").ok_or_else(|| SyncError::InvalidDirectory {
		path: String::new(),
		message: "directory argument required".to_string(),
	})?;
	validation::validate_directory(dir).map_err(|e| SyncError::InvalidDirectory {
		path: dir.display().to_string(),
		message: e.to_string(),
	})?;
	Ok(dir.clone())
}

fn install_interrupt_handler() -> Result<Arc<AtomicBool>, Box<dyn Error>> {
	let shutdown = Arc::new(AtomicBool::new(false));
	let flag = Arc::clone(&shutdown);
	ctrlc::set_handler(move || {
		flag.store(true, Ordering::SeqCst);
	})?;
	Ok(shutdown)
}

fn run_watch(dir: &Path, config: &Config, shutdown: Arc<AtomicBool>) -> Result<(), SyncError> {
	let dispatcher = SyncDispatcher::new(dir, config, Arc::clone(&shutdown))?;

	let report = dispatcher.enumerate_and_reconcile()?;
	if !report.failed.is_empty() {
		warn!("Initial sync left {} file(s) unsynced: {:?}", report.failed.len(), report.failed);
	}

	watch::run(&dispatcher, config.poll_timeout(), &shutdown)
}

fn main() -> Result<(), Box<dyn Error>> {
	let dir_arg = || Arg::new("dir").required(true).value_parser(value_parser!(PathBuf));

	let matches = Command::new("dirmirror")
		.version(env!("CARGO_PKG_VERSION"))
		.author("Szilard Hajba <szilard@symbion.hu>")
		.about("One-way directory mirror over TCP")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.value_parser(value_parser!(PathBuf))
				.global(true)
				.help("TOML configuration file"),
		)
		.arg(Arg::new("host").long("host").value_name("HOST").global(true).help("Server host"))
		.arg(
			Arg::new("port")
				.short('p')
				.long("port")
				.value_name("PORT")
				.value_parser(value_parser!(u16))
				.global(true)
				.help("Server port"),
		)
		.arg(
			Arg::new("block-size")
				.short('b')
				.long("block-size")
				.value_name("BYTES")
				.value_parser(value_parser!(usize))
				.global(true)
				.help("Block size for hashing and diffs"),
		)
		.subcommand(Command::new("serve").about("Receive changes into a directory").arg(dir_arg()))
		.subcommand(Command::new("watch").about("Mirror a directory to the server").arg(dir_arg()))
		.get_matches();

	let config = load_config(&matches)?;
	init_tracing(&config.log_level);
	let shutdown = install_interrupt_handler()?;

	if let Some(sub_matches) = matches.subcommand_matches("serve") {
		let dir = directory_arg(sub_matches)?;
		serve::serve(&dir, &config, &shutdown)?;
	} else if let Some(sub_matches) = matches.subcommand_matches("watch") {
		let dir = directory_arg(sub_matches)?;
		run_watch(&dir, &config, shutdown)?;
	}

	Ok(())
}

// vim: ts=4
