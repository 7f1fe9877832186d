use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::path::Path;

use lansync::logging::*;
use lansync::{hasher, Config, Framing, PeerSession, Server};

///////////////////////
// Utility functions //
///////////////////////

fn config_args(command: Command) -> Command {
	command
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.help("Config file (.toml, .json or .json5)"),
		)
		.arg(
			Arg::new("port")
				.short('p')
				.long("port")
				.value_name("PORT")
				.value_parser(value_parser!(u16))
				.help("TCP port of the host"),
		)
		.arg(
			Arg::new("dir")
				.short('d')
				.long("dir")
				.value_name("DIR")
				.help("Directory holding the synchronized files"),
		)
		.arg(
			Arg::new("framing")
				.long("framing")
				.value_name("MODE")
				.help("Command framing: compat or length-prefixed"),
		)
}

/// Defaults, config file and environment, then the command line flags
fn load_config(matches: &ArgMatches) -> Result<Config, Box<dyn Error>> {
	let mut config = Config::load(matches.get_one::<String>("config").map(Path::new))?;

	if let Some(port) = matches.get_one::<u16>("port") {
		config.port = *port;
	}
	if let Some(dir) = matches.get_one::<String>("dir") {
		config.data_dir = dir.into();
	}
	if let Some(framing) = matches.get_one::<String>("framing") {
		config.framing = framing.parse::<Framing>()?;
	}
	config.validate()?;
	Ok(config)
}

async fn serve(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
	let mut config = load_config(matches)?;
	if let Some(bind) = matches.get_one::<String>("bind") {
		config.address = Some(bind.clone());
	}
	if let Some(backlog) = matches.get_one::<u32>("backlog") {
		config.max_backlog = *backlog;
	}

	let mut server = Server::bind(&config)?;
	server.start(config.max_backlog).await?;
	info!("Serving {} (Ctrl-C to stop)", config.data_dir.display());

	shutdown_signal().await?;
	server.stop().await;
	Ok(())
}

/// Wait for SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() -> Result<(), Box<dyn Error>> {
	use tokio::signal::unix::{signal, SignalKind};

	let mut sigterm = signal(SignalKind::terminate())?;
	let mut sigint = signal(SignalKind::interrupt())?;
	tokio::select! {
		_ = sigterm.recv() => debug!("Received SIGTERM, shutting down"),
		_ = sigint.recv() => debug!("Received SIGINT, shutting down"),
	}
	Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<(), Box<dyn Error>> {
	tokio::signal::ctrl_c().await?;
	debug!("Interrupted, shutting down");
	Ok(())
}

async fn sync(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
	let mut config = load_config(matches)?;
	let host = matches.get_one::<String>("host").ok_or("sync: host argument required")?;
	config.address = Some(host.clone());

	let files: Vec<&str> = matches
		.get_many::<String>("file")
		.ok_or("sync: at least one file argument required")?
		.map(|s| s.as_str())
		.collect();

	let mut session = PeerSession::new(&config)?;
	if !session.connect().await {
		return Err(format!("cannot connect to {}", session.host_address()).into());
	}

	let mut failed = 0;
	for file in &files {
		if !session.sync_file(file).await {
			failed += 1;
		}
	}
	session.disconnect().await;

	if failed > 0 {
		return Err(format!("{} of {} files failed to sync", failed, files.len()).into());
	}
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	init_tracing();

	let matches = Command::new("lansync")
		.version(env!("CARGO_PKG_VERSION"))
		.author("Szilard Hajba <szilard@symbion.hu>")
		.about("Keep files in sync between a LAN host and its peers")
		.subcommand_required(true)
		.subcommand(config_args(
			Command::new("serve")
				.about("Run the sync host")
				.arg(
					Arg::new("bind")
						.short('b')
						.long("bind")
						.value_name("IP")
						.help("Address to bind (default: discovered LAN address)"),
				)
				.arg(
					Arg::new("backlog")
						.long("backlog")
						.value_name("N")
						.value_parser(value_parser!(u32))
						.help("Listen backlog"),
				),
		))
		.subcommand(config_args(
			Command::new("sync")
				.about("Sync files with a host")
				.arg(Arg::new("host").required(true).help("Host IP address"))
				.arg(Arg::new("file").required(true).action(ArgAction::Append).num_args(1..)),
		))
		.subcommand(
			Command::new("hash")
				.about("Print the content hash of a file")
				.arg(Arg::new("file").required(true)),
		)
		.get_matches();

	if let Some(matches) = matches.subcommand_matches("serve") {
		serve(matches).await?;
	} else if let Some(matches) = matches.subcommand_matches("sync") {
		sync(matches).await?;
	} else if let Some(matches) = matches.subcommand_matches("hash") {
		let file = matches.get_one::<String>("file").ok_or("hash: file argument required")?;
		let hash = hasher::hash_file(Path::new(file)).await?;
		println!("{}  {}", hash, file);
	}

	Ok(())
}

// vim: ts=4
