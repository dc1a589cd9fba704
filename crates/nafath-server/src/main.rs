use anyhow::Context;
use clap::{value_parser, Arg, ArgMatches, Command};
use nafath_core::{Handshake, HandshakeConfig};
use nafath_server::{routes, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("nafath-server")
        .version(nafath_core::VERSION)
        .about("Nafath approval handshake and visual pairing server")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("bind")
                .long("bind")
                .global(true)
                .help("Listen address, overrides server.bind"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Slot storage directory, overrides storage.data_dir"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log output format"),
        )
        .subcommand(Command::new("serve").about("Run the HTTP server (default)"))
        .subcommand(Command::new("print-config").about("Print the effective configuration"))
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<HandshakeConfig> {
    let path = matches.get_one::<PathBuf>("config");
    let mut config = HandshakeConfig::load(path.map(PathBuf::as_path))
        .context("failed to load configuration")?;

    if let Some(bind) = matches.get_one::<String>("bind") {
        config.server.bind.clone_from(bind);
    }
    if let Some(dir) = matches.get_one::<PathBuf>("data-dir") {
        config.storage.data_dir.clone_from(dir);
    }
    Ok(config)
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn serve(config: HandshakeConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {:?}", config.server.bind))?;

    let handshake = Handshake::from_config(&config).context("failed to assemble handshake")?;
    let state = AppState::new(handshake);

    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutting down");
        })
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        addr = %bound,
        data_dir = %config.storage.data_dir.display(),
        "nafath-server listening"
    );
    server.await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("print-config", _)) => {
            let rendered = toml::to_string_pretty(&config).context("failed to render config")?;
            print!("{rendered}");
            Ok(())
        }
        _ => {
            let format = matches
                .get_one::<String>("log-format")
                .map_or("text", String::as_str);
            init_tracing(format);
            serve(config).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let matches = cli()
            .try_get_matches_from(["nafath-server", "--bind", "127.0.0.1:9000", "--data-dir", "/tmp/nafath"])
            .unwrap();
        let config = load_config(&matches).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/nafath"));
    }

    #[test]
    fn print_config_subcommand_parses() {
        let matches = cli()
            .try_get_matches_from(["nafath-server", "print-config", "--log-format", "json"])
            .unwrap();
        assert_eq!(matches.subcommand_name(), Some("print-config"));
    }
}
