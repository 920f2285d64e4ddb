mod config;
mod daemon;
mod notify;

use anyhow::{Context, Result};
use config::ServerConfig;
use std::path::PathBuf;

fn main() {
    echolock_crypto::disable_core_dumps();

    // Initialize rustls' CryptoProvider before any Nostr/TLS operations.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut once = false;
    let mut validate_only = false;
    let mut create = false;
    let mut message_file: Option<PathBuf> = None;
    let mut release = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                match args.get(i) {
                    Some(path) => config_path = Some(PathBuf::from(path)),
                    None => {
                        eprintln!("--config requires a path argument");
                        std::process::exit(2);
                    }
                }
            }
            "--check" | "--once" => once = true,
            "--validate" => validate_only = true,
            "--create" => create = true,
            "--message-file" => {
                i += 1;
                match args.get(i) {
                    Some(path) => message_file = Some(PathBuf::from(path)),
                    None => {
                        eprintln!("--message-file requires a path argument");
                        std::process::exit(2);
                    }
                }
            }
            "--release" => release = true,
            "--help" | "-h" => {
                print_help();
                return;
            }
            "--version" | "-V" => {
                println!("echolock-server {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            other => {
                eprintln!("Unrecognized argument: {other}");
                print_help();
                std::process::exit(2);
            }
        }
        i += 1;
    }

    let result = run(RunArgs {
        config_path,
        once,
        validate_only,
        create,
        message_file,
        release,
    });

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

struct RunArgs {
    config_path: Option<PathBuf>,
    once: bool,
    validate_only: bool,
    create: bool,
    message_file: Option<PathBuf>,
    release: bool,
}

fn run(args: RunArgs) -> Result<()> {
    let config_path = args.config_path.unwrap_or_else(|| PathBuf::from("echolock.toml"));
    let mut config = ServerConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.apply_env_overrides();
    config.validate().context("Config validation failed")?;

    std::env::set_var("RUST_LOG", &config.server.log_level);
    env_logger::init();

    if args.validate_only {
        println!("Configuration is valid.");
        println!("  Switch:        {}", config.switch.id);
        println!(
            "  Threshold:     {}-of-{}",
            config.switch.threshold_required, config.switch.threshold_total
        );
        println!(
            "  Check-in:      every {} s",
            config.switch.check_in_interval_secs
        );
        println!("  Relays:        {}", config.relay.relay_urls.len());
        println!("  Bitcoin leg:   {}", config.bitcoin.use_bitcoin_timelock);
        return Ok(());
    }

    let rt = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;

    if args.create {
        let message_file = args
            .message_file
            .context("--create requires --message-file <path>")?;
        let plaintext = std::fs::read(&message_file)
            .with_context(|| format!("Failed to read {}", message_file.display()))?;
        let password = std::env::var("ECHOLOCK_CREATE_PASSWORD")
            .context("ECHOLOCK_CREATE_PASSWORD must be set to create a switch")?;

        std::fs::create_dir_all(&config.server.data_dir)
            .context("Failed to create data dir")?;

        return rt.block_on(async {
            let switch = daemon::create_switch(&config, &plaintext, &password, None).await?;
            println!("Switch '{}' created and armed.", switch.id);
            Ok(())
        });
    }

    if args.release {
        let password = std::env::var("ECHOLOCK_RELEASE_PASSWORD")
            .context("ECHOLOCK_RELEASE_PASSWORD must be set to release a switch")?;
        return rt.block_on(async {
            let plaintext = daemon::run_release_pipeline(&config, &password).await?;
            println!(
                "Switch '{}' released ({} bytes recovered).",
                config.switch.id,
                plaintext.len()
            );
            Ok(())
        });
    }

    if args.once {
        rt.block_on(daemon::run_check_cycle(&config))
    } else {
        rt.block_on(async {
            tokio::select! {
                result = daemon::run(config) => result,
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Shutdown signal received, exiting.");
                    Ok(())
                }
            }
        })
    }
}

fn print_help() {
    println!(
        r#"echolock-server — headless EchoLock dead-man's-switch daemon

USAGE:
    echolock-server [OPTIONS]

OPTIONS:
    -c, --config <PATH>        Path to the TOML config file (default: ./echolock.toml)
        --check, --once        Run a single check cycle and exit
        --validate             Validate the config and exit without running
        --create                Seal, split, and commit a new switch, then exit
        --message-file <PATH>   Plaintext message to seal (required with --create)
        --release               Recover, deliver, and release a triggered switch, then exit
    -h, --help                 Print this help
    -V, --version               Print the version

ENVIRONMENT OVERRIDES:
    ECHOLOCK_DATA_DIR           overrides [server] data_dir
    ECHOLOCK_POLL_INTERVAL      overrides [server] poll_interval_secs (seconds)
    ECHOLOCK_LOG_LEVEL          overrides [server] log_level
    ECHOLOCK_CHECK_IN_INTERVAL  overrides [switch] check_in_interval_secs (seconds)
    ECHOLOCK_RELAY_URLS         overrides [relay] relay_urls (comma-separated)
    ECHOLOCK_MIN_RELAY_ACKS     overrides [relay] min_relay_acks
    ECHOLOCK_BITCOIN_NETWORK    overrides [bitcoin] network
    ECHOLOCK_ESPLORA_URL        overrides [bitcoin] esplora_url

ENVIRONMENT SECRETS:
    ECHOLOCK_CREATE_PASSWORD    password to seal the message and wrap the auth key (--create)
    ECHOLOCK_RELEASE_PASSWORD   password to unwrap the auth key and decrypt the message (--release)
"#
    );
}
