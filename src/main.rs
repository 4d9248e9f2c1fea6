//! remoteplay - Open a Remote Play control session from the command line.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use rp_core::{HostType, PairingCredential};
use rp_crypto::KeyTables;
use rp_ctrl::{CallbackHandler, ControlEvent, NoopLauncher, SessionBuilder};
use rp_discovery::{AssumeAvailable, DdpProbe, DdpResponse};
use tracing::{info, warn};

/// Command-line arguments
#[derive(Default)]
struct Args {
    host: Option<IpAddr>,
    regist_key: Option<String>,
    rp_key: Option<String>,
    table_a: Option<PathBuf>,
    table_b: Option<PathBuf>,
    mac: String,
    host_type: Option<HostType>,
    /// Put the host into rest mode and exit
    standby: bool,
    debug: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .ok_or_else(|| anyhow!("{} needs a value", name))
        };
        match arg.as_str() {
            "--host" => {
                let host = value("--host")?;
                args.host = Some(host.parse().with_context(|| format!("bad address {}", host))?);
            }
            "--regist-key" => args.regist_key = Some(value("--regist-key")?),
            "--rp-key" => args.rp_key = Some(value("--rp-key")?),
            "--table-a" => args.table_a = Some(PathBuf::from(value("--table-a")?)),
            "--table-b" => args.table_b = Some(PathBuf::from(value("--table-b")?)),
            "--mac" => args.mac = value("--mac")?,
            "--ps5" => args.host_type = Some(HostType::Ps5),
            "--standby" => args.standby = true,
            "--debug" | "-d" => args.debug = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
    }

    Ok(args)
}

fn print_help() {
    println!("remoteplay - Remote Play control session client");
    println!();
    println!("Usage: remoteplay --host IP --regist-key HEX --rp-key HEX --table-a PATH --table-b PATH [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --host IP            Address of the console");
    println!("  --regist-key HEX     Registration key from pairing");
    println!("  --rp-key HEX         16 byte RP key from pairing");
    println!("  --table-a PATH       Nonce derivation table");
    println!("  --table-b PATH       Key derivation table");
    println!("  --mac MAC            Console MAC address (informational)");
    println!("  --ps5                Host is a PS5 (default PS4)");
    println!("  --standby            Put the console into rest mode, then exit");
    println!("  -d, --debug          Enable debug logging");
    println!("  -h, --help           Show this help message");
}

fn setup_logging(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .init();
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| anyhow!("missing {}", name))
}

/// Accept a discovery reply only if the console can take a session.
fn reachable(reply: Option<DdpResponse>, host_type: HostType, host: IpAddr) -> Result<DdpResponse> {
    match reply {
        Some(reply) if reply.is_reachable() => Ok(reply),
        Some(reply) => bail!(
            "{} at {} answered {} {}",
            host_type,
            host,
            reply.status_code,
            reply.status
        ),
        None => bail!("{} at {} did not answer the discovery probe", host_type, host),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;
    setup_logging(args.debug);

    if let Err(e) = run(args).await {
        match e.downcast_ref::<rp_core::Error>() {
            Some(err) => eprintln!("Error: {} ({:?})", err, err.failure_kind()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let host = required(args.host, "--host")?;
    let host_type = args.host_type.unwrap_or(HostType::Ps4);
    let credential = PairingCredential::from_hex(
        host_type,
        args.mac,
        &required(args.regist_key, "--regist-key")?,
        &required(args.rp_key, "--rp-key")?,
    )?;
    let tables = KeyTables::from_files(
        required(args.table_a, "--table-a")?,
        required(args.table_b, "--table-b")?,
    )?;

    let reply = DdpProbe::new().search(host, host_type).await?;
    let reply = reachable(reply, host_type, host)?;
    info!(
        status = %reply.status,
        name = reply.host_name().unwrap_or("?"),
        app = reply.running_app_name().unwrap_or("-"),
        "{} found at {}",
        host_type,
        host
    );

    let events = CallbackHandler::new(|event| match event {
        ControlEvent::SessionReady(id) => {
            info!(session_id = %String::from_utf8_lossy(&id), "Session ready")
        }
        ControlEvent::Message(msg) => info!(kind = %msg.kind, len = msg.payload.len(), "Host message"),
        ControlEvent::Stopped(reason) => info!(?reason, "Session stopped"),
    });

    let handle = SessionBuilder::new(tables)
        // Already probed above.
        .availability(AssumeAvailable)
        .launcher(NoopLauncher)
        .event_handler(events)
        .start(host, credential)
        .await?;

    if args.standby {
        handle.standby()?;
        info!("Standby requested");
        // Give the loop a moment to write the frame before closing.
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop();
    } else {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                handle.stop();
            }
            _ = handle.wait_stopped() => warn!("Host closed the control session"),
        }
    }

    handle.join().await?;
    Ok(())
}
