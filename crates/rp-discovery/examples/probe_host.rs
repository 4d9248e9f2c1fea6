//! Debug: Show the raw DDP reply of a console.
//!
//! Usage: cargo run -p rp-discovery --example probe_host -- <IP> [--ps5]

use std::net::IpAddr;
use std::time::Duration;

use rp_core::HostType;
use rp_discovery::DdpProbe;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let host: IpAddr = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .ok_or("usage: probe_host <IP> [--ps5]")?
        .parse()?;
    let host_type = if args.iter().any(|a| a == "--ps5") {
        HostType::Ps5
    } else {
        HostType::Ps4
    };

    println!("=== DDP probe {} ({}) ===\n", host, host_type);

    let probe = DdpProbe::new().timeout(Duration::from_secs(1));
    match probe.search(host, host_type).await? {
        Some(reply) => {
            println!("  Status:     {} {}", reply.status_code, reply.status);
            println!("  Standby:    {}", reply.is_standby());
            let mut fields: Vec<_> = reply.fields.iter().collect();
            fields.sort();
            for (key, value) in fields {
                println!("  {} = {}", key, value);
            }
        }
        None => println!("No reply."),
    }
    Ok(())
}
