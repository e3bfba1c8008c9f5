use std::net::Ipv4Addr;

use anyhow::Context;

use crate::{
    config::Timing,
    net::{
        host::{generate_mac, HostControl, SystemControl},
        inspect::{Hostnames, NetworkInspector, PnetInspector},
    },
};

/// One-shot versions of the inspection calls the control API serves.
#[derive(clap::Subcommand, Debug, Clone)]
pub enum ArpSubcommand {
    /// Prints the default gateway and whether its MAC could be resolved.
    Gateway,
    /// Prints our own address on an interface.
    Me {
        /// The network interface to inspect
        interface: String,
    },
    /// Sweeps the /24 around an address with ARP requests.
    Scan {
        /// Any address inside the subnet to scan
        ip: Ipv4Addr,
    },
    /// Gives the interface a random MAC address.
    ChangeMac {
        /// The network interface to re-address
        interface: String,
    },
}

pub fn run(subcommand: ArpSubcommand, timing: &Timing) -> anyhow::Result<()> {
    let inspector = PnetInspector::new(timing);
    return match subcommand {
        ArpSubcommand::Gateway => {
            let gateway = inspector
                .resolve_gateway(Hostnames::Resolve)?
                .context("Computer is not connected")?;
            if gateway.host.mac.is_empty() {
                println!(
                    "Gateway {} via {} did not answer",
                    gateway.host.ip, gateway.iface
                );
            } else {
                println!(
                    "Gateway {} via {} is at {}",
                    gateway.host.ip, gateway.iface, gateway.host.mac
                );
            }
            Ok(())
        }
        ArpSubcommand::Me { interface } => {
            let me = inspector
                .resolve_self(&interface, Hostnames::Resolve)?
                .with_context(|| format!("Could not get interface information for {interface}"))?;
            println!("{} is at {} {}", me.ip, me.mac, me.hostname);
            Ok(())
        }
        ArpSubcommand::Scan { ip } => {
            for host in inspector.scan_subnet(ip)? {
                println!("{} is at {} {}", host.ip, host.mac, host.hostname);
            }
            Ok(())
        }
        ArpSubcommand::ChangeMac { interface } => {
            let mac = generate_mac();
            SystemControl.set_mac(&interface, mac)?;
            println!("{interface} is now at {mac}");
            Ok(())
        }
    };
}
