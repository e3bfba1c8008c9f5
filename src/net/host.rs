use std::{fs, process::Command};

use anyhow::Context;
use pnet::util::MacAddr;
use rand::Rng;
use tracing::info;

pub const IP_FORWARD_PATH: &str = "/proc/sys/net/ipv4/ip_forward";

/// Host-level switches the core flips: kernel forwarding and the card's MAC.
pub trait HostControl: Send + Sync {
    fn set_ip_forward(&self, enabled: bool) -> anyhow::Result<()>;
    fn set_mac(&self, iface: &str, mac: MacAddr) -> anyhow::Result<()>;
}

pub struct SystemControl;

impl HostControl for SystemControl {
    fn set_ip_forward(&self, enabled: bool) -> anyhow::Result<()> {
        let value = if enabled { "1" } else { "0" };
        fs::write(IP_FORWARD_PATH, value)
            .with_context(|| format!("Failed to write {value} to {IP_FORWARD_PATH}"))?;
        if enabled {
            info!("IP forward enabled");
        } else {
            info!("IP forward disabled");
        }
        return Ok(());
    }

    fn set_mac(&self, iface: &str, mac: MacAddr) -> anyhow::Result<()> {
        let mac = mac.to_string();
        ip_link(&["set", "dev", iface, "down"])?;
        let changed = ip_link(&["set", "dev", iface, "address", &mac]);
        // Bring the link back up even when the address was refused.
        let raised = ip_link(&["set", "dev", iface, "up"]);
        changed?;
        raised?;
        info!("{iface} now uses {mac}");
        return Ok(());
    }
}

fn ip_link(args: &[&str]) -> anyhow::Result<()> {
    let status = Command::new("ip")
        .arg("link")
        .args(args)
        .status()
        .context("Couldn't run ip")?;
    if !status.success() {
        anyhow::bail!("ip link {} exited with {}", args.join(" "), status);
    }
    return Ok(());
}

/// Random MAC with a zero first octet, so the unicast bit is always clear.
pub fn generate_mac() -> MacAddr {
    let mut rng = rand::rng();
    return MacAddr(
        0x00,
        rng.random_range(0x00..=0x7f),
        rng.random_range(0x00..=0x7f),
        rng.random_range(0x00..=0x7f),
        rng.random(),
        rng.random(),
    );
}
