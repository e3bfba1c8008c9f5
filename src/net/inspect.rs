use std::{
    io::ErrorKind,
    net::{IpAddr, Ipv4Addr},
    time::{Duration, Instant},
};

use anyhow::Context;
use pnet::{
    datalink::{self, NetworkInterface},
    ipnetwork::Ipv4Network,
    util::MacAddr,
};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use super::utils::{
    create_arp_request_v4_eth, find_interface, get_rawsock, interface_ipv4, parse_arp_reply,
};
use crate::{
    config::Timing,
    model::{GatewayInfo, HostInfo},
};

/// Whether inspection results carry reverse-resolved hostnames. The lookup
/// can block for seconds without a reachable DNS server, so the spoof path
/// skips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hostnames {
    Resolve,
    Skip,
}

impl Hostnames {
    pub fn lookup(self, ip: Ipv4Addr) -> String {
        return match self {
            Hostnames::Resolve => lookup_hostname(ip),
            Hostnames::Skip => String::new(),
        };
    }
}

/// Reads the live network state. Nothing here is cached: every call goes back
/// to the kernel or the wire.
pub trait NetworkInspector: Send + Sync {
    /// `None` when there is no default route at all. A gateway that never
    /// answered comes back with an empty MAC instead.
    fn resolve_gateway(&self, hostnames: Hostnames) -> anyhow::Result<Option<GatewayInfo>>;

    /// `None` when the interface is missing or has no IPv4 address.
    fn resolve_self(
        &self,
        iface: &str,
        hostnames: Hostnames,
    ) -> anyhow::Result<Option<HostInfo>>;

    /// One-shot ARP sweep of the /24 around `ip`.
    fn scan_subnet(&self, ip: Ipv4Addr) -> anyhow::Result<Vec<HostInfo>>;
}

/// A row of the kernel routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub iface: String,
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub metric: u32,
}

pub fn read_routes() -> anyhow::Result<Vec<Route>> {
    let routes = procfs::net::route().context("Couldn't read the routing table")?;
    return Ok(routes
        .into_iter()
        .map(|entry| Route {
            iface: entry.iface,
            destination: entry.destination,
            mask: entry.mask,
            gateway: entry.gateway,
            metric: entry.metrics,
        })
        .collect());
}

/// The 0.0.0.0/0 route with a next hop. Lowest metric wins, the first listed
/// wins a tie.
pub fn default_route(routes: &[Route]) -> Option<&Route> {
    return routes
        .iter()
        .filter(|route| {
            route.destination.is_unspecified()
                && route.mask.is_unspecified()
                && !route.gateway.is_unspecified()
        })
        .min_by_key(|route| route.metric);
}

/// Our own address and hardware address on `interface`.
pub fn self_address(interface: &NetworkInterface) -> Option<(Ipv4Addr, MacAddr)> {
    let network = interface_ipv4(interface, None)?;
    let mac = interface.mac?;
    return Some((network.ip(), mac));
}

/// Reverse lookup. Failure is an empty string, never an error.
pub fn lookup_hostname(ip: Ipv4Addr) -> String {
    return match dns_lookup::lookup_addr(&IpAddr::V4(ip)) {
        Ok(name) => clean_hostname(ip, &name),
        Err(e) => {
            debug!("No hostname for {ip}: {e}");
            String::new()
        }
    };
}

fn clean_hostname(ip: Ipv4Addr, name: &str) -> String {
    let name = name.trim_end_matches('.');
    // getnameinfo hands back the numeric form when nothing resolves
    if name == ip.to_string() {
        return String::new();
    }
    return name.to_string();
}

/// Collects who-has answers in arrival order, one entry per IP.
#[derive(Debug, Default)]
pub struct ReplyTable {
    order: Vec<Ipv4Addr>,
    table: FxHashMap<Ipv4Addr, MacAddr>,
}

impl ReplyTable {
    /// Returns true when `ip` was seen for the first time.
    pub fn record(&mut self, ip: Ipv4Addr, mac: MacAddr) -> bool {
        if let Some(existing_mac) = self.table.get(&ip) {
            if *existing_mac != mac {
                warn!("Possible spoofing attack for {ip}: seen at {existing_mac} and {mac}");
            }
            return false;
        }
        self.table.insert(ip, mac);
        self.order.push(ip);
        return true;
    }

    pub fn len(&self) -> usize {
        return self.order.len();
    }

    pub fn into_hosts(self, resolve: impl Fn(Ipv4Addr) -> String) -> Vec<HostInfo> {
        let Self { order, table } = self;
        return order
            .into_iter()
            .map(|ip| HostInfo::new(ip, table.get(&ip).copied(), resolve(ip)))
            .collect();
    }
}

/// Inspector backed by procfs and raw datalink sockets.
pub struct PnetInspector {
    resolve_timeout: Duration,
    scan_window: Duration,
}

impl PnetInspector {
    pub fn new(timing: &Timing) -> Self {
        return Self {
            resolve_timeout: timing.resolve_timeout(),
            scan_window: timing.scan_window(),
        };
    }

    /// Sends a single who-has for `target` on `interface_name` and waits for
    /// the answer up to the resolve timeout.
    pub fn arp_lookup(
        &self,
        interface_name: &str,
        target: Ipv4Addr,
    ) -> anyhow::Result<Option<MacAddr>> {
        let (interface, mut sender, mut receiver) =
            get_rawsock(interface_name, Some(Duration::from_millis(100)))?;
        let mac_addr = interface
            .mac
            .context("Interface is missing a mac address")?;
        // Devices answer a zero sender IP too; all they need is our MAC.
        let ip_addr = interface_ipv4(&interface, None)
            .map(|network| network.ip())
            .unwrap_or(Ipv4Addr::UNSPECIFIED);

        let packet = create_arp_request_v4_eth(target, ip_addr, mac_addr);
        sender
            .send_to(&packet, None)
            .context("send_to returned None")??;

        let start = Instant::now();
        while start.elapsed() < self.resolve_timeout {
            let frame = match receiver.next() {
                Ok(frame) => frame,
                Err(err) if err.kind() == ErrorKind::TimedOut => continue,
                Err(err) => return Err(err.into()),
            };
            match parse_arp_reply(frame, mac_addr) {
                Some((ip, mac)) if ip == target => return Ok(Some(mac)),
                _ => continue,
            }
        }

        return Ok(None);
    }
}

impl NetworkInspector for PnetInspector {
    fn resolve_gateway(&self, hostnames: Hostnames) -> anyhow::Result<Option<GatewayInfo>> {
        let routes = read_routes()?;
        let Some(route) = default_route(&routes) else {
            return Ok(None);
        };

        let mac = match self.arp_lookup(&route.iface, route.gateway) {
            Ok(Some(mac)) => {
                info!("Gateway {} is at {}", route.gateway, mac);
                Some(mac)
            }
            Ok(None) => {
                warn!("Could not get gateway MAC address for {}", route.gateway);
                None
            }
            Err(e) => {
                warn!("ARP lookup of gateway {} failed: {e:#}", route.gateway);
                None
            }
        };

        return Ok(Some(GatewayInfo {
            host: HostInfo::new(route.gateway, mac, hostnames.lookup(route.gateway)),
            iface: route.iface.clone(),
        }));
    }

    fn resolve_self(
        &self,
        iface: &str,
        hostnames: Hostnames,
    ) -> anyhow::Result<Option<HostInfo>> {
        let Some(interface) = find_interface(iface) else {
            warn!("Interface {iface} not found");
            return Ok(None);
        };
        return Ok(self_address(&interface)
            .map(|(ip, mac)| HostInfo::new(ip, Some(mac), hostnames.lookup(ip))));
    }

    fn scan_subnet(&self, ip: Ipv4Addr) -> anyhow::Result<Vec<HostInfo>> {
        let subnet = Ipv4Network::new(ip, 24)?;
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| interface_ipv4(iface, Some(ip)).is_some())
            .with_context(|| format!("No interface is attached to {}", subnet))?;
        let (interface, mut sender, mut receiver) =
            get_rawsock(&interface.name, Some(Duration::from_millis(100)))?;
        let mac_addr = interface
            .mac
            .context("Interface is missing a mac address")?;
        let ip_addr = interface_ipv4(&interface, Some(ip))
            .context("Interface lost its address")?
            .ip();

        info!("Scanning {} on {}", subnet, interface.name);
        for target_ip in subnet.iter() {
            if target_ip == ip_addr {
                continue;
            }
            let packet = create_arp_request_v4_eth(target_ip, ip_addr, mac_addr);
            sender
                .send_to(&packet, None)
                .context("send_to returned None")??;
        }

        let mut table = ReplyTable::default();
        let start = Instant::now();
        while start.elapsed() < self.scan_window {
            let frame = match receiver.next() {
                Ok(frame) => frame,
                Err(err) if err.kind() == ErrorKind::TimedOut => continue,
                Err(err) => return Err(err.into()),
            };
            if let Some((arp_ip, arp_mac)) = parse_arp_reply(frame, mac_addr) {
                if subnet.contains(arp_ip) {
                    table.record(arp_ip, arp_mac);
                }
            }
        }

        info!("{} hosts answered on {}", table.len(), subnet);
        return Ok(table.into_hosts(lookup_hostname));
    }
}
