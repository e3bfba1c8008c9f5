//! Recording fakes for the raw-I/O seams.

use std::{
    net::Ipv4Addr,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use pnet::util::MacAddr;

use crate::{
    model::{GatewayInfo, HostInfo, VictimDescriptor},
    net::{host::HostControl, inspect::{Hostnames, NetworkInspector}, spoof::ArpReply, spoof::FrameSender},
};

pub const GATEWAY_MAC: MacAddr = MacAddr(0xaa, 0xbb, 0xcc, 0x00, 0x00, 0x01);
pub const MY_MAC: MacAddr = MacAddr(0x02, 0x00, 0x00, 0x00, 0x00, 0x0a);

pub fn gateway(mac: &str) -> GatewayInfo {
    return GatewayInfo {
        host: HostInfo {
            ip: "192.168.1.1".into(),
            mac: mac.into(),
            hostname: "router.lan".into(),
        },
        iface: "eth0".into(),
    };
}

pub fn victim(last_octet: u8) -> VictimDescriptor {
    return VictimDescriptor {
        ip: Ipv4Addr::new(192, 168, 1, last_octet).to_string(),
        mac: MacAddr(0x02, 0, 0, 0, 0, last_octet).to_string(),
        hostname: format!("host-{last_octet}"),
    };
}

pub struct FakeInspector {
    pub gateway: Mutex<Option<GatewayInfo>>,
    pub me: Mutex<Option<HostInfo>>,
    pub hosts: Vec<HostInfo>,
    pub gateway_lookups: AtomicUsize,
    /// Lookups that asked for reverse-resolved hostnames.
    pub named_lookups: AtomicUsize,
}

impl FakeInspector {
    pub fn connected() -> Self {
        return Self {
            gateway: Mutex::new(Some(gateway(&GATEWAY_MAC.to_string()))),
            me: Mutex::new(Some(HostInfo {
                ip: "192.168.1.10".into(),
                mac: MY_MAC.to_string(),
                hostname: "me".into(),
            })),
            hosts: Vec::new(),
            gateway_lookups: AtomicUsize::new(0),
            named_lookups: AtomicUsize::new(0),
        };
    }
}

impl NetworkInspector for FakeInspector {
    fn resolve_gateway(&self, hostnames: Hostnames) -> anyhow::Result<Option<GatewayInfo>> {
        self.gateway_lookups.fetch_add(1, Ordering::SeqCst);
        if hostnames == Hostnames::Resolve {
            self.named_lookups.fetch_add(1, Ordering::SeqCst);
        }
        return Ok(self.gateway.lock().clone());
    }

    fn resolve_self(
        &self,
        _iface: &str,
        hostnames: Hostnames,
    ) -> anyhow::Result<Option<HostInfo>> {
        if hostnames == Hostnames::Resolve {
            self.named_lookups.fetch_add(1, Ordering::SeqCst);
        }
        return Ok(self.me.lock().clone());
    }

    fn scan_subnet(&self, _ip: Ipv4Addr) -> anyhow::Result<Vec<HostInfo>> {
        return Ok(self.hosts.clone());
    }
}

#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, ArpReply, usize)>>,
    pub attempts: AtomicUsize,
    pub fail: AtomicBool,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<(String, ArpReply, usize)> {
        return self.sent.lock().clone();
    }

    /// Replies carrying our MAC, i.e. poisoning frames.
    pub fn poisoned(&self) -> usize {
        return self
            .sent
            .lock()
            .iter()
            .filter(|(_, reply, _)| reply.sender_mac == MY_MAC)
            .count();
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl FrameSender for RecordingSender {
    fn send_replies(&self, iface: &str, reply: &ArpReply, count: usize) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("Network is down");
        }
        self.sent.lock().push((iface.to_string(), *reply, count));
        return Ok(());
    }
}

#[derive(Default)]
pub struct FakeHost {
    pub forwarding: Mutex<Vec<bool>>,
    pub macs: Mutex<Vec<(String, MacAddr)>>,
    pub fail: AtomicBool,
}

impl FakeHost {
    pub fn forwarding(&self) -> Option<bool> {
        return self.forwarding.lock().last().copied();
    }
}

impl HostControl for FakeHost {
    fn set_ip_forward(&self, enabled: bool) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("Permission denied");
        }
        self.forwarding.lock().push(enabled);
        return Ok(());
    }

    fn set_mac(&self, iface: &str, mac: MacAddr) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("Permission denied");
        }
        self.macs.lock().push((iface.to_string(), mac));
        return Ok(());
    }
}
