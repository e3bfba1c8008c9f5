use std::{net::Ipv4Addr, time::Duration};

use anyhow::Context;
use pnet::{
    datalink::{self, Channel, DataLinkReceiver, DataLinkSender, NetworkInterface},
    ipnetwork::{IpNetwork, Ipv4Network},
    packet::{
        arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket},
        ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket},
        Packet,
    },
    util::MacAddr,
};

pub const ETH_HEADER_LEN: usize = 14;
pub const ARP_PACKET_LEN: usize = 28;
pub const ARP_FRAME_LEN: usize = ETH_HEADER_LEN + ARP_PACKET_LEN;

pub fn find_interface(interface_name: &str) -> Option<NetworkInterface> {
    return datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == interface_name);
}

/// First IPv4 network bound to `interface`. With `containing`, only a network
/// that covers that address qualifies.
pub fn interface_ipv4(
    interface: &NetworkInterface,
    containing: Option<Ipv4Addr>,
) -> Option<Ipv4Network> {
    return interface
        .ips
        .iter()
        .filter_map(|ip| match ip {
            IpNetwork::V4(addr) => Some(*addr),
            IpNetwork::V6(_) => None,
        })
        .find(|addr| containing.map(|ip| addr.contains(ip)).unwrap_or(true));
}

pub fn get_rawsock(
    interface_name: &str,
    read_timeout: Option<Duration>,
) -> anyhow::Result<(
    NetworkInterface,
    Box<dyn DataLinkSender>,
    Box<dyn DataLinkReceiver>,
)> {
    let interface = find_interface(interface_name)
        .with_context(|| format!("Interface {interface_name} not found"))?;

    // Layer 2 channel so we control the ethernet header ourselves
    let (tx, rx) = match datalink::channel(
        &interface,
        datalink::Config {
            read_timeout,
            promiscuous: true,
            ..Default::default()
        },
    ) {
        Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
        Ok(_) => anyhow::bail!("Unhandled channel type"),
        Err(e) => anyhow::bail!(
            "An error occurred when creating the datalink channel on {}: {}",
            interface_name,
            e
        ),
    };

    return Ok((interface, tx, rx));
}

pub fn create_arp_request_v4_eth(
    target_address: Ipv4Addr,
    ip_address: Ipv4Addr,
    hw_address: MacAddr,
) -> [u8; ARP_FRAME_LEN] {
    let mut raw_packet = [0u8; ARP_FRAME_LEN];
    let mut packet = MutableEthernetPacket::new(&mut raw_packet).unwrap();
    packet.set_destination(MacAddr::broadcast());
    packet.set_source(hw_address);
    packet.set_ethertype(EtherTypes::Arp);
    drop(packet);

    let mut packet = MutableArpPacket::new(&mut raw_packet[ETH_HEADER_LEN..]).unwrap();
    packet.set_hardware_type(ArpHardwareTypes::Ethernet);
    packet.set_protocol_type(EtherTypes::Ipv4);
    packet.set_hw_addr_len(6);
    packet.set_proto_addr_len(4);
    packet.set_operation(ArpOperations::Request);
    packet.set_sender_hw_addr(hw_address);
    packet.set_sender_proto_addr(ip_address);
    packet.set_target_hw_addr(MacAddr::zero());
    packet.set_target_proto_addr(target_address);
    drop(packet);

    return raw_packet;
}

/// Builds an "is-at" reply claiming `sender_ip` lives at `sender_mac`.
///
/// With a target the frame is unicast to it, otherwise it is a broadcast
/// gratuitous reply. `link_source` goes into the ethernet header only, so the
/// claimed hardware address may differ from the card that sends it.
pub fn create_arp_reply_v4_eth(
    target_address: Option<(Ipv4Addr, MacAddr)>,
    sender_ip: Ipv4Addr,
    sender_mac: MacAddr,
    link_source: MacAddr,
) -> [u8; ARP_FRAME_LEN] {
    let mut raw_packet = [0u8; ARP_FRAME_LEN];
    let mut packet = MutableEthernetPacket::new(&mut raw_packet).unwrap();
    packet.set_destination(
        target_address
            .map(|(_ip, mac)| mac)
            .unwrap_or(MacAddr::broadcast()),
    );
    packet.set_source(link_source);
    packet.set_ethertype(EtherTypes::Arp);
    drop(packet);

    let mut packet = MutableArpPacket::new(&mut raw_packet[ETH_HEADER_LEN..]).unwrap();
    packet.set_hardware_type(ArpHardwareTypes::Ethernet);
    packet.set_protocol_type(EtherTypes::Ipv4);
    packet.set_hw_addr_len(6);
    packet.set_proto_addr_len(4);
    packet.set_operation(ArpOperations::Reply);
    packet.set_sender_hw_addr(sender_mac);
    packet.set_sender_proto_addr(sender_ip);
    match target_address {
        Some((v4_addr, mac_addr)) => {
            packet.set_target_hw_addr(mac_addr);
            packet.set_target_proto_addr(v4_addr);
        }
        None => {
            packet.set_target_hw_addr(MacAddr::broadcast());
            packet.set_target_proto_addr(sender_ip);
        }
    }
    drop(packet);

    return raw_packet;
}

/// Extracts `(sender ip, sender mac)` from an ARP reply addressed to `our_mac`.
pub fn parse_arp_reply(frame: &[u8], our_mac: MacAddr) -> Option<(Ipv4Addr, MacAddr)> {
    let packet = EthernetPacket::new(frame)?;
    if packet.get_ethertype() != EtherTypes::Arp || packet.get_destination() != our_mac {
        return None;
    }
    let arp_packet = ArpPacket::new(packet.payload())?;
    if arp_packet.get_protocol_type() != EtherTypes::Ipv4
        || arp_packet.get_operation() != ArpOperations::Reply
    {
        return None;
    }
    return Some((
        arp_packet.get_sender_proto_addr(),
        arp_packet.get_sender_hw_addr(),
    ));
}

#[cfg(test)]
mod tests {
    use std::net::Ipv6Addr;

    use pnet::ipnetwork::Ipv6Network;

    use super::*;

    const OURS: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 0x01);
    const THEIRS: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 0x02);

    #[test]
    fn unicast_reply_fields() {
        let frame = create_arp_reply_v4_eth(
            Some((Ipv4Addr::new(10, 0, 0, 5), THEIRS)),
            Ipv4Addr::new(10, 0, 0, 1),
            OURS,
            OURS,
        );
        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_destination(), THEIRS);
        assert_eq!(eth.get_source(), OURS);
        let arp = ArpPacket::new(eth.payload()).unwrap();
        assert_eq!(arp.get_operation(), ArpOperations::Reply);
        assert_eq!(arp.get_sender_proto_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(arp.get_sender_hw_addr(), OURS);
        assert_eq!(arp.get_target_proto_addr(), Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(arp.get_target_hw_addr(), THEIRS);
    }

    #[test]
    fn gratuitous_reply_is_broadcast() {
        let frame = create_arp_reply_v4_eth(None, Ipv4Addr::new(10, 0, 0, 1), THEIRS, OURS);
        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_destination(), MacAddr::broadcast());
        assert_eq!(eth.get_source(), OURS);
        let arp = ArpPacket::new(eth.payload()).unwrap();
        assert_eq!(arp.get_sender_hw_addr(), THEIRS);
        assert_eq!(arp.get_target_proto_addr(), Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn request_is_not_a_reply() {
        let frame =
            create_arp_request_v4_eth(Ipv4Addr::new(10, 0, 0, 9), Ipv4Addr::new(10, 0, 0, 2), OURS);
        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_destination(), MacAddr::broadcast());
        assert_eq!(parse_arp_reply(&frame, MacAddr::broadcast()), None);
    }

    #[test]
    fn parses_replies_meant_for_us() {
        let frame = create_arp_reply_v4_eth(
            Some((Ipv4Addr::new(10, 0, 0, 2), OURS)),
            Ipv4Addr::new(10, 0, 0, 7),
            THEIRS,
            THEIRS,
        );
        assert_eq!(
            parse_arp_reply(&frame, OURS),
            Some((Ipv4Addr::new(10, 0, 0, 7), THEIRS))
        );
        assert_eq!(parse_arp_reply(&frame, THEIRS), None);
        assert_eq!(parse_arp_reply(&frame[..10], OURS), None);
    }

    #[test]
    fn picks_the_ipv4_network_containing_target() {
        let interface = NetworkInterface {
            name: "eth0".into(),
            description: String::new(),
            index: 2,
            mac: Some(OURS),
            ips: vec![
                IpNetwork::V6(
                    Ipv6Network::new("fe80::1".parse::<Ipv6Addr>().unwrap(), 64).unwrap(),
                ),
                IpNetwork::V4(Ipv4Network::new(Ipv4Addr::new(172, 16, 0, 4), 16).unwrap()),
                IpNetwork::V4(Ipv4Network::new(Ipv4Addr::new(192, 168, 1, 10), 24).unwrap()),
            ],
            flags: 0,
        };
        let found = interface_ipv4(&interface, Some(Ipv4Addr::new(192, 168, 1, 77))).unwrap();
        assert_eq!(found.ip(), Ipv4Addr::new(192, 168, 1, 10));
        let first = interface_ipv4(&interface, None).unwrap();
        assert_eq!(first.ip(), Ipv4Addr::new(172, 16, 0, 4));
        assert!(interface_ipv4(&interface, Some(Ipv4Addr::new(10, 0, 0, 1))).is_none());
    }
}
