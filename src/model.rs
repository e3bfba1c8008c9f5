use std::net::Ipv4Addr;

use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};

use crate::error::CutError;

/// Any addressable host on the segment: gateway, ourselves, a scan result.
///
/// Addresses stay as strings so the JSON the GUI sends back is accepted as-is.
/// They are parsed only when a frame gets built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub ip: String,
    pub mac: String,
    #[serde(default)]
    pub hostname: String,
}

impl HostInfo {
    pub fn new(ip: Ipv4Addr, mac: Option<MacAddr>, hostname: String) -> Self {
        return Self {
            ip: ip.to_string(),
            mac: mac.map(|mac| mac.to_string()).unwrap_or_default(),
            hostname,
        };
    }

    pub fn hw_addr(&self) -> Result<MacAddr, CutError> {
        return parse_mac("host", &self.mac);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayInfo {
    #[serde(flatten)]
    pub host: HostInfo,
    pub iface: String,
}

impl GatewayInfo {
    pub fn ipv4(&self) -> Result<Ipv4Addr, CutError> {
        return parse_ipv4("gateway", &self.host.ip);
    }

    /// An empty MAC means the gateway never answered our who-has.
    pub fn hw_addr(&self) -> Result<MacAddr, CutError> {
        if self.host.mac.is_empty() {
            return Err(CutError::GatewayMacUnresolved);
        }
        return parse_mac("gateway", &self.host.mac);
    }
}

/// A host to cut or resume.
///
/// Equality compares all three fields. A victim whose hostname resolves
/// differently between two scans is therefore a different victim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VictimDescriptor {
    pub ip: String,
    pub mac: String,
    #[serde(default)]
    pub hostname: String,
}

impl VictimDescriptor {
    pub fn ipv4(&self) -> Result<Ipv4Addr, CutError> {
        return parse_ipv4("victim", &self.ip);
    }

    pub fn hw_addr(&self) -> Result<MacAddr, CutError> {
        return parse_mac("victim", &self.mac);
    }
}

fn parse_ipv4(kind: &'static str, value: &str) -> Result<Ipv4Addr, CutError> {
    return value.trim().parse().map_err(|_| CutError::InvalidAddress {
        kind,
        value: value.to_string(),
    });
}

fn parse_mac(kind: &'static str, value: &str) -> Result<MacAddr, CutError> {
    return value.trim().parse().map_err(|_| CutError::InvalidAddress {
        kind,
        value: value.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_json_is_flat() {
        let gateway = GatewayInfo {
            host: HostInfo {
                ip: "192.168.1.1".into(),
                mac: "aa:bb:cc:dd:ee:ff".into(),
                hostname: "router.lan".into(),
            },
            iface: "eth0".into(),
        };
        let value = serde_json::to_value(&gateway).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "ip": "192.168.1.1",
                "mac": "aa:bb:cc:dd:ee:ff",
                "hostname": "router.lan",
                "iface": "eth0",
            })
        );
        let back: GatewayInfo = serde_json::from_value(value).unwrap();
        assert_eq!(back, gateway);
    }

    #[test]
    fn victim_hostname_defaults_to_empty() {
        let victim: VictimDescriptor =
            serde_json::from_str(r#"{"ip":"10.0.0.5","mac":"aa:bb:cc:dd:ee:01"}"#).unwrap();
        assert_eq!(victim.hostname, "");
    }

    #[test]
    fn empty_gateway_mac_is_unresolved() {
        let gateway = GatewayInfo {
            host: HostInfo {
                ip: "192.168.1.1".into(),
                mac: String::new(),
                hostname: String::new(),
            },
            iface: "eth0".into(),
        };
        assert!(matches!(
            gateway.hw_addr(),
            Err(CutError::GatewayMacUnresolved)
        ));
        assert_eq!(gateway.ipv4().unwrap(), Ipv4Addr::new(192, 168, 1, 1));
    }

    #[test]
    fn garbage_addresses_are_rejected() {
        let victim = VictimDescriptor {
            ip: "10.0.0".into(),
            mac: "aa:bb".into(),
            hostname: String::new(),
        };
        assert!(matches!(
            victim.ipv4(),
            Err(CutError::InvalidAddress { kind: "victim", .. })
        ));
        assert!(victim.hw_addr().is_err());
    }

    #[test]
    fn host_info_without_mac() {
        let host = HostInfo::new(Ipv4Addr::new(10, 0, 0, 2), None, String::new());
        assert_eq!(host.ip, "10.0.0.2");
        assert_eq!(host.mac, "");
    }
}
