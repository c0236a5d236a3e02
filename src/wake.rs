//! Wake-on-LAN and the warm-up wait before powering the TV on.
//!
//! In deep standby the TV's HTTP API is offline, so a power-on request has
//! to be preceded by a magic packet and a pause while the API comes up.

use crate::config::WakeConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

/// A 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Six `0xFF` bytes followed by the address sixteen times.
    pub fn magic_packet(&self) -> [u8; 102] {
        let mut packet = [0xFF; 102];
        for chunk in packet[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&self.0);
        }
        packet
    }
}

impl FromStr for MacAddress {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let hex: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect();
        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BridgeError::InvalidMacAddress(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| BridgeError::InvalidMacAddress(s.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Fire-and-forget "power on" primitive.
#[async_trait]
pub trait WakeSignal: Send + Sync {
    /// Returns once the signal left this host; there is no delivery receipt.
    async fn send(&self, mac: &MacAddress) -> Result<()>;
}

/// Broadcasts magic packets over UDP.
pub struct MagicPacketSender {
    from_ip: Option<IpAddr>,
    destination: SocketAddr,
    num_packets: u32,
    interval: Duration,
}

impl MagicPacketSender {
    pub fn from_config(config: &WakeConfig) -> Result<Self> {
        let from_ip = config
            .from_ip
            .as_deref()
            .map(|ip| {
                ip.parse::<IpAddr>()
                    .map_err(|e| BridgeError::Config(format!("invalid wake.from_ip {ip}: {e}")))
            })
            .transpose()?;
        let address: IpAddr = config.broadcast_address.parse().map_err(|e| {
            BridgeError::Config(format!(
                "invalid wake.broadcast_address {}: {e}",
                config.broadcast_address
            ))
        })?;

        Ok(Self {
            from_ip,
            destination: SocketAddr::new(address, config.port),
            num_packets: config.num_packets.max(1),
            interval: Duration::from_millis(config.interval_ms),
        })
    }

    fn bind(&self) -> Result<UdpSocket> {
        let local = SocketAddr::new(
            self.from_ip.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            0,
        );
        let socket = Socket::new(Domain::for_address(local), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&local.into())?;
        Ok(UdpSocket::from_std(socket.into())?)
    }
}

#[async_trait]
impl WakeSignal for MagicPacketSender {
    async fn send(&self, mac: &MacAddress) -> Result<()> {
        let packet = mac.magic_packet();
        let socket = self
            .bind()
            .map_err(|e| BridgeError::Wake(format!("cannot open broadcast socket: {e}")))?;

        for i in 0..self.num_packets {
            if i > 0 {
                tokio::time::sleep(self.interval).await;
            }
            socket
                .send_to(&packet, self.destination)
                .await
                .map_err(|e| BridgeError::Wake(format!("send to {}: {e}", self.destination)))?;
        }
        log::debug!(
            "[Wake] sent {} magic packet(s) for {} to {}",
            self.num_packets,
            mac,
            self.destination
        );
        Ok(())
    }
}

/// Wake the TV, then give its API time to come online.
pub struct WakeSequencer {
    mac: Option<MacAddress>,
    signal: Arc<dyn WakeSignal>,
    warm_up: Duration,
}

impl WakeSequencer {
    pub fn new(mac: Option<MacAddress>, signal: Arc<dyn WakeSignal>, warm_up: Duration) -> Self {
        Self {
            mac,
            signal,
            warm_up,
        }
    }

    pub fn from_config(config: &WakeConfig) -> Result<Self> {
        let mac = config.mac_address.as_deref().map(str::parse).transpose()?;
        let signal = Arc::new(MagicPacketSender::from_config(config)?);
        Ok(Self::new(mac, signal, config.warm_up()))
    }

    pub fn is_configured(&self) -> bool {
        self.mac.is_some()
    }

    /// Send the wake signal. `Ok(false)` when no MAC address is configured.
    pub async fn wake(&self) -> Result<bool> {
        let Some(mac) = &self.mac else {
            return Ok(false);
        };
        log::info!("[Wake] waking TV at {}", mac);
        self.signal.send(mac).await?;
        Ok(true)
    }

    /// [`wake`](Self::wake), then wait out the warm-up delay if a signal went out.
    pub async fn wake_and_warm_up(&self) -> Result<bool> {
        if !self.wake().await? {
            return Ok(false);
        }
        log::debug!("[Wake] waiting {:?} for the TV to warm up", self.warm_up);
        tokio::time::sleep(self.warm_up).await;
        Ok(true)
    }
}
