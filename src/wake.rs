//! Wake-on-LAN signalling
//!
//! A wake signal is a "magic packet": six `0xFF` bytes followed by the target's
//! MAC address repeated sixteen times, broadcast over UDP. Sending it only tells
//! us the datagram left this host. Whether the backend actually woke up is
//! learned later through health probes.

use async_trait::async_trait;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Size of a magic packet in bytes
pub const MAGIC_PACKET_LEN: usize = 6 + 16 * 6;

/// Result of trying to send a wake signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOutcome {
    /// At least one magic packet was handed to the network stack
    Sent,
    /// No packet could be sent
    SendFailed,
}

/// Something that can ask a sleeping machine to power on
#[async_trait]
pub trait WakeSignaler: Send + Sync {
    /// Emit a wake signal for the given hardware address
    async fn send(&self, mac: MacAddress) -> WakeOutcome;
}

/// Error returned when parsing a MAC address
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address '{0}' (expected six hex octets, e.g. 00:11:22:33:44:55)")]
pub struct MacParseError(String);

/// A 48-bit hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Build the magic packet that wakes this address
    pub fn magic_packet(&self) -> [u8; MAGIC_PACKET_LEN] {
        let mut packet = [0xFFu8; MAGIC_PACKET_LEN];
        for chunk in packet[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&self.0);
        }
        packet
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    /// Accepts `aa:bb:cc:dd:ee:ff`, `aa-bb-cc-dd-ee-ff` and `aabbccddeeff`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || MacParseError(s.to_string());
        let trimmed = s.trim();

        let hex: String = if trimmed.contains(':') || trimmed.contains('-') {
            let parts: Vec<&str> = trimmed.split([':', '-']).collect();
            if parts.len() != 6 || parts.iter().any(|p| p.len() != 2) {
                return Err(err());
            }
            parts.concat()
        } else {
            trimmed.to_string()
        };

        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

/// Transmission settings for magic packets
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Where packets are sent (normally the limited broadcast address)
    pub target: SocketAddrV4,
    /// Packets per wake signal
    pub packets: u32,
    /// Spacing between packets
    pub packet_interval: Duration,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            target: SocketAddrV4::new(Ipv4Addr::BROADCAST, 9),
            packets: 3,
            packet_interval: Duration::from_millis(100),
        }
    }
}

/// Sends magic packets over UDP
pub struct MagicPacketSender {
    config: WakeConfig,
}

impl MagicPacketSender {
    pub fn new(config: WakeConfig) -> Self {
        Self { config }
    }

    async fn open_socket(&self) -> std::io::Result<UdpSocket> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
        socket.set_broadcast(true)?;
        Ok(socket)
    }
}

#[async_trait]
impl WakeSignaler for MagicPacketSender {
    async fn send(&self, mac: MacAddress) -> WakeOutcome {
        let socket = match self.open_socket().await {
            Ok(socket) => socket,
            Err(e) => {
                warn!(%mac, error = %e, "Failed to open socket for magic packet");
                return WakeOutcome::SendFailed;
            }
        };

        let packet = mac.magic_packet();
        let mut sent = 0u32;

        for i in 0..self.config.packets {
            if i > 0 {
                tokio::time::sleep(self.config.packet_interval).await;
            }
            match socket.send_to(&packet, self.config.target).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    debug!(%mac, target = %self.config.target, error = %e, "Magic packet send failed");
                }
            }
        }

        if sent == 0 {
            warn!(%mac, target = %self.config.target, "Error sending magic packet");
            WakeOutcome::SendFailed
        } else {
            debug!(%mac, target = %self.config.target, sent, "Magic packet sent");
            WakeOutcome::Sent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mac_formats() {
        let expected = MacAddress::new([0x00, 0x11, 0x22, 0xaa, 0xbb, 0xcc]);

        assert_eq!("00:11:22:aa:bb:cc".parse::<MacAddress>().unwrap(), expected);
        assert_eq!("00-11-22-AA-BB-CC".parse::<MacAddress>().unwrap(), expected);
        assert_eq!("001122AaBbCc".parse::<MacAddress>().unwrap(), expected);
        assert_eq!(" 00:11:22:aa:bb:cc\n".parse::<MacAddress>().unwrap(), expected);
    }

    #[test]
    fn test_parse_mac_rejects_garbage() {
        for bad in [
            "",
            "00:11:22:33:44",
            "00:11:22:33:44:55:66",
            "0:11:22:33:44:55",
            "00:11:22:33:44:zz",
            "0011223344",
            "00112233445g",
        ] {
            assert!(bad.parse::<MacAddress>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_mac_display() {
        let mac = MacAddress::new([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        assert_eq!(mac.to_string(), "de:ad:be:ef:00:01");
    }

    #[test]
    fn test_magic_packet_layout() {
        let mac = MacAddress::new([1, 2, 3, 4, 5, 6]);
        let packet = mac.magic_packet();

        assert_eq!(packet.len(), 102);
        assert_eq!(&packet[..6], &[0xFF; 6]);
        for repetition in packet[6..].chunks(6) {
            assert_eq!(repetition, &[1, 2, 3, 4, 5, 6]);
        }
    }

    #[tokio::test]
    async fn test_sender_delivers_packets() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = MagicPacketSender::new(WakeConfig {
            target: SocketAddrV4::new(Ipv4Addr::LOCALHOST, receiver.local_addr().unwrap().port()),
            packets: 3,
            packet_interval: Duration::from_millis(5),
        });
        let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();

        assert_eq!(sender.send(mac).await, WakeOutcome::Sent);

        let mut buf = [0u8; 256];
        for _ in 0..3 {
            let (n, _) = tokio::time::timeout(Duration::from_secs(1), receiver.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&buf[..n], &mac.magic_packet()[..]);
        }
    }

    #[tokio::test]
    async fn test_sender_reports_failure() {
        // UDP port 0 is not a valid destination, so every send is refused
        let sender = MagicPacketSender::new(WakeConfig {
            target: "127.0.0.1:0".parse().unwrap(),
            packets: 2,
            packet_interval: Duration::from_millis(1),
        });
        let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();

        assert_eq!(sender.send(mac).await, WakeOutcome::SendFailed);
    }
}
