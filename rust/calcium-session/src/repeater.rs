//! The beacon repeater, as pure fan-out state.
//!
//! The repeater is a separate local process whose sole duty is to forward
//! server beacons to every client on the host. This type holds its
//! decision logic; the host binds the UDP socket and transmits whatever
//! `process_datagram` returns.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;

use calcium_codec::{Command, RepeaterConfirmResponse, command_id};
use calcium_wire::MessageHeader;

/// Local fan-out state: the set of registered client ports.
#[derive(Debug)]
pub struct Repeater {
    local_host: IpAddr,
    clients: Vec<SocketAddr>,
}

impl Repeater {
    pub fn new(local_host: IpAddr) -> Repeater {
        Repeater {
            local_host,
            clients: Vec::new(),
        }
    }

    pub fn clients(&self) -> &[SocketAddr] {
        &self.clients
    }

    fn is_registration(data: &[u8]) -> bool {
        // Old clients register with an empty datagram.
        if data.is_empty() {
            return true;
        }
        matches!(
            MessageHeader::parse(data),
            Ok((header, _)) if header.command == command_id::REPEATER_REGISTER
        )
    }

    /// Decide what to transmit in reaction to one datagram. Returns
    /// `(destination, payload)` pairs.
    ///
    /// A registration from a local source is confirmed to the sender and
    /// announced (as an empty datagram) to everyone else; anything else is
    /// forwarded verbatim to every registered client except its source.
    pub fn process_datagram(&mut self, data: &[u8], source: SocketAddr) -> Vec<(SocketAddr, Bytes)> {
        if Self::is_registration(data) {
            if source.ip() != self.local_host && !source.ip().is_loopback() {
                tracing::warn!(%source, "ignoring registration from non-local source");
                return Vec::new();
            }
            let mut out = Vec::with_capacity(self.clients.len() + 1);
            let confirmation = Command::from(RepeaterConfirmResponse {
                repeater_address: match self.local_host {
                    IpAddr::V4(ip) => ip,
                    IpAddr::V6(_) => std::net::Ipv4Addr::LOCALHOST,
                },
            });
            out.push((source, confirmation.to_bytes()));
            for &client in &self.clients {
                if client != source {
                    out.push((client, Bytes::new()));
                }
            }
            if !self.clients.contains(&source) {
                self.clients.push(source);
                tracing::debug!(%source, "registered repeater client");
            }
            out
        } else {
            self.clients
                .iter()
                .filter(|&&client| client != source)
                .map(|&client| (client, Bytes::copy_from_slice(data)))
                .collect()
        }
    }

    /// Forget a client whose port came back unreachable.
    pub fn remove_client(&mut self, client: SocketAddr) {
        self.clients.retain(|&c| c != client);
    }
}
