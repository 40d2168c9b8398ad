//! The UDP-side engine: repeater registration, name searches, beacons.
//!
//! One Broadcaster serves a whole process. Searches correlate responses to
//! requests by client-allocated search cid; duplicate answers for an
//! already-correlated cid are dropped silently (several servers may host
//! the same name). Beacons are tracked per server so a restart shows up as
//! an identity change the caller can act on.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};

use bytes::{Bytes, BytesMut};

use calcium_codec::{Command, RepeaterRegisterRequest, SearchRequest, VersionRequest, read_datagram};
use calcium_wire::{
    DEFAULT_PROTOCOL_VERSION, MIN_BEACON_PERIOD, Role,
};

use crate::error::{Error, ProtocolViolation, StatePair};

/// What a server's beacons have told us so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconState {
    pub beacon_id: u32,
    pub server_port: u16,
}

/// State advances surfaced to the caller by `process_commands`.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    /// Repeater registration confirmed.
    Registered,
    /// A search was answered: `name` lives at `address`.
    SearchMatch {
        name: String,
        cid: u32,
        address: SocketAddr,
    },
    /// A known server's beacon id regressed or its port moved. Restart or
    /// relocation; the caller decides.
    ServerIdentityChanged {
        address: Ipv4Addr,
        beacon: BeaconState,
    },
}

/// Process-wide UDP engine for one role.
#[derive(Debug)]
pub struct Broadcaster {
    our_role: Role,
    registered: bool,
    unanswered_searches: HashMap<u32, String>,
    beacons: HashMap<Ipv4Addr, BeaconState>,
    next_search_id: u32,
}

impl Broadcaster {
    pub fn new(our_role: Role) -> Broadcaster {
        Broadcaster {
            our_role,
            registered: false,
            unanswered_searches: HashMap::new(),
            beacons: HashMap::new(),
            next_search_id: 0,
        }
    }

    pub fn our_role(&self) -> Role {
        self.our_role
    }

    fn their_role(&self) -> Role {
        self.our_role.other()
    }

    /// True once a RepeaterConfirmResponse has been processed.
    pub fn registered(&self) -> bool {
        self.registered
    }

    /// Searches sent but not yet answered, by search cid.
    pub fn unanswered_searches(&self) -> &HashMap<u32, String> {
        &self.unanswered_searches
    }

    /// Last beacon state seen per server host.
    pub fn beacons(&self) -> &HashMap<Ipv4Addr, BeaconState> {
        &self.beacons
    }

    /// Allocate a search cid, skipping ids still awaiting answers.
    pub fn new_search_id(&mut self) -> u32 {
        loop {
            let id = self.next_search_id;
            self.next_search_id = self.next_search_id.wrapping_add(1);
            if !self.unanswered_searches.contains_key(&id) {
                return id;
            }
        }
    }

    /// The registration command for the local repeater.
    pub fn register(&mut self, client_address: Ipv4Addr) -> RepeaterRegisterRequest {
        RepeaterRegisterRequest { client_address }
    }

    /// Build the version+search bundle for one name. Both commands must go
    /// into the same `send` call.
    pub fn search(&mut self, name: &str) -> Result<(VersionRequest, SearchRequest), Error> {
        let cid = self.new_search_id();
        let version = VersionRequest::new(0, DEFAULT_PROTOCOL_VERSION)?;
        let search = SearchRequest::new(name, cid, DEFAULT_PROTOCOL_VERSION)?;
        Ok((version, search))
    }

    fn violation(&self, we_sent: bool, command: &Command) -> Error {
        let violation = ProtocolViolation {
            command: Box::new(command.clone()),
            our_role: self.our_role,
            states: StatePair::Broadcaster {
                registered: self.registered,
            },
        };
        if we_sent {
            Error::LocalProtocol(violation)
        } else {
            Error::RemoteProtocol(violation)
        }
    }

    /// Serialize a bundle into one datagram, validating the bundle rules:
    /// a SearchRequest is only legal after a VersionRequest earlier in the
    /// same datagram.
    pub fn send(&mut self, commands: &[Command]) -> Result<Bytes, Error> {
        let mut version_seen = false;
        let mut buf = BytesMut::new();
        for command in commands {
            match command {
                Command::VersionRequest(_) | Command::VersionResponse(_) => {
                    version_seen = true;
                }
                Command::SearchRequest(c) => {
                    if self.our_role == Role::Client && !version_seen {
                        return Err(self.violation(true, command));
                    }
                    self.unanswered_searches.insert(c.cid, c.name.clone());
                }
                Command::Disconnected => return Err(self.violation(true, command)),
                _ => {}
            }
            tracing::debug!(role = %self.our_role, command = ?command, "broadcast send");
            buf.extend_from_slice(&command.to_bytes());
        }
        Ok(buf.freeze())
    }

    /// Parse one datagram from `source`. Bad datagrams fail as a whole;
    /// the caller drops them (and may ban the source).
    pub fn recv(&mut self, data: &[u8], source: SocketAddr) -> Result<Vec<Command>, Error> {
        match read_datagram(data, source, self.their_role()) {
            Ok(commands) => Ok(commands),
            Err(e) => {
                tracing::warn!(%source, error = %e, "dropping bad datagram");
                Err(Error::Validation(e))
            }
        }
    }

    /// Advance state for received commands, yielding the matches and
    /// identity changes the caller should act on.
    pub fn process_commands(&mut self, commands: &[Command]) -> Result<Vec<BroadcastEvent>, Error> {
        let mut events = Vec::new();
        for command in commands {
            tracing::debug!(role = %self.our_role, command = ?command, "broadcast recv");
            match command {
                Command::RepeaterConfirmResponse(_) => {
                    self.registered = true;
                    events.push(BroadcastEvent::Registered);
                }
                Command::SearchResponse(res) => {
                    match self.unanswered_searches.remove(&res.cid) {
                        Some(name) => match res.server_address() {
                            Some(address) => events.push(BroadcastEvent::SearchMatch {
                                name,
                                cid: res.cid,
                                address,
                            }),
                            None => {
                                // Sentinel ip but the source is unknown.
                                self.unanswered_searches.insert(res.cid, name);
                                return Err(self.violation(false, command));
                            }
                        },
                        None => {
                            // Duplicate answer from another server.
                            tracing::debug!(cid = res.cid, "dropping duplicate search response");
                        }
                    }
                }
                Command::Beacon(beacon) => {
                    if let Some(address) = beacon.server_ip() {
                        let state = BeaconState {
                            beacon_id: beacon.beacon_id,
                            server_port: beacon.server_port,
                        };
                        if let Some(previous) = self.beacons.insert(address, state) {
                            if state.beacon_id < previous.beacon_id
                                || state.server_port != previous.server_port
                            {
                                tracing::warn!(
                                    %address,
                                    beacon_id = state.beacon_id,
                                    previous_id = previous.beacon_id,
                                    "server identity changed"
                                );
                                events.push(BroadcastEvent::ServerIdentityChanged {
                                    address,
                                    beacon: state,
                                });
                            }
                        }
                    }
                }
                // Requests seen by a server-role broadcaster carry no
                // state here; the caller answers them.
                _ => {}
            }
        }
        Ok(events)
    }
}

/// The prescribed beacon cadence: start at the floor, double each step,
/// saturate at the configured maximum. The host owns the clock; this only
/// does the arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct BeaconBackoff {
    current: f64,
    max: f64,
}

impl BeaconBackoff {
    pub fn new(max_period: f64) -> BeaconBackoff {
        BeaconBackoff {
            current: MIN_BEACON_PERIOD,
            max: max_period.max(MIN_BEACON_PERIOD),
        }
    }

    /// The period to wait before the next beacon, advancing the backoff.
    pub fn next_period(&mut self) -> f64 {
        let period = self.current;
        self.current = (self.current * 2.0).min(self.max);
        period
    }

    /// Back to the floor (e.g. after an address-list change).
    pub fn reset(&mut self) {
        self.current = MIN_BEACON_PERIOD;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_to_the_cap() {
        let mut backoff = BeaconBackoff::new(15.0);
        assert_eq!(backoff.next_period(), 0.02);
        assert_eq!(backoff.next_period(), 0.04);
        assert_eq!(backoff.next_period(), 0.08);
        let mut last = 0.0;
        for _ in 0..16 {
            last = backoff.next_period();
        }
        assert_eq!(last, 15.0);
        backoff.reset();
        assert_eq!(backoff.next_period(), 0.02);
    }
}
