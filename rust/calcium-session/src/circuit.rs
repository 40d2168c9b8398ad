//! The per-peer TCP engine.
//!
//! A `VirtualCircuit` owns one receive buffer and the id tables of every
//! channel multiplexed over the connection. `send` validates and advances
//! state before handing back buffers to transmit; `recv` turns bytes into
//! commands; `process_command` advances state for commands the peer sent.
//! The engine does no I/O and holds no locks; the host owns the socket and
//! drives it from a single logical owner.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};

use calcium_codec::{AccessRights, Command, Parsed, read_from_bytestream};
use calcium_dbr::DbrType;
use calcium_wire::{MINIMUM_PROTOCOL_VERSION, Role};

use crate::error::{Error, ProtocolViolation, StatePair};
use crate::state::{
    ChannelStates, CircuitState, CircuitStates, channel_transition, circuit_transition,
    is_channel_command,
};

/// Everything the circuit knows about one channel.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub cid: u32,
    pub name: String,
    pub sid: Option<u32>,
    pub native_data_type: Option<DbrType>,
    pub native_data_count: Option<u32>,
    pub access_rights: AccessRights,
    pub states: ChannelStates,
}

impl ChannelInfo {
    fn new(cid: u32, name: &str) -> ChannelInfo {
        ChannelInfo {
            cid,
            name: name.to_string(),
            sid: None,
            native_data_type: None,
            native_data_count: None,
            access_rights: AccessRights::empty(),
            states: ChannelStates::initial(),
        }
    }
}

/// One in-flight subscription, recorded from its EventAddRequest.
#[derive(Debug, Clone, Copy)]
struct SubscriptionInfo {
    cid: u32,
    sid: u32,
    data_type: DbrType,
    data_count: u32,
}

/// Per-peer TCP connection state for one role.
#[derive(Debug)]
pub struct VirtualCircuit {
    our_role: Role,
    address: SocketAddr,
    priority: Option<u16>,
    states: CircuitStates,
    their_version: Option<u16>,
    hostname: Option<String>,
    username: Option<String>,
    channels: HashMap<u32, ChannelInfo>,
    channels_sid: HashMap<u32, u32>,
    ioids: HashMap<u32, u32>,
    subscriptions: HashMap<u32, SubscriptionInfo>,
    cancelled_subscriptions: HashSet<u32>,
    recv_buffer: BytesMut,
    next_channel_id: u32,
    next_ioid: u32,
    next_subscriptionid: u32,
}

impl PartialEq for VirtualCircuit {
    fn eq(&self, other: &Self) -> bool {
        (self.our_role, self.address, self.priority)
            == (other.our_role, other.address, other.priority)
    }
}

impl VirtualCircuit {
    /// A CLIENT circuit must know its priority up front; a SERVER circuit
    /// learns it from the first VersionRequest.
    pub fn new(
        our_role: Role,
        address: SocketAddr,
        priority: Option<u16>,
    ) -> Result<VirtualCircuit, Error> {
        match (our_role, priority) {
            (Role::Client, None) => {
                return Err(Error::Runtime("a CLIENT circuit requires a priority"));
            }
            (_, Some(p)) if p > 99 => {
                return Err(Error::Runtime("circuit priority outside 0..=99"));
            }
            _ => {}
        }
        Ok(VirtualCircuit {
            our_role,
            address,
            priority,
            states: CircuitStates::initial(),
            their_version: None,
            hostname: None,
            username: None,
            channels: HashMap::new(),
            channels_sid: HashMap::new(),
            ioids: HashMap::new(),
            subscriptions: HashMap::new(),
            cancelled_subscriptions: HashSet::new(),
            recv_buffer: BytesMut::new(),
            next_channel_id: 0,
            next_ioid: 0,
            next_subscriptionid: 0,
        })
    }

    pub fn our_role(&self) -> Role {
        self.our_role
    }

    fn their_role(&self) -> Role {
        self.our_role.other()
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn priority(&self) -> Option<u16> {
        self.priority
    }

    /// Set the priority on a SERVER circuit that has not learned it yet.
    pub fn set_priority(&mut self, priority: u16) -> Result<(), Error> {
        if priority > 99 {
            return Err(Error::Runtime("circuit priority outside 0..=99"));
        }
        self.priority = Some(priority);
        Ok(())
    }

    /// The circuit's identity: `(address, priority)`. Not defined until
    /// the priority is known.
    pub fn key(&self) -> Result<(SocketAddr, u16), Error> {
        match self.priority {
            Some(priority) => Ok((self.address, priority)),
            None => Err(Error::Runtime(
                "circuit key is undefined until the priority is known",
            )),
        }
    }

    /// The peer's announced protocol version, once seen.
    pub fn version(&self) -> Option<u16> {
        self.their_version
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// One view of the circuit state pair.
    pub fn state(&self, viewed: Role) -> CircuitState {
        self.states.get(viewed)
    }

    pub fn channel(&self, cid: u32) -> Option<&ChannelInfo> {
        self.channels.get(&cid)
    }

    pub fn channel_by_sid(&self, sid: u32) -> Option<&ChannelInfo> {
        self.channels_sid
            .get(&sid)
            .and_then(|cid| self.channels.get(cid))
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelInfo> {
        self.channels.values()
    }

    /// True while a read or write with this ioid is outstanding.
    pub fn ioid_pending(&self, ioid: u32) -> bool {
        self.ioids.contains_key(&ioid)
    }

    /// True while this subscription is active.
    pub fn subscription_active(&self, subscriptionid: u32) -> bool {
        self.subscriptions.contains_key(&subscriptionid)
    }

    // ---------------------------------------------------------------------
    // Id allocation: monotone u32 with wraparound, skipping ids in use.
    // ---------------------------------------------------------------------

    pub fn new_channel_id(&mut self) -> u32 {
        loop {
            let id = self.next_channel_id;
            self.next_channel_id = self.next_channel_id.wrapping_add(1);
            if !self.channels.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn new_ioid(&mut self) -> u32 {
        loop {
            let id = self.next_ioid;
            self.next_ioid = self.next_ioid.wrapping_add(1);
            if !self.ioids.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn new_subscriptionid(&mut self) -> u32 {
        loop {
            let id = self.next_subscriptionid;
            self.next_subscriptionid = self.next_subscriptionid.wrapping_add(1);
            if !self.subscriptions.contains_key(&id) {
                return id;
            }
        }
    }

    /// Register a channel under `cid` before its CreateChanRequest is sent.
    pub(crate) fn register_channel(&mut self, cid: u32, name: &str) -> Result<(), Error> {
        if self.channels.contains_key(&cid) {
            return Err(Error::Runtime("channel cid already in use"));
        }
        self.channels.insert(cid, ChannelInfo::new(cid, name));
        Ok(())
    }

    pub(crate) fn record_ioid(&mut self, ioid: u32, cid: u32) {
        self.ioids.insert(ioid, cid);
    }

    pub(crate) fn subscription_cid(&self, subscriptionid: u32) -> Option<u32> {
        self.subscriptions.get(&subscriptionid).map(|s| s.cid)
    }

    // ---------------------------------------------------------------------
    // The engine surface
    // ---------------------------------------------------------------------

    /// Validate `commands` against local state, advance both state-machine
    /// views, and return the buffers to transmit (header bytes and
    /// payload slices, in order).
    pub fn send(&mut self, commands: &[Command]) -> Result<Vec<Bytes>, Error> {
        let mut buffers = Vec::with_capacity(commands.len() * 2);
        for command in commands {
            self.apply(self.our_role, command)?;
            tracing::debug!(role = %self.our_role, address = %self.address, command = ?command, "send");
            if let Some((header, payload)) = command.wire() {
                buffers.push(Bytes::copy_from_slice(header.to_wire().as_slice()));
                if let Some(payload) = payload {
                    buffers.push(payload);
                }
            }
        }
        Ok(buffers)
    }

    /// Append received bytes and parse as many complete commands as are
    /// buffered. The second value is the deficit of a partially buffered
    /// command (0 if the buffer ends on a command boundary).
    ///
    /// Empty input means the peer closed the connection: the
    /// `Disconnected` sentinel is returned for the caller to process.
    pub fn recv(&mut self, data: &[u8]) -> Result<(Vec<Command>, usize), Error> {
        if data.is_empty() {
            return Ok((vec![Command::Disconnected], 0));
        }
        self.recv_buffer.extend_from_slice(data);
        let mut commands = Vec::new();
        loop {
            let their_role = self.their_role();
            match read_from_bytestream(&mut self.recv_buffer, their_role)? {
                Parsed::Command(command) => commands.push(command),
                Parsed::NeedData(needed) => {
                    let needed = if self.recv_buffer.is_empty() { 0 } else { needed };
                    return Ok((commands, needed));
                }
            }
        }
    }

    /// Advance state for one command received from the peer.
    pub fn process_command(&mut self, command: &Command) -> Result<(), Error> {
        tracing::debug!(role = %self.our_role, address = %self.address, command = ?command, "recv");
        self.apply(self.their_role(), command)
    }

    /// Abandon the circuit: every view goes to Disconnected, every channel
    /// to Closed, and all pending ids are released. Returns the sentinel
    /// command; processing it again is a no-op.
    pub fn disconnect(&mut self) -> Command {
        self.force_disconnect();
        Command::Disconnected
    }

    fn force_disconnect(&mut self) {
        self.states = CircuitStates {
            client: CircuitState::Disconnected,
            server: CircuitState::Disconnected,
        };
        for channel in self.channels.values_mut() {
            channel.states = ChannelStates {
                client: crate::state::ChannelState::Closed,
                server: crate::state::ChannelState::Closed,
            };
        }
        self.channels_sid.clear();
        self.ioids.clear();
        self.subscriptions.clear();
        self.cancelled_subscriptions.clear();
        self.recv_buffer.clear();
        tracing::debug!(role = %self.our_role, address = %self.address, "circuit disconnected");
    }

    // ---------------------------------------------------------------------
    // State advance
    // ---------------------------------------------------------------------

    fn violation(&self, we_sent: bool, command: &Command, states: StatePair) -> Error {
        let violation = ProtocolViolation {
            command: Box::new(command.clone()),
            our_role: self.our_role,
            states,
        };
        if we_sent {
            Error::LocalProtocol(violation)
        } else {
            Error::RemoteProtocol(violation)
        }
    }

    fn circuit_violation(&self, we_sent: bool, command: &Command) -> Error {
        self.violation(
            we_sent,
            command,
            StatePair::Circuit {
                client: self.states.client,
                server: self.states.server,
            },
        )
    }

    fn channel_violation(&self, we_sent: bool, command: &Command, states: ChannelStates) -> Error {
        self.violation(
            we_sent,
            command,
            StatePair::Channel {
                client: states.client,
                server: states.server,
            },
        )
    }

    fn apply(&mut self, sender: Role, command: &Command) -> Result<(), Error> {
        let we_sent = sender == self.our_role;

        if matches!(command, Command::Disconnected) {
            if we_sent {
                return Err(self.circuit_violation(we_sent, command));
            }
            self.force_disconnect();
            return Ok(());
        }

        // Version checks precede the machine step so their errors name the
        // real cause rather than a generic transition failure.
        match command {
            Command::VersionRequest(req) => {
                if we_sent {
                    if self.priority != Some(req.priority) {
                        return Err(self.circuit_violation(we_sent, command));
                    }
                } else if req.version < MINIMUM_PROTOCOL_VERSION {
                    return Err(self.circuit_violation(we_sent, command));
                }
            }
            Command::VersionResponse(res) => {
                if !we_sent && res.version < MINIMUM_PROTOCOL_VERSION {
                    return Err(self.circuit_violation(we_sent, command));
                }
            }
            _ => {}
        }

        let next_client = circuit_transition(Role::Client, self.states.client, command);
        let next_server = circuit_transition(Role::Server, self.states.server, command);
        let (next_client, next_server) = match (next_client, next_server) {
            (Some(client), Some(server)) => (client, server),
            _ => return Err(self.circuit_violation(we_sent, command)),
        };

        if is_channel_command(command) {
            self.apply_channel_command(we_sent, command)?;
        } else {
            match command {
                Command::VersionRequest(req) => {
                    if self.priority.is_none() {
                        self.priority = Some(req.priority);
                    }
                    if !we_sent {
                        self.their_version = Some(req.version);
                    }
                }
                Command::VersionResponse(res) => {
                    if !we_sent {
                        self.their_version = Some(res.version);
                    }
                }
                Command::HostNameRequest(req) => self.hostname = Some(req.name.clone()),
                Command::ClientNameRequest(req) => self.username = Some(req.name.clone()),
                Command::ErrorResponse(res) => {
                    if !we_sent {
                        tracing::warn!(
                            cid = res.cid,
                            status = res.status,
                            message = %res.error_message,
                            "peer reported an error"
                        );
                    }
                }
                _ => {}
            }
        }

        self.states.client = next_client;
        self.states.server = next_server;
        Ok(())
    }

    fn lookup_cid(&self, we_sent: bool, command: &Command, cid: u32) -> Result<u32, Error> {
        if self.channels.contains_key(&cid) {
            Ok(cid)
        } else {
            Err(self.circuit_violation(we_sent, command))
        }
    }

    fn lookup_sid(&self, we_sent: bool, command: &Command, sid: u32) -> Result<u32, Error> {
        match self.channels_sid.get(&sid) {
            Some(&cid) => Ok(cid),
            None => Err(self.circuit_violation(we_sent, command)),
        }
    }

    fn lookup_ioid(&self, we_sent: bool, command: &Command, ioid: u32) -> Result<u32, Error> {
        match self.ioids.get(&ioid) {
            Some(&cid) => Ok(cid),
            None => Err(self.circuit_violation(we_sent, command)),
        }
    }

    fn apply_channel_command(&mut self, we_sent: bool, command: &Command) -> Result<(), Error> {
        // Resolve the target channel and check id consistency. Nothing is
        // mutated until every check has passed.
        let cid = match command {
            Command::CreateChanRequest(c) => {
                // A server materializes the channel when the request lands.
                if !we_sent
                    && self.our_role == Role::Server
                    && !self.channels.contains_key(&c.cid)
                {
                    self.channels.insert(c.cid, ChannelInfo::new(c.cid, &c.name));
                }
                self.lookup_cid(we_sent, command, c.cid)?
            }
            Command::CreateChanResponse(c) => self.lookup_cid(we_sent, command, c.cid)?,
            Command::CreateChFailResponse(c) => self.lookup_cid(we_sent, command, c.cid)?,
            Command::AccessRightsResponse(c) => self.lookup_cid(we_sent, command, c.cid)?,
            Command::ServerDisconnResponse(c) => self.lookup_cid(we_sent, command, c.cid)?,
            Command::ClearChannelRequest(c) => {
                let cid = self.lookup_sid(we_sent, command, c.sid)?;
                if cid != c.cid {
                    return Err(self.circuit_violation(we_sent, command));
                }
                cid
            }
            Command::ClearChannelResponse(c) => {
                let cid = self.lookup_sid(we_sent, command, c.sid)?;
                if cid != c.cid {
                    return Err(self.circuit_violation(we_sent, command));
                }
                cid
            }
            Command::ReadRequest(c) => self.lookup_sid(we_sent, command, c.sid)?,
            Command::ReadNotifyRequest(c) => self.lookup_sid(we_sent, command, c.sid)?,
            Command::WriteRequest(c) => self.lookup_sid(we_sent, command, c.sid)?,
            Command::WriteNotifyRequest(c) => self.lookup_sid(we_sent, command, c.sid)?,
            Command::EventAddRequest(c) => self.lookup_sid(we_sent, command, c.sid)?,
            Command::ReadResponse(c) => self.lookup_ioid(we_sent, command, c.ioid)?,
            Command::ReadNotifyResponse(c) => self.lookup_ioid(we_sent, command, c.ioid)?,
            Command::WriteNotifyResponse(c) => self.lookup_ioid(we_sent, command, c.ioid)?,
            Command::EventAddResponse(c) => match self.subscriptions.get(&c.subscriptionid) {
                Some(sub) => {
                    // The server must echo the subscribed shape exactly.
                    if sub.data_type != c.data_type || sub.data_count != c.data_count {
                        let states = self.channels[&sub.cid].states;
                        return Err(self.channel_violation(we_sent, command, states));
                    }
                    sub.cid
                }
                None => {
                    if self.cancelled_subscriptions.contains(&c.subscriptionid) {
                        // Stale update racing a completed cancel.
                        tracing::debug!(
                            subscriptionid = c.subscriptionid,
                            "dropping update for cancelled subscription"
                        );
                        return Ok(());
                    }
                    return Err(self.circuit_violation(we_sent, command));
                }
            },
            Command::EventCancelRequest(c) => match self.subscriptions.get(&c.subscriptionid) {
                Some(sub) => {
                    if sub.sid != c.sid {
                        let states = self.channels[&sub.cid].states;
                        return Err(self.channel_violation(we_sent, command, states));
                    }
                    sub.cid
                }
                None => return Err(self.circuit_violation(we_sent, command)),
            },
            Command::EventCancelResponse(c) => match self.subscriptions.get(&c.subscriptionid) {
                Some(sub) => sub.cid,
                None => return Err(self.circuit_violation(we_sent, command)),
            },
            _ => unreachable!("is_channel_command and this list agree"),
        };

        // Step both channel views.
        let states = self.channels[&cid].states;
        let next_client = channel_transition(Role::Client, states.client, command);
        let next_server = channel_transition(Role::Server, states.server, command);
        let (next_client, next_server) = match (next_client, next_server) {
            (Some(client), Some(server)) => (client, server),
            _ => return Err(self.channel_violation(we_sent, command, states)),
        };

        // Commit: id-table bookkeeping plus the new states.
        match command {
            Command::CreateChanResponse(c) => {
                self.channels_sid.insert(c.sid, cid);
                if let Some(channel) = self.channels.get_mut(&cid) {
                    channel.sid = Some(c.sid);
                    channel.native_data_type = Some(c.data_type);
                    channel.native_data_count = Some(c.data_count);
                }
            }
            Command::AccessRightsResponse(c) => {
                if let Some(channel) = self.channels.get_mut(&cid) {
                    channel.access_rights = c.access_rights;
                }
            }
            Command::ReadRequest(c) => self.record_ioid(c.ioid, cid),
            Command::ReadNotifyRequest(c) => self.record_ioid(c.ioid, cid),
            Command::WriteNotifyRequest(c) => self.record_ioid(c.ioid, cid),
            Command::ReadResponse(c) => {
                self.ioids.remove(&c.ioid);
            }
            Command::ReadNotifyResponse(c) => {
                self.ioids.remove(&c.ioid);
            }
            Command::WriteNotifyResponse(c) => {
                self.ioids.remove(&c.ioid);
            }
            Command::EventAddRequest(c) => {
                self.subscriptions.insert(
                    c.subscriptionid,
                    SubscriptionInfo {
                        cid,
                        sid: c.sid,
                        data_type: c.data_type,
                        data_count: c.data_count,
                    },
                );
                self.cancelled_subscriptions.remove(&c.subscriptionid);
            }
            Command::EventCancelResponse(c) => {
                self.subscriptions.remove(&c.subscriptionid);
                self.cancelled_subscriptions.insert(c.subscriptionid);
            }
            Command::ClearChannelResponse(_) | Command::ServerDisconnResponse(_) => {
                self.release_channel_ids(cid);
            }
            _ => {}
        }

        if let Some(channel) = self.channels.get_mut(&cid) {
            channel.states = ChannelStates {
                client: next_client,
                server: next_server,
            };
        }
        Ok(())
    }

    /// Drop the sid mapping and any pending work tied to a closed channel.
    fn release_channel_ids(&mut self, cid: u32) {
        if let Some(channel) = self.channels.get(&cid) {
            if let Some(sid) = channel.sid {
                self.channels_sid.remove(&sid);
            }
        }
        self.ioids.retain(|_, owner| *owner != cid);
        self.subscriptions.retain(|_, sub| sub.cid != cid);
    }
}
