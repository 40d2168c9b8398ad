//! Channel handles: convenience builders over a circuit.
//!
//! A handle does not own the channel state; the circuit does. Methods
//! build fully-formed commands for the caller to pass to
//! `VirtualCircuit::send`, filling defaults from the channel's native type
//! and count and allocating ioids and subscription ids on demand.

use calcium_codec::{
    ClearChannelRequest, ClearChannelResponse, CreateChFailResponse, CreateChanRequest,
    CreateChanResponse, EventAddRequest, EventCancelRequest, EventMask, ReadNotifyRequest,
    ServerDisconnResponse, VersionRequest, VersionResponse, WriteNotifyRequest,
};
use calcium_dbr::{DbrPayload, DbrType};
use calcium_wire::{DEFAULT_PROTOCOL_VERSION, Role};

use crate::circuit::VirtualCircuit;
use crate::error::{Error, IdKind};

fn channel_sid(circuit: &VirtualCircuit, cid: u32) -> Result<u32, Error> {
    circuit
        .channel(cid)
        .and_then(|c| c.sid)
        .ok_or(Error::Runtime("channel has no sid yet"))
}

/// Client-side handle on one channel.
#[derive(Debug, Clone)]
pub struct ClientChannel {
    cid: u32,
    name: String,
}

impl ClientChannel {
    /// Register a channel on the circuit. Allocates a cid unless one is
    /// given.
    pub fn new(
        name: &str,
        circuit: &mut VirtualCircuit,
        cid: Option<u32>,
    ) -> Result<ClientChannel, Error> {
        if circuit.our_role() != Role::Client {
            return Err(Error::Runtime("ClientChannel requires a CLIENT circuit"));
        }
        let cid = match cid {
            Some(cid) => cid,
            None => circuit.new_channel_id(),
        };
        circuit.register_channel(cid, name)?;
        Ok(ClientChannel {
            cid,
            name: name.to_string(),
        })
    }

    pub fn cid(&self) -> u32 {
        self.cid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version handshake for this channel's circuit.
    pub fn version(&self, circuit: &VirtualCircuit) -> Result<VersionRequest, Error> {
        let priority = circuit.priority().unwrap_or(0);
        Ok(VersionRequest::new(priority, DEFAULT_PROTOCOL_VERSION)?)
    }

    pub fn create(&self) -> Result<CreateChanRequest, Error> {
        Ok(CreateChanRequest::new(
            &self.name,
            self.cid,
            DEFAULT_PROTOCOL_VERSION,
        )?)
    }

    /// Build a read. Type and count default to the channel's native shape;
    /// the ioid is allocated unless given.
    pub fn read(
        &self,
        circuit: &mut VirtualCircuit,
        data_type: Option<DbrType>,
        data_count: Option<u32>,
        ioid: Option<u32>,
    ) -> Result<ReadNotifyRequest, Error> {
        let sid = channel_sid(circuit, self.cid)?;
        let channel = circuit.channel(self.cid).ok_or(Error::UnknownId {
            kind: IdKind::Cid,
            id: self.cid,
        })?;
        let data_type = data_type
            .or(channel.native_data_type)
            .ok_or(Error::Runtime("channel has no native data type yet"))?;
        let data_count = data_count.or(channel.native_data_count).unwrap_or(1);
        let ioid = match ioid {
            Some(ioid) => ioid,
            None => circuit.new_ioid(),
        };
        Ok(ReadNotifyRequest {
            data_type,
            data_count,
            sid,
            ioid,
        })
    }

    /// Build a write carrying `payload`. The ioid is allocated unless
    /// given.
    pub fn write(
        &self,
        circuit: &mut VirtualCircuit,
        payload: &DbrPayload,
        ioid: Option<u32>,
    ) -> Result<WriteNotifyRequest, Error> {
        let sid = channel_sid(circuit, self.cid)?;
        let ioid = match ioid {
            Some(ioid) => ioid,
            None => circuit.new_ioid(),
        };
        Ok(WriteNotifyRequest::new(payload, sid, ioid)?)
    }

    /// Build a subscription. The subscription id is allocated unless
    /// given.
    #[allow(clippy::too_many_arguments)]
    pub fn subscribe(
        &self,
        circuit: &mut VirtualCircuit,
        data_type: Option<DbrType>,
        data_count: Option<u32>,
        low: Option<f32>,
        high: Option<f32>,
        to: Option<f32>,
        mask: Option<EventMask>,
        subscriptionid: Option<u32>,
    ) -> Result<EventAddRequest, Error> {
        let sid = channel_sid(circuit, self.cid)?;
        let channel = circuit.channel(self.cid).ok_or(Error::UnknownId {
            kind: IdKind::Cid,
            id: self.cid,
        })?;
        let data_type = data_type
            .or(channel.native_data_type)
            .ok_or(Error::Runtime("channel has no native data type yet"))?;
        let data_count = data_count.or(channel.native_data_count).unwrap_or(1);
        let subscriptionid = match subscriptionid {
            Some(id) => id,
            None => circuit.new_subscriptionid(),
        };
        Ok(EventAddRequest {
            data_type,
            data_count,
            sid,
            subscriptionid,
            low: low.unwrap_or(0.0),
            high: high.unwrap_or(0.0),
            to: to.unwrap_or(0.0),
            mask: mask.unwrap_or(EventMask::VALUE | EventMask::ALARM),
        })
    }

    /// Build the cancel for one of this channel's subscriptions.
    pub fn unsubscribe(
        &self,
        circuit: &VirtualCircuit,
        subscriptionid: u32,
    ) -> Result<EventCancelRequest, Error> {
        let owner = circuit
            .subscription_cid(subscriptionid)
            .ok_or(Error::UnknownId {
                kind: IdKind::SubscriptionId,
                id: subscriptionid,
            })?;
        if owner != self.cid {
            return Err(Error::SubscriptionMismatch {
                subscriptionid,
                expected_cid: owner,
            });
        }
        let sid = channel_sid(circuit, self.cid)?;
        let channel = circuit.channel(self.cid).ok_or(Error::UnknownId {
            kind: IdKind::Cid,
            id: self.cid,
        })?;
        Ok(EventCancelRequest {
            data_type: channel
                .native_data_type
                .ok_or(Error::Runtime("channel has no native data type yet"))?,
            data_count: channel.native_data_count.unwrap_or(1),
            sid,
            subscriptionid,
        })
    }

    /// Build the close request. `clear` is an alias.
    pub fn disconnect(&self, circuit: &VirtualCircuit) -> Result<ClearChannelRequest, Error> {
        let sid = channel_sid(circuit, self.cid)?;
        Ok(ClearChannelRequest { sid, cid: self.cid })
    }

    pub fn clear(&self, circuit: &VirtualCircuit) -> Result<ClearChannelRequest, Error> {
        self.disconnect(circuit)
    }
}

/// Server-side handle on one channel.
#[derive(Debug, Clone)]
pub struct ServerChannel {
    cid: u32,
    name: String,
}

impl ServerChannel {
    /// Register (or adopt) the server-side view of a channel under the
    /// client-chosen cid.
    pub fn new(
        name: &str,
        circuit: &mut VirtualCircuit,
        cid: u32,
    ) -> Result<ServerChannel, Error> {
        if circuit.our_role() != Role::Server {
            return Err(Error::Runtime("ServerChannel requires a SERVER circuit"));
        }
        if circuit.channel(cid).is_none() {
            circuit.register_channel(cid, name)?;
        }
        Ok(ServerChannel {
            cid,
            name: name.to_string(),
        })
    }

    pub fn cid(&self) -> u32 {
        self.cid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> VersionResponse {
        VersionResponse::new(DEFAULT_PROTOCOL_VERSION)
    }

    /// The create answer granting `sid` and announcing the native shape.
    pub fn create(
        &self,
        data_type: DbrType,
        data_count: u32,
        sid: u32,
    ) -> CreateChanResponse {
        CreateChanResponse {
            data_type,
            data_count,
            cid: self.cid,
            sid,
        }
    }

    pub fn create_fail(&self) -> CreateChFailResponse {
        CreateChFailResponse { cid: self.cid }
    }

    /// Drop the channel unilaterally.
    pub fn disconnect(&self) -> ServerDisconnResponse {
        ServerDisconnResponse { cid: self.cid }
    }

    /// Confirm a client's clear request.
    pub fn clear(&self, circuit: &VirtualCircuit) -> Result<ClearChannelResponse, Error> {
        let sid = channel_sid(circuit, self.cid)?;
        Ok(ClearChannelResponse { sid, cid: self.cid })
    }
}
