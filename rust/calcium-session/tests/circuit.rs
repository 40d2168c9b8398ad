//! Circuit and channel state-machine behavior, driven through real bytes:
//! everything sent is serialized, received, and processed by the peer
//! circuit the way an I/O host would.

use std::net::SocketAddr;

use calcium_codec::{
    Command, CreateChFailResponse, ErrorResponse, EventAddResponse, EventCancelRequest,
    ReadNotifyRequest, ReadNotifyResponse, VersionRequest, VersionResponse, WriteNotifyResponse,
};
use calcium_dbr::{DbrPayload, DbrType, DbrValue};
use calcium_session::{
    ChannelState, CircuitState, ClientChannel, Error, ServerChannel, VirtualCircuit,
};
use calcium_wire::{DEFAULT_PROTOCOL_VERSION, Role};

fn addr() -> SocketAddr {
    "127.0.0.1:5064".parse().unwrap()
}

/// `RUST_LOG=calcium_session=debug cargo test` shows the transition log.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Send commands on one circuit and deliver them to the other.
fn pump(from: &mut VirtualCircuit, to: &mut VirtualCircuit, commands: &[Command]) {
    let buffers = from.send(commands).unwrap();
    let mut wire = Vec::new();
    for buffer in buffers {
        wire.extend_from_slice(&buffer);
    }
    let (received, needed) = to.recv(&wire).unwrap();
    assert_eq!(needed, 0);
    assert_eq!(received.len(), commands.len());
    for command in &received {
        to.process_command(command).unwrap();
    }
}

fn circuit_pair() -> (VirtualCircuit, VirtualCircuit) {
    init_tracing();
    let mut cli = VirtualCircuit::new(Role::Client, addr(), Some(0)).unwrap();
    let mut srv = VirtualCircuit::new(Role::Server, addr(), None).unwrap();
    pump(
        &mut cli,
        &mut srv,
        &[Command::from(
            VersionRequest::new(0, DEFAULT_PROTOCOL_VERSION).unwrap(),
        )],
    );
    pump(
        &mut srv,
        &mut cli,
        &[Command::from(VersionResponse::new(DEFAULT_PROTOCOL_VERSION))],
    );
    assert_eq!(cli.state(Role::Client), CircuitState::Connected);
    assert_eq!(srv.state(Role::Server), CircuitState::Connected);
    (cli, srv)
}

fn make_channels(
    cli: &mut VirtualCircuit,
    srv: &mut VirtualCircuit,
    data_type: DbrType,
    data_count: u32,
    name: &str,
) -> (ClientChannel, ServerChannel) {
    let cli_channel = ClientChannel::new(name, cli, None).unwrap();
    let req = cli_channel.create().unwrap();
    let cid = req.cid;
    pump(cli, srv, &[Command::from(req)]);

    let srv_channel = ServerChannel::new(name, srv, cid).unwrap();
    let sid = srv.new_channel_id();
    let res = srv_channel.create(data_type, data_count, sid);
    pump(srv, cli, &[Command::from(res)]);

    assert_eq!(
        cli.channel(cid).unwrap().states.client,
        ChannelState::Connected
    );
    (cli_channel, srv_channel)
}

#[test]
fn counter_skipping() {
    let mut cli = VirtualCircuit::new(Role::Client, addr(), Some(0)).unwrap();
    ClientChannel::new("placeholder", &mut cli, Some(2)).unwrap();
    assert_eq!(cli.new_channel_id(), 0);
    assert_eq!(cli.new_channel_id(), 1);
    // 2 is occupied
    assert_eq!(cli.new_channel_id(), 3);
}

#[test]
fn ioid_and_subscription_ids_skip_outstanding_ones(
) {
    let (mut cli, mut srv) = circuit_pair();
    let (channel, _) = make_channels(&mut cli, &mut srv, DbrType::Long, 1, "a");

    let read = channel.read(&mut cli, None, None, Some(0)).unwrap();
    cli.send(&[Command::from(read)]).unwrap();
    assert!(cli.ioid_pending(0));
    assert_eq!(cli.new_ioid(), 1);

    let sub = channel
        .subscribe(&mut cli, None, None, None, None, None, None, Some(0))
        .unwrap();
    cli.send(&[Command::from(sub)]).unwrap();
    assert!(cli.subscription_active(0));
    assert_eq!(cli.new_subscriptionid(), 1);
}

#[test]
fn circuit_properties() {
    // A CLIENT circuit must know its priority at construction.
    assert!(matches!(
        VirtualCircuit::new(Role::Client, addr(), None),
        Err(Error::Runtime(_))
    ));

    // A SERVER circuit does not, but has no key until it learns one.
    let mut srv = VirtualCircuit::new(Role::Server, addr(), None).unwrap();
    assert!(srv.key().is_err());
    srv.set_priority(1).unwrap();
    assert_eq!(srv.key().unwrap(), (addr(), 1));

    // VersionRequest priority must match the circuit's.
    let mut cli = VirtualCircuit::new(Role::Client, addr(), Some(1)).unwrap();
    let wrong = Command::from(VersionRequest::new(2, DEFAULT_PROTOCOL_VERSION).unwrap());
    assert!(matches!(
        cli.send(std::slice::from_ref(&wrong)),
        Err(Error::LocalProtocol(_))
    ));
}

#[test]
fn circuit_equality() {
    let a = VirtualCircuit::new(Role::Client, addr(), Some(1)).unwrap();
    let b = VirtualCircuit::new(Role::Client, addr(), Some(1)).unwrap();
    let c = VirtualCircuit::new(Role::Client, addr(), Some(2)).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn ancient_peer_version_is_fatal() {
    let mut cli = VirtualCircuit::new(Role::Client, addr(), Some(0)).unwrap();
    cli.send(&[Command::from(
        VersionRequest::new(0, DEFAULT_PROTOCOL_VERSION).unwrap(),
    )])
    .unwrap();
    let old = Command::from(VersionResponse::new(10));
    let (commands, _) = cli.recv(&old.to_bytes()).unwrap();
    assert!(matches!(
        cli.process_command(&commands[0]),
        Err(Error::RemoteProtocol(_))
    ));
}

#[test]
fn unknown_id_errors() {
    let (mut cli, _srv) = circuit_pair();

    // Read on a sid that does not exist.
    let read = Command::from(ReadNotifyRequest {
        data_type: DbrType::Long,
        data_count: 1,
        sid: 1,
        ioid: 1,
    });
    assert!(matches!(
        cli.send(std::slice::from_ref(&read)),
        Err(Error::LocalProtocol(_))
    ));

    // A reading with an unknown ioid.
    let payload = DbrPayload::plain(DbrValue::Long(vec![1])).unwrap();
    let res = Command::from(ReadNotifyResponse::new(&payload, 1, 1).unwrap());
    let (commands, _) = cli.recv(&res.to_bytes()).unwrap();
    assert!(matches!(
        cli.process_command(&commands[0]),
        Err(Error::RemoteProtocol(_))
    ));

    // An event with an unknown subscription id.
    let res = Command::from(EventAddResponse::new(&payload, 1, 1).unwrap());
    let (commands, _) = cli.recv(&res.to_bytes()).unwrap();
    assert!(matches!(
        cli.process_command(&commands[0]),
        Err(Error::RemoteProtocol(_))
    ));
}

#[test]
fn scalar_read_releases_the_ioid() {
    let (mut cli, mut srv) = circuit_pair();
    let (channel, _) = make_channels(&mut cli, &mut srv, DbrType::Double, 1, "a");

    let read = channel.read(&mut cli, None, None, Some(12)).unwrap();
    pump(&mut cli, &mut srv, &[Command::from(read)]);
    assert!(cli.ioid_pending(12));
    assert!(srv.ioid_pending(12));

    let payload = DbrPayload::plain(DbrValue::Double(vec![3.14])).unwrap();
    let res = ReadNotifyResponse::new(&payload, 1, 12).unwrap();
    pump(&mut srv, &mut cli, &[Command::from(res)]);
    assert!(!cli.ioid_pending(12));
    assert!(!srv.ioid_pending(12));
}

#[test]
fn write_roundtrip() {
    let (mut cli, mut srv) = circuit_pair();
    let (channel, _) = make_channels(&mut cli, &mut srv, DbrType::Int, 1, "a");

    let payload = DbrPayload::plain(DbrValue::Int(vec![4])).unwrap();
    let write = channel.write(&mut cli, &payload, Some(13)).unwrap();
    pump(&mut cli, &mut srv, &[Command::from(write)]);

    let res = WriteNotifyResponse {
        data_type: DbrType::Int,
        data_count: 1,
        status: 1,
        ioid: 13,
    };
    pump(&mut srv, &mut cli, &[Command::from(res)]);
    assert!(!cli.ioid_pending(13));
}

#[test]
fn mismatched_event_add_responses() {
    let (mut cli, mut srv) = circuit_pair();
    let (channel, _) = make_channels(&mut cli, &mut srv, DbrType::Long, 1, "a");

    let req = channel
        .subscribe(&mut cli, None, None, None, None, None, None, Some(1))
        .unwrap();
    pump(&mut cli, &mut srv, &[Command::from(req)]);

    // Good response.
    let payload = DbrPayload::plain(DbrValue::Long(vec![1])).unwrap();
    let good = EventAddResponse::new(&payload, 1, 1).unwrap();
    pump(&mut srv, &mut cli, &[Command::from(good)]);

    // Wrong data_type.
    let wrong_type = DbrPayload::plain(DbrValue::Double(vec![1.0])).unwrap();
    let res = Command::from(EventAddResponse::new(&wrong_type, 1, 1).unwrap());
    let (commands, _) = cli.recv(&res.to_bytes()).unwrap();
    assert!(matches!(
        cli.process_command(&commands[0]),
        Err(Error::RemoteProtocol(_))
    ));

    // Wrong data_count.
    let wrong_count = DbrPayload::plain(DbrValue::Long(vec![1, 2])).unwrap();
    let res = Command::from(EventAddResponse::new(&wrong_count, 1, 1).unwrap());
    let (commands, _) = cli.recv(&res.to_bytes()).unwrap();
    assert!(matches!(
        cli.process_command(&commands[0]),
        Err(Error::RemoteProtocol(_))
    ));

    // Cancel with the wrong sid for this subscription.
    let bad_cancel = Command::from(EventCancelRequest {
        data_type: DbrType::Long,
        data_count: 1,
        sid: 999,
        subscriptionid: 1,
    });
    assert!(matches!(
        cli.send(std::slice::from_ref(&bad_cancel)),
        Err(Error::LocalProtocol(_))
    ));
}

#[test]
fn unsubscribe_validations() {
    let (mut cli, mut srv) = circuit_pair();
    let (channel1, _) = make_channels(&mut cli, &mut srv, DbrType::Long, 1, "a");
    let (channel2, _) = make_channels(&mut cli, &mut srv, DbrType::Long, 1, "b");

    let req1 = channel1
        .subscribe(&mut cli, None, None, None, None, None, None, None)
        .unwrap();
    cli.send(&[Command::from(req1)]).unwrap();
    let req2 = channel2
        .subscribe(&mut cli, None, None, None, None, None, None, None)
        .unwrap();
    cli.send(&[Command::from(req2)]).unwrap();

    // Unknown subscription id.
    assert!(matches!(
        channel1.unsubscribe(&cli, 67),
        Err(Error::UnknownId { .. })
    ));
    // Another channel's subscription id.
    assert!(matches!(
        channel1.unsubscribe(&cli, req2.subscriptionid),
        Err(Error::SubscriptionMismatch { .. })
    ));
    // The right one.
    assert!(channel1.unsubscribe(&cli, req1.subscriptionid).is_ok());
}

#[test]
fn subscription_cancel_roundtrip_then_silent_drop() {
    let (mut cli, mut srv) = circuit_pair();
    let (channel, _) = make_channels(&mut cli, &mut srv, DbrType::Long, 1, "a");

    let req = channel
        .subscribe(&mut cli, None, None, None, None, None, None, Some(7))
        .unwrap();
    pump(&mut cli, &mut srv, &[Command::from(req)]);

    // The subscription re-delivers for as long as it lives.
    let payload = DbrPayload::plain(DbrValue::Long(vec![3])).unwrap();
    for _ in 0..3 {
        let update = EventAddResponse::new(&payload, 1, 7).unwrap();
        pump(&mut srv, &mut cli, &[Command::from(update)]);
    }
    assert!(cli.subscription_active(7));

    let cancel = channel.unsubscribe(&cli, 7).unwrap();
    pump(&mut cli, &mut srv, &[Command::from(cancel)]);

    let confirm = calcium_codec::EventCancelResponse {
        data_type: DbrType::Long,
        sid: channel_sid(&cli, &channel),
        subscriptionid: 7,
    };
    pump(&mut srv, &mut cli, &[Command::from(confirm)]);
    assert!(!cli.subscription_active(7));

    // A stale update racing the completed cancel is dropped silently.
    let stale = Command::from(EventAddResponse::new(&payload, 1, 7).unwrap());
    let (commands, _) = cli.recv(&stale.to_bytes()).unwrap();
    cli.process_command(&commands[0]).unwrap();
}

fn channel_sid(circuit: &VirtualCircuit, channel: &ClientChannel) -> u32 {
    circuit.channel(channel.cid()).unwrap().sid.unwrap()
}

#[test]
fn error_response_passes_through() {
    let (mut cli, mut srv) = circuit_pair();
    let (channel, srv_channel) = make_channels(&mut cli, &mut srv, DbrType::Long, 1, "a");

    let read = channel.read(&mut cli, None, None, None).unwrap();
    pump(&mut cli, &mut srv, &[Command::from(read)]);

    let (header, _) = Command::from(read).wire().unwrap();
    let error = ErrorResponse {
        original_request: header,
        cid: srv_channel.cid(),
        status: 42,
        error_message: "Tom missed the train.".into(),
    };
    pump(&mut srv, &mut cli, &[Command::from(error)]);
}

#[test]
fn create_channel_failure() {
    let (mut cli, mut srv) = circuit_pair();
    let cli_channel = ClientChannel::new("doomed", &mut cli, None).unwrap();
    let req = cli_channel.create().unwrap();
    let cid = req.cid;
    pump(&mut cli, &mut srv, &[Command::from(req)]);
    let srv_channel = ServerChannel::new("doomed", &mut srv, cid).unwrap();

    srv.send(&[Command::from(srv_channel.create_fail())]).unwrap();
    assert_eq!(srv.channel(cid).unwrap().states.client, ChannelState::Failed);
    assert_eq!(srv.channel(cid).unwrap().states.server, ChannelState::Failed);
    assert_eq!(
        cli.channel(cid).unwrap().states.client,
        ChannelState::AwaitCreateChanResponse
    );

    let fail = Command::from(CreateChFailResponse { cid });
    let (commands, _) = cli.recv(&fail.to_bytes()).unwrap();
    cli.process_command(&commands[0]).unwrap();
    assert_eq!(cli.channel(cid).unwrap().states.client, ChannelState::Failed);
    assert_eq!(cli.channel(cid).unwrap().states.server, ChannelState::Failed);
}

#[test]
fn server_disconn_closes_the_channel() {
    let (mut cli, mut srv) = circuit_pair();
    let (cli_channel, srv_channel) = make_channels(&mut cli, &mut srv, DbrType::Long, 1, "a");
    let cid = cli_channel.cid();

    srv.send(&[Command::from(srv_channel.disconnect())]).unwrap();
    assert_eq!(srv.channel(cid).unwrap().states.client, ChannelState::Closed);
    assert_eq!(srv.channel(cid).unwrap().states.server, ChannelState::Closed);
    assert_eq!(
        cli.channel(cid).unwrap().states.client,
        ChannelState::Connected
    );

    let disconn = Command::from(calcium_codec::ServerDisconnResponse { cid });
    let (commands, _) = cli.recv(&disconn.to_bytes()).unwrap();
    cli.process_command(&commands[0]).unwrap();
    assert_eq!(cli.channel(cid).unwrap().states.client, ChannelState::Closed);
    assert_eq!(cli.channel(cid).unwrap().states.server, ChannelState::Closed);
}

#[test]
fn clear_channel_roundtrip() {
    let (mut cli, mut srv) = circuit_pair();
    let (cli_channel, srv_channel) = make_channels(&mut cli, &mut srv, DbrType::Long, 1, "a");
    let cid = cli_channel.cid();

    // Request to clear.
    let clear = cli_channel.clear(&cli).unwrap();
    let buffers = cli.send(&[Command::from(clear)]).unwrap();
    assert_eq!(cli.channel(cid).unwrap().states.client, ChannelState::MustClose);
    assert_eq!(cli.channel(cid).unwrap().states.server, ChannelState::MustClose);

    let mut wire = Vec::new();
    for buffer in buffers {
        wire.extend_from_slice(&buffer);
    }
    let (commands, _) = srv.recv(&wire).unwrap();
    for command in &commands {
        srv.process_command(command).unwrap();
    }
    assert_eq!(srv.channel(cid).unwrap().states.client, ChannelState::MustClose);

    // Confirmation.
    let confirm = srv_channel.clear(&srv).unwrap();
    pump(&mut srv, &mut cli, &[Command::from(confirm)]);
    assert_eq!(srv.channel(cid).unwrap().states.server, ChannelState::Closed);
    assert_eq!(cli.channel(cid).unwrap().states.client, ChannelState::Closed);
    assert_eq!(cli.channel(cid).unwrap().states.server, ChannelState::Closed);
}

#[test]
fn dead_circuit_cascades_to_channels() {
    let (mut cli, mut srv) = circuit_pair();
    let (channel1, _) = make_channels(&mut cli, &mut srv, DbrType::Long, 1, "a");
    let (channel2, _) = make_channels(&mut cli, &mut srv, DbrType::Long, 1, "b");

    // Put a read and a subscription in flight.
    let read = channel1.read(&mut cli, None, None, Some(5)).unwrap();
    cli.send(&[Command::from(read)]).unwrap();
    let sub = channel2
        .subscribe(&mut cli, None, None, None, None, None, None, Some(9))
        .unwrap();
    cli.send(&[Command::from(sub)]).unwrap();

    let sentinel = cli.disconnect();
    cli.process_command(&sentinel).unwrap();

    assert_eq!(cli.state(Role::Client), CircuitState::Disconnected);
    assert_eq!(cli.state(Role::Server), CircuitState::Disconnected);
    for channel in [&channel1, &channel2] {
        let info = cli.channel(channel.cid()).unwrap();
        assert_eq!(info.states.client, ChannelState::Closed);
        assert_eq!(info.states.server, ChannelState::Closed);
    }
    assert!(!cli.ioid_pending(5));
    assert!(!cli.subscription_active(9));

    // Any further send is a local protocol error.
    let version = Command::from(VersionRequest::new(0, DEFAULT_PROTOCOL_VERSION).unwrap());
    assert!(matches!(
        cli.send(std::slice::from_ref(&version)),
        Err(Error::LocalProtocol(_))
    ));
}

#[test]
fn premature_read_is_rejected() {
    let (mut cli, mut srv) = circuit_pair();
    let cli_channel = ClientChannel::new("pv1", &mut cli, None).unwrap();
    let req = cli_channel.create().unwrap();
    let cid = req.cid;
    pump(&mut cli, &mut srv, &[Command::from(req)]);
    let srv_channel = ServerChannel::new("pv1", &mut srv, cid).unwrap();
    let sid = srv.new_channel_id();
    srv.send(&[Command::from(srv_channel.create(DbrType::Long, 1, sid))])
        .unwrap();

    // The server is connected; the client has not processed the response
    // yet and must not read.
    let premature = Command::from(ReadNotifyRequest {
        data_type: DbrType::Long,
        data_count: 1,
        sid,
        ioid: 0,
    });
    assert!(matches!(
        cli.send(std::slice::from_ref(&premature)),
        Err(Error::LocalProtocol(_))
    ));
}

#[test]
fn empty_recv_yields_the_disconnect_sentinel() {
    let (mut cli, _srv) = circuit_pair();
    let (commands, needed) = cli.recv(b"").unwrap();
    assert_eq!(commands, vec![Command::Disconnected]);
    assert_eq!(needed, 0);
    cli.process_command(&commands[0]).unwrap();
    assert_eq!(cli.state(Role::Client), CircuitState::Disconnected);
}
