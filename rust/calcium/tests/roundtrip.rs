//! Codec round-trip laws over a representative command catalogue:
//! `parse(serialize(command)) == command` and, byte-level,
//! `serialize(parse(bytes)) == bytes` for everything we serialize.

use bytes::BytesMut;

use calcium::prelude::*;
use calcium::{
    DEFAULT_PROTOCOL_VERSION, EXTENDED_HEADER_SIZE, EpicsString, HEADER_SIZE, MessageHeader,
    Parsed, read_from_bytestream,
};

fn sender_of(command: &Command) -> Role {
    match command {
        Command::EchoRequest(_) => Role::Client,
        Command::EchoResponse(_) => Role::Server,
        other => other.sender_role().expect("wire commands have a sender"),
    }
}

fn assert_roundtrip(command: Command) {
    let wire = command.to_bytes();
    let mut buf = BytesMut::from(&wire[..]);
    let parsed = match read_from_bytestream(&mut buf, sender_of(&command)).unwrap() {
        Parsed::Command(parsed) => parsed,
        Parsed::NeedData(n) => panic!("{:?}: short by {}", command, n),
    };
    assert!(buf.is_empty(), "{:?}: trailing bytes", command);
    assert_eq!(parsed, command);
    // Byte-level inverse.
    assert_eq!(parsed.to_bytes(), wire);
}

fn catalogue() -> Vec<Command> {
    let scalar = DbrPayload::plain(DbrValue::Double(vec![3.14])).unwrap();
    let arrays = [
        DbrValue::String(vec![EpicsString::new("hello").unwrap(); 3]),
        DbrValue::Int(vec![-5, 0, 5]),
        DbrValue::Float(vec![1.5, -1.5]),
        DbrValue::Enum(vec![0, 1, 2]),
        DbrValue::Char(b"abc".to_vec()),
        DbrValue::Long(vec![i32::MIN, 0, i32::MAX]),
        DbrValue::Double(vec![f64::MIN_POSITIVE, 0.0, 1e300]),
    ];

    let mut commands = vec![
        Command::from(VersionRequest::new(0, DEFAULT_PROTOCOL_VERSION).unwrap()),
        Command::from(VersionRequest::new(99, DEFAULT_PROTOCOL_VERSION).unwrap()),
        Command::from(VersionResponse::new(DEFAULT_PROTOCOL_VERSION)),
        Command::from(SearchResponse::new(5064, Some([1, 2, 3, 4].into()), 7, 13)),
        Command::from(SearchResponse::new(5064, None, 7, 13)),
        Command::from(NotFoundResponse { version: 13, cid: 7 }),
        Command::from(Beacon::new(13, 5064, 41, [192, 168, 1, 5].into())),
        Command::from(RepeaterRegisterRequest {
            client_address: [10, 0, 0, 1].into(),
        }),
        Command::from(RepeaterConfirmResponse {
            repeater_address: [127, 0, 0, 1].into(),
        }),
        Command::from(EchoRequest),
        Command::from(EchoResponse),
        Command::from(EventsOffRequest),
        Command::from(EventsOnRequest),
        Command::from(ReadSyncRequest),
        Command::from(AccessRightsResponse {
            cid: 0,
            access_rights: AccessRights::READ | AccessRights::WRITE,
        }),
        Command::from(CreateChanResponse {
            data_type: DbrType::Double,
            data_count: 1,
            cid: 0,
            sid: 42,
        }),
        Command::from(CreateChFailResponse { cid: 3 }),
        Command::from(ServerDisconnResponse { cid: 3 }),
        Command::from(ClearChannelRequest { sid: 42, cid: 0 }),
        Command::from(ClearChannelResponse { sid: 42, cid: 0 }),
        Command::from(ErrorResponse {
            original_request: MessageHeader::new(15, 0, 6, 1, 42, 0),
            cid: 0,
            status: 42,
            error_message: "Tom missed the train.".into(),
        }),
        Command::from(ReadRequest {
            data_type: DbrType::Long,
            data_count: 1,
            sid: 42,
            ioid: 1,
        }),
        Command::from(ReadResponse::new(&scalar, 42, 1).unwrap()),
        Command::from(WriteRequest::new(&scalar, 42, 1).unwrap()),
        Command::from(ReadNotifyRequest {
            data_type: DbrType::Double,
            data_count: 1,
            sid: 42,
            ioid: 0,
        }),
        Command::from(ReadNotifyResponse::new(&scalar, 1, 0).unwrap()),
        Command::from(WriteNotifyRequest::new(&scalar, 42, 13).unwrap()),
        Command::from(WriteNotifyResponse {
            data_type: DbrType::Double,
            data_count: 1,
            status: 1,
            ioid: 13,
        }),
        Command::from(EventAddRequest {
            data_type: DbrType::Double,
            data_count: 1,
            sid: 42,
            subscriptionid: 7,
            low: 0.0,
            high: 0.5,
            to: 2.0,
            mask: EventMask::VALUE | EventMask::ALARM,
        }),
        Command::from(EventCancelRequest {
            data_type: DbrType::Double,
            data_count: 1,
            sid: 42,
            subscriptionid: 7,
        }),
        Command::from(EventCancelResponse {
            data_type: DbrType::Double,
            sid: 42,
            subscriptionid: 7,
        }),
    ];

    // Names at the padding boundaries.
    let longest = "n".repeat(39);
    for name in ["", "a", "seven..", "eight...", "nine.....", longest.as_str()] {
        commands.push(Command::from(SearchRequest::new(name, 1, 13).unwrap()));
        commands.push(Command::from(CreateChanRequest::new(name, 1, 13).unwrap()));
        commands.push(Command::from(HostNameRequest {
            name: name.to_string(),
        }));
        commands.push(Command::from(ClientNameRequest {
            name: name.to_string(),
        }));
    }

    // One array payload of each native type.
    for value in arrays {
        let payload = DbrPayload::plain(value).unwrap();
        commands.push(Command::from(
            ReadNotifyResponse::new(&payload, 1, 9).unwrap(),
        ));
        commands.push(Command::from(EventAddResponse::new(&payload, 1, 7).unwrap()));
        commands.push(Command::from(WriteRequest::new(&payload, 42, 9).unwrap()));
    }

    commands
}

#[test]
fn every_command_roundtrips() {
    for command in catalogue() {
        assert_roundtrip(command);
    }
}

#[test]
fn standard_headers_never_extend() {
    for command in catalogue() {
        let (header, _) = command.wire().unwrap();
        if header.payload_size < 0xFFFF && header.data_count <= u16::MAX as u32 {
            assert_eq!(header.to_wire().len(), HEADER_SIZE, "{:?}", command);
        }
    }
}

#[test]
fn oversized_payloads_extend() {
    // 20000 longs = 80000 bytes of payload.
    let payload = DbrPayload::plain(DbrValue::Long(vec![7; 20_000])).unwrap();
    let response = Command::from(ReadNotifyResponse::new(&payload, 1, 0).unwrap());
    let (header, _) = response.wire().unwrap();
    assert_eq!(header.to_wire().len(), EXTENDED_HEADER_SIZE);
    assert_roundtrip(response);
}
