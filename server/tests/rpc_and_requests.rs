//! Remote calls riding the diff stream with audience filtering, and the
//! client-request queue draining ahead of input processing.

mod common;

use common::{ack_packet, drain, engine, input_packet, parse_diff_part, NullHandler, U32_CLASS};
use tickwire_server::shared::{ByteReader, ByteWriter, PacketKind, RecordKind};
use tickwire_server::{EntityWorld, ExecuteFlags, GameHandler, PeerId, RpcError};
use tickwire_shared::{EntityId, PlayerId, Tick};

#[test]
fn rpc_reaches_only_its_audience() {
    let (mut engine, mut receiver) = engine(1200);
    let owner = engine.add_player(PeerId(1)).unwrap();
    let other = engine.add_player(PeerId(2)).unwrap();
    let entity = engine.spawn_controller(U32_CLASS, owner).unwrap();

    engine.update(&mut NullHandler);
    engine.receive(owner, &ack_packet(5, 1)).unwrap();
    engine.receive(other, &ack_packet(5, 1)).unwrap();
    engine.update(&mut NullHandler);
    drain(&mut receiver);

    engine
        .queue_rpc(entity, 42, ExecuteFlags::SEND_TO_OWNER, 2, 2, &[1, 2, 3, 4])
        .unwrap();
    engine.update(&mut NullHandler);

    let packets = drain(&mut receiver);
    assert_eq!(packets.len(), 2);

    for packet in &packets {
        let part = parse_diff_part(&packet.payload);
        assert_eq!(part.header.packet_kind, PacketKind::DiffSyncLast.to_u8());
        if packet.peer == PeerId(1) {
            let mut reader = ByteReader::new(&part.payload);
            assert_eq!(reader.read_u8().unwrap(), RecordKind::Rpc.to_u8());
            assert_eq!(reader.read_u16().unwrap(), entity);
            assert_eq!(reader.read_u16().unwrap(), 42); // rpc id
            assert_eq!(
                reader.read_u8().unwrap(),
                ExecuteFlags::SEND_TO_OWNER.bits()
            );
            assert_eq!(reader.read_u16().unwrap(), 2); // element size
            assert_eq!(reader.read_u16().unwrap(), 2); // element count
            assert_eq!(reader.read_bytes(4).unwrap(), &[1, 2, 3, 4]);
            assert_eq!(reader.remaining(), 0);
        } else {
            // the non-owner's diff carries nothing
            assert!(part.payload.is_empty());
        }
    }
}

#[test]
fn rpc_payload_must_match_its_element_shape() {
    let (mut engine, _receiver) = engine(1200);
    let entity = engine.spawn_entity(U32_CLASS).unwrap();

    assert_eq!(
        engine.queue_rpc(entity, 7, ExecuteFlags::all_players(), 4, 2, &[0; 5]),
        Err(RpcError::PayloadSizeMismatch {
            rpc_id: 7,
            expected: 8,
            actual: 5
        })
    );
    assert_eq!(
        engine.queue_rpc(99, 7, ExecuteFlags::all_players(), 1, 1, &[0]),
        Err(RpcError::NoSuchEntity {
            rpc_id: 7,
            entity_id: 99
        })
    );
}

#[derive(Default)]
struct RecordingHandler {
    events: Vec<String>,
}

impl GameHandler for RecordingHandler {
    fn handle_request(&mut self, player: PlayerId, payload: &[u8]) {
        self.events.push(format!("request:{player}:{payload:?}"));
    }

    fn apply_input(&mut self, _world: &mut EntityWorld, player: PlayerId, tick: Tick, _input: &[u8]) {
        self.events.push(format!("input:{player}:{tick}"));
    }

    fn update_entity(&mut self, _world: &mut EntityWorld, entity: EntityId) {
        self.events.push(format!("update:{entity}"));
    }
}

#[test]
fn client_requests_drain_before_input_processing() {
    let (mut engine, mut receiver) = engine(1200);
    let player = engine.add_player(PeerId(1)).unwrap();
    engine.update(&mut NullHandler);
    drain(&mut receiver);

    engine
        .receive(player, &input_packet(5, &[(0, 1, 0.0, [7u8; 4])]))
        .unwrap();

    let mut request = ByteWriter::new();
    request.write_u8(common::HEADER_BYTE);
    request.write_u8(PacketKind::ClientRequest.to_u8());
    request.write_bytes(b"spawn-me");
    engine.receive(player, request.as_slice()).unwrap();

    let mut handler = RecordingHandler::default();
    engine.update(&mut handler);

    assert_eq!(
        handler.events,
        vec![
            format!("request:{player}:{:?}", b"spawn-me"),
            format!("input:{player}:5"),
        ]
    );
}
