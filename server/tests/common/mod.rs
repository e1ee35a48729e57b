//! Shared fixtures: a loopback engine, a client-side input packet encoder
//! symmetric with the server's decoder, and egress packet parsing.

// each test binary uses its own subset of these fixtures
#![allow(dead_code)]

use tickwire_server::shared::{ByteReader, ByteWriter, PacketKind};
use tickwire_server::{
    ChannelReceiver, ClassKind, ClassLayout, ClassRegistry, DeliveryMethod, EngineConfig,
    FieldDescriptor, GameHandler, PacketChannel, PeerId, ServerEngine,
};
use tickwire_shared::{encode_delta, BaselineDataHeader, DiffPartHeader, LastPartData};

pub const HEADER_BYTE: u8 = 0x5A;
pub const INPUT_SIZE: usize = 4;

/// A class with a single u32 field at offset 0.
pub const U32_CLASS: u16 = 1;
/// A class with one 32-byte blob field, for fragmentation scenarios.
pub const BLOB_CLASS: u16 = 2;
/// A player-owned controller class.
pub const CONTROLLER_CLASS: u16 = 3;
/// A pawn class a controller commands.
pub const PAWN_CLASS: u16 = 4;

pub struct NullHandler;

impl GameHandler for NullHandler {}

pub fn registry() -> ClassRegistry {
    let mut registry = ClassRegistry::new();
    registry
        .register(
            ClassLayout::new(U32_CLASS, ClassKind::Plain)
                .field(FieldDescriptor::new(0, 4).interpolated().notify(0)),
        )
        .unwrap();
    registry
        .register(ClassLayout::new(BLOB_CLASS, ClassKind::Plain).field(FieldDescriptor::new(0, 32)))
        .unwrap();
    registry
        .register(
            ClassLayout::new(CONTROLLER_CLASS, ClassKind::Controller)
                .field(FieldDescriptor::new(0, 2).rollback()),
        )
        .unwrap();
    registry
        .register(
            ClassLayout::new(PAWN_CLASS, ClassKind::Pawn)
                .updateable()
                .lag_compensated()
                .field(FieldDescriptor::new(0, 4)),
        )
        .unwrap();
    registry
}

pub fn engine(unreliable_mtu: usize) -> (ServerEngine, ChannelReceiver) {
    engine_with_capacity(unreliable_mtu, 64)
}

pub fn engine_with_capacity(
    unreliable_mtu: usize,
    max_synced_entities: u16,
) -> (ServerEngine, ChannelReceiver) {
    let (sender, receiver) = PacketChannel::unbounded(unreliable_mtu);
    let config = EngineConfig {
        header_byte: HEADER_BYTE,
        input_size: INPUT_SIZE,
        max_synced_entities,
        ..EngineConfig::default()
    };
    let engine = ServerEngine::new(config, registry(), sender).unwrap();
    (engine, receiver)
}

/// Encodes a full `ClientInput` packet the way a client would: engine
/// header byte, packet kind, first tick, then per-frame header plus a raw
/// first block and delta-encoded successors.
pub fn input_packet(first_tick: u16, frames: &[(u16, u16, f32, [u8; INPUT_SIZE])]) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    writer.write_u8(HEADER_BYTE);
    writer.write_u8(PacketKind::ClientInput.to_u8());
    writer.write_u16(first_tick);

    let mut prev: Option<[u8; INPUT_SIZE]> = None;
    for &(state_a, state_b, lerp, block) in frames {
        writer.write_u16(state_a);
        writer.write_u16(state_b);
        writer.write_f32(lerp);
        match prev {
            None => writer.write_bytes(&block),
            Some(base) => {
                encode_delta(&base, &block, &mut writer).unwrap();
            }
        }
        prev = Some(block);
    }
    writer.as_slice().to_vec()
}

/// A simple acknowledgement: one input frame whose header confirms the
/// given server tick.
pub fn ack_packet(input_tick: u16, state_b: u16) -> Vec<u8> {
    input_packet(
        input_tick,
        &[(state_b.wrapping_sub(1), state_b, 0.0, [0u8; INPUT_SIZE])],
    )
}

pub struct Egress {
    pub peer: PeerId,
    pub delivery: DeliveryMethod,
    pub payload: Box<[u8]>,
}

pub fn drain(receiver: &mut ChannelReceiver) -> Vec<Egress> {
    let mut packets = Vec::new();
    while let Some((peer, delivery, payload)) = receiver.receive() {
        packets.push(Egress {
            peer,
            delivery,
            payload,
        });
    }
    packets
}

pub struct Baseline {
    pub header: BaselineDataHeader,
    pub body: Vec<u8>,
}

/// Parses and decompresses a `BaselineSync` packet.
pub fn parse_baseline(payload: &[u8]) -> Baseline {
    let mut reader = ByteReader::new(payload);
    let header = BaselineDataHeader::read(&mut reader).unwrap();
    assert_eq!(header.user_header, HEADER_BYTE);
    assert_eq!(header.packet_kind, PacketKind::BaselineSync.to_u8());
    let body =
        lz4_flex::decompress(reader.tail(), header.original_length as usize).unwrap();
    Baseline { header, body }
}

pub struct DiffPart {
    pub header: DiffPartHeader,
    pub payload: Vec<u8>,
    /// Present on `DiffSyncLast` only.
    pub last: Option<LastPartData>,
}

/// Parses one diff part, splitting off the trailer on the terminal part.
pub fn parse_diff_part(payload: &[u8]) -> DiffPart {
    let mut reader = ByteReader::new(payload);
    let header = DiffPartHeader::read(&mut reader).unwrap();
    assert_eq!(header.user_header, HEADER_BYTE);

    let tail = reader.tail();
    if header.packet_kind == PacketKind::DiffSyncLast.to_u8() {
        let split = tail.len() - LastPartData::SIZE;
        let mut trailer = ByteReader::new(&tail[split..]);
        DiffPart {
            header,
            payload: tail[..split].to_vec(),
            last: Some(LastPartData::read(&mut trailer).unwrap()),
        }
    } else {
        assert_eq!(header.packet_kind, PacketKind::DiffSync.to_u8());
        DiffPart {
            header,
            payload: tail.to_vec(),
            last: None,
        }
    }
}
