//! # Tickwire Shared
//! Protocol-level primitives shared between the tickwire server & client
//! crates: tick sequence arithmetic, wire IO, packet framing, the input
//! delta codec, and the pooling/ordering containers the pipelines use.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod constants;
mod input_delta;
mod packet;
mod pool;
mod sequence;
mod sequence_buffer;
mod types;
mod wire;

pub use constants::{
    FIRST_LOCAL_ENTITY_ID, INVALID_ENTITY_ID, MAX_PARTS, MAX_PLAYERS, MAX_STORED_INPUTS,
    MAX_SYNCED_ENTITY_COUNT, SERVER_PLAYER_ID,
};
pub use input_delta::{decode_delta, encode_delta, min_delta_size, DeltaError};
pub use packet::{
    BaselineDataHeader, DiffPartHeader, InputPacketHeader, LastPartData, PacketError, PacketKind,
    RecordKind,
};
pub use pool::BufferPool;
pub use sequence::{
    lerp_sequence, sequence_diff, sequence_greater_than, sequence_less_than,
};
pub use sequence_buffer::{SequenceBuffer, SequenceBufferError};
pub use types::{ClassId, EntityId, EntityVersion, PlayerId, RpcId, Tick};
pub use wire::{ByteReader, ByteWriter, WireError};
