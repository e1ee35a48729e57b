//! # Tickwire Server
//! Server-authoritative tick-based entity replication: a fixed-rate
//! simulation that replicates synchronized entities to each connected
//! client as delta-compressed snapshots, ingests delta-encoded per-tick
//! input, and flushes entity-bound remote calls with the same delivery
//! discipline as state.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod connection;
mod engine;
pub mod transport;
mod user;
mod world;

pub mod shared {
    pub use tickwire_shared::{
        lerp_sequence, sequence_diff, sequence_greater_than, sequence_less_than, ByteReader,
        ByteWriter, PacketKind, RecordKind, Tick,
    };
}

pub use connection::ingress::IngressError;
pub use engine::{ConfigError, EngineConfig, GameHandler, ServerEngine, TickClock};
pub use transport::{ChannelReceiver, DeliveryMethod, PacketChannel, PacketSender, PeerId, SendError};
pub use user::input_buffer::InputFrame;
pub use user::player::{Player, PlayerState};
pub use world::entity::SyncedEntity;
pub use world::entity_world::{EntityWorld, SpawnError, WorldError};
pub use world::layout::{ClassKind, ClassLayout, ClassRegistry, FieldDescriptor, RegistryError};
pub use world::rpc::{ExecuteFlags, RemoteCallPacket, RpcError, RpcPool};
pub use world::state_serializer::{DiffResult, StateSerializer};
