use std::collections::VecDeque;
use std::time::Duration;

use thiserror::Error;

use tickwire_shared::{
    lerp_sequence, BufferPool, ByteReader, ClassId, EntityId, PacketKind, PlayerId, RpcId, Tick,
    MAX_PLAYERS, MAX_SYNCED_ENTITY_COUNT, SERVER_PLAYER_ID,
};

use crate::connection::ingress::{self, IngressError};
use crate::connection::snapshot::{self, SnapshotContext};
use crate::transport::{PacketSender, PeerId};
use crate::user::player::{Player, PlayerState, PlayerTable};
use crate::world::entity::SyncedEntity;
use crate::world::entity_world::{EntityWorld, SpawnError, WorldError};
use crate::world::layout::{ClassKind, ClassRegistry};
use crate::world::rpc::{ExecuteFlags, RpcError, RpcPool};
use crate::world::state_serializer::StateSerializer;

/// Errors in engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("send_rate must be 1, 2 or 3, got {send_rate}")]
    BadSendRate { send_rate: u8 },

    #[error("tick_rate must be positive")]
    BadTickRate,

    #[error("input_size must be positive")]
    BadInputSize,

    #[error(
        "max_synced_entities must be in [1, {limit}], got {requested}",
        limit = MAX_SYNCED_ENTITY_COUNT
    )]
    BadEntityCapacity { requested: u16 },
}

/// Engine-wide knobs, validated at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// First byte of every engine packet, chosen by the integrator so the
    /// transport can multiplex engine traffic with its own.
    pub header_byte: u8,
    /// Logic ticks per second the host drives `update` at.
    pub tick_rate: u16,
    /// Send cadence relative to the logic rate: a snapshot every
    /// `send_rate` ticks. Must be 1, 2 or 3.
    pub send_rate: u8,
    /// Fixed size of one client input block in bytes.
    pub input_size: usize,
    pub max_synced_entities: u16,
    pub max_players: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            header_byte: 0x5A,
            tick_rate: 30,
            send_rate: 1,
            input_size: 8,
            max_synced_entities: MAX_SYNCED_ENTITY_COUNT,
            max_players: MAX_PLAYERS,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3).contains(&self.send_rate) {
            return Err(ConfigError::BadSendRate {
                send_rate: self.send_rate,
            });
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::BadTickRate);
        }
        if self.input_size == 0 {
            return Err(ConfigError::BadInputSize);
        }
        if self.max_synced_entities == 0 || self.max_synced_entities > MAX_SYNCED_ENTITY_COUNT {
            return Err(ConfigError::BadEntityCapacity {
                requested: self.max_synced_entities,
            });
        }
        Ok(())
    }
}

/// Monotone wrapping tick counter plus the fixed period the host should
/// drive it at. All protocol timestamps are values of this counter.
pub struct TickClock {
    tick: Tick,
    period: Duration,
}

impl TickClock {
    fn new(tick_rate: u16) -> Self {
        Self {
            tick: 0,
            period: Duration::from_secs(1) / u32::from(tick_rate),
        }
    }

    pub fn current(&self) -> Tick {
        self.tick
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    fn advance(&mut self) -> Tick {
        self.tick = self.tick.wrapping_add(1);
        self.tick
    }
}

/// User game logic the engine drives once per logic tick.
///
/// Determinism of `update_entity` across ticks is the integrator's
/// contract; the engine never replays a tick.
pub trait GameHandler {
    /// One queued client request, delivered before input processing.
    fn handle_request(&mut self, _player: PlayerId, _payload: &[u8]) {}

    /// One consumed input frame for one player.
    fn apply_input(&mut self, _world: &mut EntityWorld, _player: PlayerId, _tick: Tick, _input: &[u8]) {
    }

    /// Per-tick update of one entity whose class is marked updateable.
    fn update_entity(&mut self, _world: &mut EntityWorld, _entity: EntityId) {}
}

/// The server-side replication engine: entity registry, per-entity state
/// serializers, player table, input ingress and snapshot egress, driven by
/// one `update` call per logic tick.
///
/// The engine is a self-contained instance with no process-wide state;
/// independent instances coexist freely. All methods must be called from
/// one thread.
pub struct ServerEngine {
    config: EngineConfig,
    registry: ClassRegistry,
    clock: TickClock,
    world: EntityWorld,
    serializers: Vec<StateSerializer>,
    players: PlayerTable,
    pending_requests: VecDeque<(PlayerId, Vec<u8>)>,
    input_pool: BufferPool,
    rpc_pool: RpcPool,
    sender: Box<dyn PacketSender>,
    input_seed: Vec<u8>,
    last_send_tick: Option<Tick>,
}

impl ServerEngine {
    pub fn new(
        config: EngineConfig,
        registry: ClassRegistry,
        sender: Box<dyn PacketSender>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            clock: TickClock::new(config.tick_rate),
            world: EntityWorld::new(config.max_synced_entities),
            serializers: (0..config.max_synced_entities)
                .map(StateSerializer::new)
                .collect(),
            players: PlayerTable::new(config.max_players),
            pending_requests: VecDeque::new(),
            input_pool: BufferPool::new(config.input_size),
            rpc_pool: RpcPool::new(),
            sender,
            input_seed: vec![0u8; config.input_size],
            last_send_tick: None,
            config,
            registry,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn current_tick(&self) -> Tick {
        self.clock.current()
    }

    /// Fixed duration between `update` calls the host should hold to.
    pub fn tick_period(&self) -> Duration {
        self.clock.period()
    }

    // Players

    /// Binds a new player to a transport peer. Returns `None` when every
    /// player id is in use.
    pub fn add_player(&mut self, peer: PeerId) -> Option<PlayerId> {
        self.players.add(peer)
    }

    pub fn players_count(&self) -> usize {
        self.players.count()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Disconnects a player: its controller (and the pawn that controller
    /// commands) is destroyed, buffered input returns to the pool, and the
    /// id is recycled.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        if self.players.get(id).is_none() {
            return false;
        }

        let controllers: Vec<EntityId> = self
            .world
            .live_ids()
            .filter(|&entity_id| {
                let Some(entity) = self.world.entity(entity_id) else {
                    return false;
                };
                entity.owner == id
                    && self
                        .registry
                        .layout(entity.class_id)
                        .is_some_and(|layout| layout.kind == ClassKind::Controller)
            })
            .collect();
        for controller in controllers {
            let _ = self.destroy_entity(controller);
        }

        if let Some(mut player) = self.players.remove(id) {
            player.drain_input(&mut self.input_pool);
        }
        if self.players.count() == 0 {
            self.sweep_destroyed();
        }
        true
    }

    // Entities

    /// Spawns a server-owned entity of a registered class.
    pub fn spawn_entity(&mut self, class_id: ClassId) -> Result<EntityId, SpawnError> {
        self.spawn_with_owner(class_id, SERVER_PLAYER_ID)
    }

    /// Spawns an entity owned by a player, typically its controller.
    pub fn spawn_controller(
        &mut self,
        class_id: ClassId,
        owner: PlayerId,
    ) -> Result<EntityId, SpawnError> {
        self.spawn_with_owner(class_id, owner)
    }

    /// Spawns the single instance of a singleton class.
    pub fn spawn_singleton(&mut self, class_id: ClassId) -> Result<EntityId, SpawnError> {
        self.spawn_with_owner(class_id, SERVER_PLAYER_ID)
    }

    fn spawn_with_owner(
        &mut self,
        class_id: ClassId,
        owner: PlayerId,
    ) -> Result<EntityId, SpawnError> {
        let id = self.world.spawn(&self.registry, class_id, owner)?;
        let entity = self
            .world
            .entity(id)
            .expect("entity exists right after spawn");
        self.serializers[usize::from(id)].init(
            class_id,
            entity.version,
            owner,
            self.clock.current(),
            entity.block(),
        );
        Ok(id)
    }

    /// Destroys an entity at the current tick. The destruction replicates
    /// through diffs; the id stays reserved until every player has
    /// acknowledged a tick past it, or immediately with no players
    /// connected. A controller takes its controlled pawn down with it.
    pub fn destroy_entity(&mut self, id: EntityId) -> Result<(), WorldError> {
        let entity = self
            .world
            .entity(id)
            .ok_or(WorldError::NoSuchEntity { entity_id: id })?;
        let pawn = entity.controlled_pawn;

        self.world.remove(id);
        let serializer = &mut self.serializers[usize::from(id)];
        serializer.mark_destroyed(self.clock.current());
        if self.players.count() == 0 {
            serializer.release(&mut self.rpc_pool);
            self.world.release_id(id);
        }

        if let Some(pawn_id) = pawn {
            let _ = self.destroy_entity(pawn_id);
        }
        Ok(())
    }

    pub fn entity(&self, id: EntityId) -> Option<&SyncedEntity> {
        self.world.entity(id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut SyncedEntity> {
        self.world.entity_mut(id)
    }

    pub fn world(&self) -> &EntityWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut EntityWorld {
        &mut self.world
    }

    pub fn set_parent(&mut self, child: EntityId, parent: Option<EntityId>) -> Result<(), WorldError> {
        self.world.set_parent(child, parent)
    }

    pub fn set_controlled_pawn(
        &mut self,
        controller: EntityId,
        pawn: Option<EntityId>,
    ) -> Result<(), WorldError> {
        self.world.set_controlled_pawn(controller, pawn)
    }

    // Remote calls

    /// Queues a remote call on an entity, tagged with the current tick.
    /// It rides the diff stream of every player in its audience whose ack
    /// window contains the tick.
    pub fn queue_rpc(
        &mut self,
        entity_id: EntityId,
        rpc_id: RpcId,
        flags: ExecuteFlags,
        element_size: u16,
        element_count: u16,
        data: &[u8],
    ) -> Result<(), RpcError> {
        let expected = usize::from(element_size) * usize::from(element_count);
        if data.len() != expected {
            return Err(RpcError::PayloadSizeMismatch {
                rpc_id,
                expected,
                actual: data.len(),
            });
        }
        if self.world.entity(entity_id).is_none() {
            return Err(RpcError::NoSuchEntity { rpc_id, entity_id });
        }

        let mut packet = self.rpc_pool.acquire();
        packet.tick = self.clock.current();
        packet.rpc_id = rpc_id;
        packet.flags = flags;
        packet.element_size = element_size;
        packet.element_count = element_count;
        packet.data.extend_from_slice(data);
        self.serializers[usize::from(entity_id)].push_rpc(packet);
        Ok(())
    }

    // Ingress

    /// Entry point for every datagram the transport delivers for a bound
    /// player. Malformed packets are logged and discarded without touching
    /// player state.
    pub fn receive(&mut self, player_id: PlayerId, data: &[u8]) -> Result<(), IngressError> {
        let result = self.receive_inner(player_id, data);
        if let Err(error) = &result {
            ingress::warn_discarded(error);
        }
        result
    }

    fn receive_inner(&mut self, player_id: PlayerId, data: &[u8]) -> Result<(), IngressError> {
        if self.players.get(player_id).is_none() {
            return Err(IngressError::UnknownPlayer { player_id });
        }

        let mut reader = ByteReader::new(data);
        let header_byte = reader
            .read_u8()
            .map_err(|_| IngressError::BadHeaderByte { player_id })?;
        if header_byte != self.config.header_byte {
            return Err(IngressError::BadHeaderByte { player_id });
        }
        let kind_byte = reader.read_u8().map_err(|source| IngressError::Wire {
            player_id,
            source,
        })?;
        let kind = PacketKind::from_u8(kind_byte)
            .map_err(|source| IngressError::UnknownKind { player_id, source })?;

        match kind {
            PacketKind::ClientInput => {
                let server_tick = self.clock.current();
                let player = self
                    .players
                    .get_mut(player_id)
                    .expect("player presence checked above");
                ingress::process_client_input(
                    player,
                    &mut self.input_pool,
                    &mut self.input_seed,
                    server_tick,
                    &mut reader,
                )
            }
            PacketKind::ClientRequest => {
                self.pending_requests
                    .push_back((player_id, reader.tail().to_vec()));
                Ok(())
            }
            PacketKind::BaselineSync | PacketKind::DiffSync | PacketKind::DiffSyncLast => {
                Err(IngressError::UnexpectedKind {
                    player_id,
                    kind: kind_byte,
                })
            }
        }
    }

    // Tick

    /// Executes one logic tick: queued client requests, one input frame
    /// per eligible player, user entity updates, history commit, then on
    /// send ticks the snapshot pass.
    pub fn update(&mut self, handler: &mut dyn GameHandler) {
        let current = self.clock.current();

        while let Some((player_id, payload)) = self.pending_requests.pop_front() {
            handler.handle_request(player_id, &payload);
        }

        for player_id in self.players.active_ids() {
            let Some(player) = self.players.get_mut(player_id) else {
                continue;
            };
            if !matches!(
                player.state,
                PlayerState::Active | PlayerState::WaitingForFirstInputProcess
            ) {
                continue;
            }
            let Some((tick, frame)) = player.available_input.pop_front() else {
                continue;
            };

            player.last_processed_tick = tick;
            player.state_a_tick = frame.header.state_a;
            player.state_b_tick = frame.header.state_b;
            player.lerp_time = frame.header.lerp_msec;
            player.simulated_server_tick = lerp_sequence(
                frame.header.state_a,
                frame.header.state_b.wrapping_sub(1),
                frame.header.lerp_msec,
            );
            if player.state == PlayerState::WaitingForFirstInputProcess {
                player.state = PlayerState::Active;
            }

            if let Some(data) = frame.data {
                handler.apply_input(&mut self.world, player_id, tick, &data);
                self.input_pool.release(data);
            }
        }

        let updateable: Vec<EntityId> = self
            .world
            .live_ids()
            .filter(|&id| {
                self.world.entity(id).is_some_and(|entity| {
                    self.registry
                        .layout(entity.class_id)
                        .is_some_and(|layout| layout.updateable)
                })
            })
            .collect();
        for id in updateable {
            handler.update_entity(&mut self.world, id);
        }

        let minimal = snapshot::minimal_tick(&self.players, current);
        let live: Vec<EntityId> = self.world.live_ids().collect();
        for id in live {
            let Some(entity) = self.world.entity(id) else {
                continue;
            };
            let serializer = &mut self.serializers[usize::from(id)];
            serializer.set_owner(entity.owner);
            serializer.commit(current, entity.block(), minimal, &mut self.rpc_pool);
        }

        let next = self.clock.advance();
        if self.players.count() > 0
            && self.last_send_tick != Some(next)
            && next % Tick::from(self.config.send_rate) == 0
        {
            self.last_send_tick = Some(next);
            let executed_tick = next.wrapping_sub(1);
            let mut ctx = SnapshotContext {
                registry: &self.registry,
                serializers: &mut self.serializers,
                world: &mut self.world,
                players: &mut self.players,
                rpc_pool: &mut self.rpc_pool,
                sender: self.sender.as_mut(),
                header_byte: self.config.header_byte,
                send_rate: self.config.send_rate,
            };
            snapshot::send_snapshots(&mut ctx, executed_tick);
        }
    }

    /// Finalizes every pending destruction: with no players connected no
    /// in-flight packet may reference the ids, so they recycle now.
    fn sweep_destroyed(&mut self) {
        for index in 0..self.serializers.len() {
            let serializer = &mut self.serializers[index];
            if serializer.is_active() && serializer.destroyed_at().is_some() {
                serializer.release(&mut self.rpc_pool);
                self.world.release_id(index as EntityId);
            }
        }
    }
}
