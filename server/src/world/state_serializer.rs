use std::collections::VecDeque;

use log::debug;

use tickwire_shared::{
    sequence_diff, sequence_greater_than, ByteWriter, ClassId, EntityId, EntityVersion, PlayerId,
    RecordKind, Tick,
};

use super::layout::ClassLayout;
use super::rpc::{RemoteCallPacket, RpcPool};

/// Outcome of a per-player diff request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffResult {
    /// Nothing to tell this player about the entity.
    NotChanged,
    /// Records were written.
    Done,
    /// Records were written (or not) and the destruction is acknowledged by
    /// every player; the serializer may be released and the id recycled.
    DoneAndDestroy,
}

/// Per-entity replication history and diff producer.
///
/// One serializer exists for every synced entity id for the lifetime of the
/// engine; `active` tracks whether the slot currently backs a live (or
/// destroyed-but-unreleased) entity. The snapshot history covers every tick
/// in `[minimal_tick, current_tick]`; reads outside that window miss.
pub struct StateSerializer {
    entity_id: EntityId,
    class_id: ClassId,
    version: EntityVersion,
    owner: PlayerId,
    created_at: Tick,
    destroyed_at: Option<Tick>,
    history: VecDeque<(Tick, Box<[u8]>)>,
    rpcs: VecDeque<RemoteCallPacket>,
    active: bool,
}

impl StateSerializer {
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            class_id: 0,
            version: 0,
            owner: 0,
            created_at: 0,
            destroyed_at: None,
            history: VecDeque::new(),
            rpcs: VecDeque::new(),
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn version(&self) -> EntityVersion {
        self.version
    }

    pub fn destroyed_at(&self) -> Option<Tick> {
        self.destroyed_at
    }

    /// Binds the serializer to a freshly spawned entity and seeds its
    /// history with the initial field snapshot.
    pub fn init(
        &mut self,
        class_id: ClassId,
        version: EntityVersion,
        owner: PlayerId,
        tick: Tick,
        block: &[u8],
    ) {
        self.class_id = class_id;
        self.version = version;
        self.owner = owner;
        self.created_at = tick;
        self.destroyed_at = None;
        self.history.clear();
        self.history.push_back((tick, block.into()));
        self.active = true;
    }

    /// Ownership can move via the parent cascade; diffs filter owner-only
    /// fields against the value current at write time.
    pub fn set_owner(&mut self, owner: PlayerId) {
        self.owner = owner;
    }

    pub fn push_rpc(&mut self, packet: RemoteCallPacket) {
        self.rpcs.push_back(packet);
    }

    /// Commits the post-update field block as the snapshot for `tick` and
    /// drops history and remote calls no player can still request.
    ///
    /// A same-tick commit overwrites: the snapshot seeded at spawn must
    /// not shadow mutations the init hook made before the tick completed.
    pub fn commit(&mut self, tick: Tick, block: &[u8], minimal_tick: Tick, rpc_pool: &mut RpcPool) {
        debug_assert!(self.active && self.destroyed_at.is_none());
        match self.history.back_mut() {
            Some((last_tick, last_block)) if *last_tick == tick => {
                last_block.copy_from_slice(block);
            }
            _ => self.history.push_back((tick, block.into())),
        }

        while let Some(&(front_tick, _)) = self.history.front() {
            if sequence_diff(front_tick, minimal_tick) >= 0 {
                break;
            }
            self.history.pop_front();
        }
        while self
            .rpcs
            .front()
            .is_some_and(|rpc| sequence_diff(rpc.tick, minimal_tick) <= 0)
        {
            if let Some(expired) = self.rpcs.pop_front() {
                rpc_pool.release(expired);
            }
        }
    }

    /// Marks the entity destroyed as of `tick`. History and queued calls
    /// are retained until the destruction is globally acknowledged.
    pub fn mark_destroyed(&mut self, tick: Tick) {
        debug_assert!(self.active);
        self.destroyed_at = Some(tick);
    }

    /// Unbinds the serializer, returning queued calls to the pool. The
    /// caller recycles the entity id.
    pub fn release(&mut self, rpc_pool: &mut RpcPool) {
        while let Some(rpc) = self.rpcs.pop_front() {
            rpc_pool.release(rpc);
        }
        self.history.clear();
        self.destroyed_at = None;
        self.active = false;
    }

    /// Exact-tick snapshot lookup; `None` outside the retained window.
    pub fn snapshot_at(&self, tick: Tick) -> Option<&[u8]> {
        self.history
            .iter()
            .rev()
            .find(|(snapshot_tick, _)| *snapshot_tick == tick)
            .map(|(_, block)| block.as_ref())
    }

    /// Full baseline record for one player: identity header plus every
    /// field visible to that player, in descriptor order.
    pub fn make_baseline(&self, player_id: PlayerId, layout: &ClassLayout, writer: &mut ByteWriter) {
        if !self.active || self.destroyed_at.is_some() {
            return;
        }
        let Some(&(_, ref block)) = self.history.back() else {
            return;
        };
        self.write_full_record(player_id, layout, block, writer);
    }

    /// Writes this entity's delta for one player: a full record if the
    /// player has never acknowledged the entity, per-field changes
    /// otherwise, any remote calls inside the player's window, and a
    /// destruction record once the entity is gone.
    pub fn make_diff(
        &self,
        player_id: PlayerId,
        layout: &ClassLayout,
        current_tick: Tick,
        minimal_tick: Tick,
        player_ack_tick: Tick,
        writer: &mut ByteWriter,
    ) -> DiffResult {
        if !self.active {
            return DiffResult::NotChanged;
        }

        let mut wrote = false;

        if self.destroyed_at.is_none() {
            if sequence_diff(self.created_at, player_ack_tick) > 0 {
                // the player's ack predates the entity: send it whole
                if let Some(block) = self
                    .snapshot_at(current_tick)
                    .or_else(|| self.history.back().map(|(_, block)| block.as_ref()))
                {
                    self.write_full_record(player_id, layout, block, writer);
                    wrote = true;
                }
            } else {
                match (
                    self.snapshot_at(current_tick),
                    self.snapshot_at(player_ack_tick),
                ) {
                    (Some(current), Some(base)) => {
                        wrote |= self.write_field_changes(player_id, layout, base, current, writer);
                    }
                    (Some(current), None) => {
                        // ack fell out of the retained window; resend whole
                        debug!(
                            "entity {}: no snapshot at ack tick {player_ack_tick}, sending full record",
                            self.entity_id
                        );
                        self.write_full_record(player_id, layout, current, writer);
                        wrote = true;
                    }
                    _ => {}
                }
            }
        }

        for rpc in &self.rpcs {
            if sequence_diff(rpc.tick, player_ack_tick) > 0
                && sequence_diff(rpc.tick, current_tick) <= 0
                && rpc.flags.audience_includes(player_id, self.owner)
            {
                self.write_rpc_record(rpc, writer);
                wrote = true;
            }
        }

        if let Some(destroy_tick) = self.destroyed_at {
            if sequence_diff(destroy_tick, player_ack_tick) > 0
                && sequence_diff(destroy_tick, current_tick) <= 0
            {
                writer.write_u8(RecordKind::Destroy.to_u8());
                writer.write_u16(self.entity_id);
                writer.write_u8(self.version);
                wrote = true;
            }
            if sequence_greater_than(minimal_tick, destroy_tick) {
                return DiffResult::DoneAndDestroy;
            }
        }

        if wrote {
            DiffResult::Done
        } else {
            DiffResult::NotChanged
        }
    }

    /// Upper bound on bytes one diff for this entity can occupy, used to
    /// size the per-tick packet buffer.
    pub fn maximum_size(&self, layout: &ClassLayout) -> usize {
        if !self.active {
            return 0;
        }
        // full record: tag + id + version + class + owner + block
        let full = 1 + 2 + 1 + 2 + 1 + layout.block_size();
        // field record: tag + id + count + per-field index byte
        let fields = 1 + 2 + 1 + layout.fields().len() + layout.block_size();
        let destroy = 1 + 2 + 1;
        let rpcs: usize = self.rpcs.iter().map(RemoteCallPacket::wire_size).sum();
        full.max(fields) + destroy + rpcs
    }

    fn write_full_record(
        &self,
        player_id: PlayerId,
        layout: &ClassLayout,
        block: &[u8],
        writer: &mut ByteWriter,
    ) {
        writer.write_u8(RecordKind::Full.to_u8());
        writer.write_u16(self.entity_id);
        writer.write_u8(self.version);
        writer.write_u16(self.class_id);
        writer.write_u8(self.owner);
        for field in layout.fields() {
            if field.owner_only && player_id != self.owner {
                continue;
            }
            writer.write_bytes(&block[field.offset..field.offset + field.width]);
        }
    }

    fn write_field_changes(
        &self,
        player_id: PlayerId,
        layout: &ClassLayout,
        base: &[u8],
        current: &[u8],
        writer: &mut ByteWriter,
    ) -> bool {
        let record_start = writer.position();
        writer.write_u8(RecordKind::Fields.to_u8());
        writer.write_u16(self.entity_id);
        let count_offset = writer.position();
        writer.write_u8(0);

        let mut count: u8 = 0;
        for (field_index, field) in layout.fields().iter().enumerate() {
            if field.owner_only && player_id != self.owner {
                continue;
            }
            let range = field.offset..field.offset + field.width;
            if base[range.clone()] != current[range.clone()] {
                writer.write_u8(field_index as u8);
                writer.write_bytes(&current[range]);
                count += 1;
            }
        }

        if count == 0 {
            writer.truncate(record_start);
            return false;
        }
        writer.patch_u8(count_offset, count);
        true
    }

    fn write_rpc_record(&self, rpc: &RemoteCallPacket, writer: &mut ByteWriter) {
        writer.write_u8(RecordKind::Rpc.to_u8());
        writer.write_u16(self.entity_id);
        writer.write_u16(rpc.rpc_id);
        writer.write_u8(rpc.flags.bits());
        writer.write_u16(rpc.element_size);
        writer.write_u16(rpc.element_count);
        writer.write_bytes(&rpc.data);
    }
}
