use log::{debug, warn};

use tickwire_shared::{
    sequence_less_than, BaselineDataHeader, ByteWriter, DiffPartHeader, LastPartData, PacketKind,
    Tick, MAX_PARTS,
};

use crate::transport::{DeliveryMethod, PacketSender};
use crate::user::player::{PlayerState, PlayerTable};
use crate::world::entity_world::EntityWorld;
use crate::world::layout::ClassRegistry;
use crate::world::rpc::RpcPool;
use crate::world::state_serializer::{DiffResult, StateSerializer};

/// Borrowed engine state the snapshot pass operates on.
pub(crate) struct SnapshotContext<'a> {
    pub registry: &'a ClassRegistry,
    pub serializers: &'a mut [StateSerializer],
    pub world: &'a mut EntityWorld,
    pub players: &'a mut PlayerTable,
    pub rpc_pool: &'a mut RpcPool,
    pub sender: &'a mut dyn PacketSender,
    pub header_byte: u8,
    pub send_rate: u8,
}

/// The global history floor: the oldest tick any active player still
/// interpolates from, defaulting to the executed tick when nobody is
/// active yet. Snapshots and remote calls below it may be discarded.
pub(crate) fn minimal_tick(players: &PlayerTable, fallback: Tick) -> Tick {
    let mut minimal = fallback;
    for id in players.active_ids() {
        let Some(player) = players.get(id) else {
            continue;
        };
        if player.state == PlayerState::RequestBaseline {
            continue;
        }
        if sequence_less_than(player.state_a_tick, minimal) {
            minimal = player.state_a_tick;
        }
    }
    minimal
}

/// Runs one send tick: a reliable compressed baseline for every player
/// that requested one, a multi-part unreliable diff for everyone else,
/// then a transport flush.
pub(crate) fn send_snapshots(ctx: &mut SnapshotContext, executed_tick: Tick) {
    let minimal = minimal_tick(ctx.players, executed_tick);

    for player_id in ctx.players.active_ids() {
        let Some(state) = ctx.players.get(player_id).map(|player| player.state) else {
            continue;
        };
        match state {
            PlayerState::RequestBaseline => send_baseline(ctx, player_id, executed_tick),
            _ => send_diff(ctx, player_id, executed_tick, minimal),
        }
    }

    ctx.sender.trigger_update();
}

fn send_baseline(ctx: &mut SnapshotContext, player_id: u8, executed_tick: Tick) {
    let mut body = ByteWriter::new();
    for serializer in ctx.serializers.iter() {
        if !serializer.is_active() || serializer.destroyed_at().is_some() {
            continue;
        }
        let Some(layout) = ctx.registry.layout(serializer.class_id()) else {
            continue;
        };
        serializer.make_baseline(player_id, layout, &mut body);
    }

    let compressed = lz4_flex::compress(body.as_slice());
    let mut packet = ByteWriter::with_capacity(BaselineDataHeader::SIZE + compressed.len());
    BaselineDataHeader {
        user_header: ctx.header_byte,
        packet_kind: PacketKind::BaselineSync.to_u8(),
        original_length: body.position() as u32,
        tick: executed_tick,
        player_id,
        send_rate: ctx.send_rate,
    }
    .write(&mut packet);
    packet.write_bytes(&compressed);

    let Some(player) = ctx.players.get_mut(player_id) else {
        return;
    };
    if let Err(error) = ctx
        .sender
        .send(&player.peer, packet.as_slice(), DeliveryMethod::ReliableOrdered)
    {
        warn!("player {player_id}: baseline send failed: {error}");
        return;
    }

    player.state_a_tick = executed_tick;
    player.current_server_tick = executed_tick;
    player.state = PlayerState::WaitingForFirstInput;
    debug!("player {player_id}: baseline for tick {executed_tick} sent");
}

fn send_diff(ctx: &mut SnapshotContext, player_id: u8, executed_tick: Tick, minimal: Tick) {
    let Some(player) = ctx.players.get(player_id) else {
        return;
    };
    let peer = player.peer;
    let ack_tick = player.current_server_tick;
    let last_processed_tick = player.last_processed_tick;
    let last_received_tick = player.last_received_tick;

    let max_part_size =
        ctx.sender.max_single_packet_size(DeliveryMethod::Unreliable) - LastPartData::SIZE;

    let capacity: usize = ctx
        .serializers
        .iter()
        .map(|serializer| {
            ctx.registry
                .layout(serializer.class_id())
                .map_or(0, |layout| serializer.maximum_size(layout))
        })
        .sum();
    let mut writer = ByteWriter::with_capacity(DiffPartHeader::SIZE + capacity);

    DiffPartHeader {
        user_header: ctx.header_byte,
        packet_kind: PacketKind::DiffSync.to_u8(),
        part: 0,
        tick: executed_tick,
    }
    .write(&mut writer);

    let mut part: u8 = 0;
    let mut released = Vec::new();

    for serializer in ctx.serializers.iter() {
        if !serializer.is_active() {
            continue;
        }
        let Some(layout) = ctx.registry.layout(serializer.class_id()) else {
            continue;
        };
        let result =
            serializer.make_diff(player_id, layout, executed_tick, minimal, ack_tick, &mut writer);
        if result == DiffResult::DoneAndDestroy {
            released.push(serializer.entity_id());
        }

        while writer.position() > max_part_size {
            if part == MAX_PARTS - 1 {
                // the ack window has diverged past one full snapshot;
                // re-baseline on the next send tick instead
                if let Some(player) = ctx.players.get_mut(player_id) {
                    player.state = PlayerState::RequestBaseline;
                }
                debug!("player {player_id}: diff overflowed {MAX_PARTS} parts, re-baselining");
                return;
            }
            writer.patch_u8(DiffPartHeader::KIND_OFFSET, PacketKind::DiffSync.to_u8());
            writer.patch_u8(DiffPartHeader::PART_OFFSET, part);
            if let Err(error) =
                ctx.sender
                    .send(&peer, &writer.as_slice()[..max_part_size], DeliveryMethod::Unreliable)
            {
                debug!("player {player_id}: diff part send failed: {error}");
            }
            part += 1;
            writer.shift_tail(max_part_size, DiffPartHeader::SIZE);
        }
    }

    writer.patch_u8(DiffPartHeader::KIND_OFFSET, PacketKind::DiffSyncLast.to_u8());
    writer.patch_u8(DiffPartHeader::PART_OFFSET, part);
    LastPartData {
        last_processed_tick,
        last_received_tick,
        mtu: max_part_size as u16,
    }
    .write(&mut writer);
    if let Err(error) = ctx
        .sender
        .send(&peer, writer.as_slice(), DeliveryMethod::Unreliable)
    {
        debug!("player {player_id}: diff send failed: {error}");
    }

    for entity_id in released {
        ctx.serializers[usize::from(entity_id)].release(ctx.rpc_pool);
        ctx.world.release_id(entity_id);
    }
}
