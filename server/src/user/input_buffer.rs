use log::debug;

use tickwire_shared::{
    sequence_greater_than, BufferPool, InputPacketHeader, Tick, MAX_STORED_INPUTS,
};

use super::player::{Player, PlayerState};

/// One decoded per-tick input frame waiting to be consumed by a logic tick.
pub struct InputFrame {
    pub tick: Tick,
    pub header: InputPacketHeader,
    /// Pooled input block; taken when the frame is processed.
    pub data: Option<Box<[u8]>>,
}

/// Outcome of offering a decoded frame to a player's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreResult {
    Stored,
    /// Frame was older than the receive cursor or a duplicate; its block
    /// went back to the pool.
    Dropped,
}

/// Offers a frame to the player's bounded input buffer.
///
/// Frames are accepted while the player waits for its first input, or when
/// newer than every frame seen so far. A full buffer evicts its
/// minimum-tick frame first, so the buffer never exceeds
/// `MAX_STORED_INPUTS` and always keeps the newest window.
pub fn store_frame(player: &mut Player, frame: InputFrame, input_pool: &mut BufferPool) -> StoreResult {
    let accept = player.state == PlayerState::WaitingForFirstInput
        || sequence_greater_than(frame.tick, player.last_received_tick);
    if !accept {
        if let Some(data) = frame.data {
            input_pool.release(data);
        }
        return StoreResult::Dropped;
    }

    if player.available_input.len() >= MAX_STORED_INPUTS {
        if let Some((evicted_tick, evicted)) = player.available_input.pop_front() {
            debug!(
                "player {}: input buffer full, evicting tick {evicted_tick}",
                player.id
            );
            if let Some(data) = evicted.data {
                input_pool.release(data);
            }
        }
    }

    let tick = frame.tick;
    if player.available_input.try_insert(tick, frame).is_err() {
        // duplicate tick; the gate lets these through only before the
        // first input advances the receive cursor
        return StoreResult::Dropped;
    }
    if sequence_greater_than(tick, player.last_received_tick) {
        player.last_received_tick = tick;
    }
    StoreResult::Stored
}
