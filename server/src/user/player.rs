use std::collections::VecDeque;

use tickwire_shared::{BufferPool, PlayerId, SequenceBuffer, Tick};

use super::input_buffer::InputFrame;
use crate::transport::PeerId;

/// Replication lifecycle of a connected player.
///
/// A new player asks for a baseline, then waits for its first input, then
/// for that input to be consumed by a logic tick, then runs steady-state.
/// Unreliable loss beyond one full snapshot window sends it back to
/// `RequestBaseline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    RequestBaseline,
    WaitingForFirstInput,
    WaitingForFirstInputProcess,
    Active,
}

/// One connected player: identity, replication cursors, and buffered input.
pub struct Player {
    pub id: PlayerId,
    /// Slot in the compact active-players array.
    pub array_index: usize,
    pub state: PlayerState,
    pub peer: PeerId,
    /// Oldest server tick the player still interpolates from; the global
    /// history floor is the minimum of these.
    pub state_a_tick: Tick,
    pub state_b_tick: Tick,
    /// Newest server tick the player has confirmed seeing; diffs are
    /// computed against it.
    pub current_server_tick: Tick,
    pub last_received_tick: Tick,
    pub last_processed_tick: Tick,
    pub simulated_server_tick: Tick,
    pub lerp_time: f32,
    pub available_input: SequenceBuffer<InputFrame>,
}

impl Player {
    fn new(id: PlayerId, array_index: usize, peer: PeerId) -> Self {
        Self {
            id,
            array_index,
            state: PlayerState::RequestBaseline,
            peer,
            state_a_tick: 0,
            state_b_tick: 0,
            current_server_tick: 0,
            last_received_tick: 0,
            last_processed_tick: 0,
            simulated_server_tick: 0,
            lerp_time: 0.0,
            available_input: SequenceBuffer::new(),
        }
    }

    /// Returns every buffered input frame's block to the pool.
    pub(crate) fn drain_input(&mut self, input_pool: &mut BufferPool) {
        for (_, frame) in self.available_input.drain() {
            if let Some(data) = frame.data {
                input_pool.release(data);
            }
        }
    }
}

/// Fixed-capacity player slots with FIFO id recycling and a compact array
/// for iteration in join order.
pub struct PlayerTable {
    slots: Vec<Option<Player>>,
    active: Vec<PlayerId>,
    free_ids: VecDeque<PlayerId>,
}

impl PlayerTable {
    pub fn new(max_players: u8) -> Self {
        Self {
            slots: (0..=max_players).map(|_| None).collect(),
            active: Vec::new(),
            free_ids: (1..=max_players).collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.active.len()
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.slots.get(usize::from(id))?.as_ref()
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.slots.get_mut(usize::from(id))?.as_mut()
    }

    /// Player ids in active-index order.
    pub fn active_ids(&self) -> Vec<PlayerId> {
        self.active.clone()
    }

    /// Claims a free id for a new player. Returns `None` when the table is
    /// full; the caller decides what to tell the peer.
    pub fn add(&mut self, peer: PeerId) -> Option<PlayerId> {
        let id = self.free_ids.pop_front()?;
        let array_index = self.active.len();
        self.active.push(id);
        self.slots[usize::from(id)] = Some(Player::new(id, array_index, peer));
        Some(id)
    }

    /// Removes a player, swap-filling its compact-array slot and fixing up
    /// the moved player's `array_index`. The id goes back to the queue.
    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        let player = self.slots.get_mut(usize::from(id))?.take()?;

        let index = player.array_index;
        self.active.swap_remove(index);
        if let Some(&moved_id) = self.active.get(index) {
            if let Some(moved) = self.slots[usize::from(moved_id)].as_mut() {
                moved.array_index = index;
            }
        }
        self.free_ids.push_back(id);

        Some(player)
    }
}

#[cfg(test)]
mod tests {
    use super::{PlayerState, PlayerTable};
    use crate::transport::PeerId;

    #[test]
    fn new_players_request_a_baseline() {
        let mut table = PlayerTable::new(4);
        let id = table.add(PeerId(1)).unwrap();
        assert_eq!(table.get(id).unwrap().state, PlayerState::RequestBaseline);
    }

    #[test]
    fn full_table_returns_none() {
        let mut table = PlayerTable::new(2);
        assert!(table.add(PeerId(1)).is_some());
        assert!(table.add(PeerId(2)).is_some());
        assert!(table.add(PeerId(3)).is_none());
    }

    #[test]
    fn ids_recycle_fifo() {
        let mut table = PlayerTable::new(3);
        let a = table.add(PeerId(1)).unwrap();
        let b = table.add(PeerId(2)).unwrap();
        table.remove(a);
        table.remove(b);
        let c = table.add(PeerId(3)).unwrap();
        // id 3 was still unused and queued ahead of the returned ids
        assert_eq!(c, 3);
        assert_eq!(table.add(PeerId(4)).unwrap(), a);
        assert_eq!(table.add(PeerId(5)).unwrap(), b);
    }

    #[test]
    fn swap_remove_fixes_array_index() {
        let mut table = PlayerTable::new(4);
        let a = table.add(PeerId(1)).unwrap();
        let b = table.add(PeerId(2)).unwrap();
        let c = table.add(PeerId(3)).unwrap();

        table.remove(a);
        // c moved into a's slot
        assert_eq!(table.get(c).unwrap().array_index, 0);
        assert_eq!(table.get(b).unwrap().array_index, 1);
        assert_eq!(table.active_ids(), vec![c, b]);
    }
}
