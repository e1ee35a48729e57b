use std::collections::VecDeque;
use std::ops::BitOr;

use thiserror::Error;

use tickwire_shared::{EntityId, PlayerId, RpcId, Tick};

/// Errors that can occur while queueing remote calls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// Payload length must equal `element_size * element_count`.
    #[error("rpc {rpc_id} payload is {actual} byte(s), expected {expected}")]
    PayloadSizeMismatch {
        rpc_id: RpcId,
        expected: usize,
        actual: usize,
    },

    /// Remote calls bind to a live entity's serializer.
    #[error("rpc {rpc_id} targets missing entity {entity_id}")]
    NoSuchEntity { rpc_id: RpcId, entity_id: EntityId },
}

/// Delivery and audience selection for a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecuteFlags(u8);

impl ExecuteFlags {
    /// Deliver to the entity's owning player.
    pub const SEND_TO_OWNER: Self = Self(1);
    /// Deliver to every player other than the owner.
    pub const SEND_TO_OTHER: Self = Self(1 << 1);
    /// Carry on the reliable channel instead of riding diff parts.
    pub const RELIABLE: Self = Self(1 << 2);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all_players() -> Self {
        Self(Self::SEND_TO_OWNER.0 | Self::SEND_TO_OTHER.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Whether `player` is in this call's audience for an entity owned by
    /// `owner`.
    pub fn audience_includes(self, player: PlayerId, owner: PlayerId) -> bool {
        if player == owner {
            self.contains(Self::SEND_TO_OWNER)
        } else {
            self.contains(Self::SEND_TO_OTHER)
        }
    }
}

impl BitOr for ExecuteFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A tick-tagged remote call queued on an entity's serializer.
///
/// The payload is `element_count` packed elements of `element_size` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCallPacket {
    pub tick: Tick,
    pub rpc_id: RpcId,
    pub flags: ExecuteFlags,
    pub element_size: u16,
    pub element_count: u16,
    pub data: Vec<u8>,
}

impl RemoteCallPacket {
    pub fn payload_len(&self) -> usize {
        usize::from(self.element_size) * usize::from(self.element_count)
    }

    /// Bytes this call occupies inside a diff stream, record framing
    /// included.
    pub fn wire_size(&self) -> usize {
        // tag + entity id + rpc id + flags + element size + element count
        1 + 2 + 2 + 1 + 2 + 2 + self.payload_len()
    }
}

/// FIFO free list of remote call shells, reused across ticks.
pub struct RpcPool {
    free: VecDeque<RemoteCallPacket>,
}

impl RpcPool {
    pub fn new() -> Self {
        Self {
            free: VecDeque::new(),
        }
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn acquire(&mut self) -> RemoteCallPacket {
        self.free.pop_front().unwrap_or(RemoteCallPacket {
            tick: 0,
            rpc_id: 0,
            flags: ExecuteFlags::empty(),
            element_size: 0,
            element_count: 0,
            data: Vec::new(),
        })
    }

    /// Returns a call shell to the pool, keeping its payload allocation.
    pub fn release(&mut self, mut packet: RemoteCallPacket) {
        packet.data.clear();
        self.free.push_back(packet);
    }
}

impl Default for RpcPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecuteFlags, RpcPool};

    #[test]
    fn audience_selection() {
        let owner_only = ExecuteFlags::SEND_TO_OWNER;
        assert!(owner_only.audience_includes(3, 3));
        assert!(!owner_only.audience_includes(4, 3));

        let others = ExecuteFlags::SEND_TO_OTHER;
        assert!(!others.audience_includes(3, 3));
        assert!(others.audience_includes(4, 3));

        let everyone = ExecuteFlags::all_players();
        assert!(everyone.audience_includes(3, 3));
        assert!(everyone.audience_includes(4, 3));
    }

    #[test]
    fn flags_compose() {
        let flags = ExecuteFlags::SEND_TO_OWNER | ExecuteFlags::RELIABLE;
        assert!(flags.contains(ExecuteFlags::RELIABLE));
        assert!(!flags.contains(ExecuteFlags::SEND_TO_OTHER));
        assert_eq!(ExecuteFlags::from_bits(flags.bits()), flags);
    }

    #[test]
    fn pool_keeps_payload_allocations() {
        let mut pool = RpcPool::new();
        let mut packet = pool.acquire();
        packet.data.extend_from_slice(&[1, 2, 3, 4]);
        let capacity = packet.data.capacity();
        pool.release(packet);

        let packet = pool.acquire();
        assert!(packet.data.is_empty());
        assert_eq!(packet.data.capacity(), capacity);
        assert_eq!(pool.available(), 0);
    }
}
