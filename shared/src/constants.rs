use crate::types::{EntityId, PlayerId};

/// Player id reserved for the server itself.
pub const SERVER_PLAYER_ID: PlayerId = 0;

/// Highest assignable player id; valid client ids are `1..=MAX_PLAYERS`.
pub const MAX_PLAYERS: u8 = 255;

/// Number of networked entity ids; synced ids occupy `[0, MAX_SYNCED_ENTITY_COUNT)`.
pub const MAX_SYNCED_ENTITY_COUNT: u16 = 8192;

/// First id of the local-only (never replicated) range.
pub const FIRST_LOCAL_ENTITY_ID: EntityId = MAX_SYNCED_ENTITY_COUNT;

/// Sentinel meaning "no entity" (e.g. a child with no parent).
pub const INVALID_ENTITY_ID: EntityId = u16::MAX;

/// Upper bound on buffered input frames per player; older frames are evicted first.
pub const MAX_STORED_INPUTS: usize = 30;

/// Upper bound on diff parts per send tick; overflowing players are re-baselined.
pub const MAX_PARTS: u8 = 255;
