use log::warn;
use thiserror::Error;

use tickwire_shared::{
    decode_delta, sequence_diff, sequence_greater_than, BufferPool, ByteReader, DeltaError,
    InputPacketHeader, PacketError, PlayerId, Tick, WireError,
};

use crate::user::input_buffer::{store_frame, InputFrame};
use crate::user::player::{Player, PlayerState};

/// Errors that can occur while decoding ingress packets.
///
/// All of these are warn-and-discard: the offending packet's remainder is
/// dropped and the player's state is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngressError {
    #[error("packet from player {player_id} does not start with the engine header byte")]
    BadHeaderByte { player_id: PlayerId },

    #[error("packet from player {player_id} carries an unknown kind: {source}")]
    UnknownKind {
        player_id: PlayerId,
        source: PacketError,
    },

    #[error("player {player_id} sent a server-bound packet of egress kind {kind:#04x}")]
    UnexpectedKind { player_id: PlayerId, kind: u8 },

    #[error("input packet from player {player_id} is undersized: {len} byte(s) after the kind")]
    Undersized { player_id: PlayerId, len: usize },

    #[error(
        "input header from player {player_id} references unexecuted ticks \
         (state_a={state_a}, state_b={state_b}, server tick {server_tick})"
    )]
    BadSequence {
        player_id: PlayerId,
        state_a: Tick,
        state_b: Tick,
        server_tick: Tick,
    },

    #[error("input packet from player {player_id} is truncated: {source}")]
    Wire {
        player_id: PlayerId,
        source: WireError,
    },

    #[error("input packet from player {player_id} carries a bad delta block: {source}")]
    Delta {
        player_id: PlayerId,
        source: DeltaError,
    },

    #[error("no player with id {player_id}")]
    UnknownPlayer { player_id: PlayerId },
}

/// Decodes a `ClientInput` body into per-tick frames on the player's input
/// buffer.
///
/// The first frame's block is raw; later frames delta-decode against the
/// previous decoded block, carried across iterations in `seed`. Frames are
/// tick-stamped `first_client_tick + index` with 16-bit wrap. A bad header
/// aborts the remaining packet without touching player state; frames
/// already stored from the same packet stay.
pub(crate) fn process_client_input(
    player: &mut Player,
    input_pool: &mut BufferPool,
    seed: &mut [u8],
    server_tick: Tick,
    reader: &mut ByteReader,
) -> Result<(), IngressError> {
    let player_id = player.id;
    if reader.remaining() < 3 {
        return Err(IngressError::Undersized {
            player_id,
            len: reader.remaining(),
        });
    }

    let first_client_tick = reader.read_u16().map_err(|source| IngressError::Wire {
        player_id,
        source,
    })?;

    let input_size = input_pool.buffer_size();
    let mut frame_index: Tick = 0;

    while reader.remaining() > 0 {
        let header = InputPacketHeader::read(reader).map_err(|source| IngressError::Wire {
            player_id,
            source,
        })?;

        if sequence_diff(header.state_a, server_tick) > 0
            || sequence_diff(header.state_b, server_tick) > 0
        {
            return Err(IngressError::BadSequence {
                player_id,
                state_a: header.state_a,
                state_b: header.state_b,
                server_tick,
            });
        }
        let header = InputPacketHeader {
            lerp_msec: header.lerp_msec.clamp(0.0, 1.0),
            ..header
        };

        let mut block = input_pool.acquire();
        let decoded = if frame_index == 0 {
            reader
                .read_bytes(input_size)
                .map(|raw| block.copy_from_slice(raw))
                .map_err(|source| IngressError::Wire { player_id, source })
        } else {
            decode_delta(seed, &mut block, reader)
                .map_err(|source| IngressError::Delta { player_id, source })
        };
        if let Err(error) = decoded {
            input_pool.release(block);
            return Err(error);
        }
        seed.copy_from_slice(&block);

        let tick = first_client_tick.wrapping_add(frame_index);
        if sequence_greater_than(header.state_b, player.current_server_tick) {
            player.current_server_tick = header.state_b;
        }

        let was_waiting = player.state == PlayerState::WaitingForFirstInput;
        store_frame(
            player,
            InputFrame {
                tick,
                header,
                data: Some(block),
            },
            input_pool,
        );
        if was_waiting {
            player.state = PlayerState::WaitingForFirstInputProcess;
        }

        frame_index = frame_index.wrapping_add(1);
    }

    Ok(())
}

/// Logs an ingress failure the way the engine reports all malformed
/// traffic: a warning naming the player, nothing else changed.
pub(crate) fn warn_discarded(error: &IngressError) {
    warn!("discarding ingress packet: {error}");
}
