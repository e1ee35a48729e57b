//! Property tests over random inputs: codec round-trips, sequence
//! arithmetic, and the bounded input buffer invariant.

mod common;

use proptest::prelude::*;

use common::{drain, engine, input_packet, NullHandler, INPUT_SIZE};
use tickwire_shared::{
    lerp_sequence, sequence_diff, sequence_greater_than, sequence_less_than, MAX_STORED_INPUTS,
};
use tickwire_server::PeerId;

proptest! {
    /// Any frame sequence a symmetric encoder emits decodes back to the
    /// same (tick, data) frames in tick order, however the frames are
    /// split across packets.
    #[test]
    fn input_codec_round_trips(
        blocks in prop::collection::vec(prop::array::uniform4(any::<u8>()), 1..25),
        split_seed in any::<prop::sample::Index>(),
    ) {
        let (mut engine, mut receiver, player) = {
            let (mut engine, mut receiver) = engine(1200);
            let player = engine.add_player(PeerId(1)).unwrap();
            // two ticks so frame headers referencing tick 1 validate
            engine.update(&mut NullHandler);
            engine.update(&mut NullHandler);
            drain(&mut receiver);
            (engine, receiver, player)
        };

        let first_tick: u16 = 1;
        let frames: Vec<(u16, u16, f32, [u8; INPUT_SIZE])> =
            blocks.iter().map(|&block| (0, 1, 0.25, block)).collect();

        // split the stream into two packets at an arbitrary frame boundary
        let split = split_seed.index(frames.len());
        let (head, tail) = frames.split_at(split);
        if !head.is_empty() {
            engine.receive(player, &input_packet(first_tick, head)).unwrap();
        }
        if !tail.is_empty() {
            let tail_first = first_tick.wrapping_add(split as u16);
            engine.receive(player, &input_packet(tail_first, tail)).unwrap();
        }

        let stored: Vec<(u16, Vec<u8>)> = engine
            .player(player)
            .unwrap()
            .available_input
            .iter()
            .map(|(tick, frame)| (*tick, frame.data.as_deref().unwrap().to_vec()))
            .collect();

        prop_assert_eq!(stored.len(), blocks.len());
        for (index, (tick, data)) in stored.iter().enumerate() {
            prop_assert_eq!(*tick, first_tick.wrapping_add(index as u16));
            prop_assert_eq!(&data[..], &blocks[index][..]);
        }
        drain(&mut receiver);
    }

    /// diff is antisymmetric and zero exactly on equality.
    #[test]
    fn sequence_diff_is_antisymmetric(a in any::<u16>(), b in any::<u16>()) {
        prop_assert_eq!(sequence_diff(a, b), sequence_diff(b, a).wrapping_neg());
        prop_assert_eq!(sequence_diff(a, b) == 0, a == b);
    }

    /// greater/less agree with the sign of diff inside the ordering window.
    #[test]
    fn sequence_ordering_matches_diff_sign(a in any::<u16>(), b in any::<u16>()) {
        prop_assert_eq!(sequence_greater_than(a, b), sequence_diff(a, b) > 0);
        prop_assert_eq!(sequence_less_than(a, b), sequence_diff(a, b) < 0);
    }

    /// Interpolation stays on the wrapping segment between its endpoints.
    #[test]
    fn lerp_sequence_stays_in_segment(a in any::<u16>(), span in 0u16..1000, t in 0.0f32..1.0) {
        let b = a.wrapping_add(span);
        let mid = lerp_sequence(a, b, t);
        prop_assert!(sequence_diff(mid, a) >= 0);
        prop_assert!(sequence_diff(b, mid) >= 0);
    }

    /// However many frames arrive, the buffer holds at most
    /// MAX_STORED_INPUTS and always the newest window.
    #[test]
    fn input_buffer_stays_bounded(count in 1u16..120) {
        let (mut engine, mut receiver) = engine(1200);
        let player = engine.add_player(PeerId(1)).unwrap();
        engine.update(&mut NullHandler);
        engine.update(&mut NullHandler);
        drain(&mut receiver);

        for tick in 1..=count {
            engine
                .receive(player, &input_packet(tick, &[(0, 1, 0.0, [0u8; INPUT_SIZE])]))
                .unwrap();
        }

        let stored = engine.player(player).unwrap().available_input.len();
        prop_assert!(stored <= MAX_STORED_INPUTS);
        prop_assert_eq!(stored, usize::from(count).min(MAX_STORED_INPUTS));
        if let Some((front, _)) = engine.player(player).unwrap().available_input.front() {
            let expected_front = count.saturating_sub(MAX_STORED_INPUTS as u16) + 1;
            prop_assert_eq!(*front, expected_front);
        }
    }
}
