use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};

use thiserror::Error;

/// Opaque per-peer tag assigned by the integrator, used to bind a `Player`
/// to whatever connection object the transport tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub u64);

/// Delivery modes the engine requires from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMethod {
    /// Ordered, retransmitted until acknowledged. Baselines use this.
    ReliableOrdered,
    /// Fire-and-forget. Diff parts use this.
    Unreliable,
}

/// The send side of the transport failed to accept a packet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to send packet to peer")]
pub struct SendError;

/// Outgoing half of the transport contract the engine consumes.
///
/// The engine treats unreliable sends as fire-and-forget; a failed reliable
/// send is the transport's problem to surface to the integrator.
pub trait PacketSender {
    fn send(
        &mut self,
        peer: &PeerId,
        payload: &[u8],
        delivery: DeliveryMethod,
    ) -> Result<(), SendError>;

    /// Largest payload a single packet may carry for the given delivery
    /// method. Diff part capacity derives from the unreliable value.
    fn max_single_packet_size(&self, delivery: DeliveryMethod) -> usize;

    /// Flush hint, invoked once after a send tick finishes all players.
    fn trigger_update(&mut self) {}
}

/// In-process transport backed by an unbounded channel.
///
/// Tests and local loops use this to observe every packet the engine emits
/// without a socket in the way.
pub struct PacketChannel;

impl PacketChannel {
    pub fn unbounded(unreliable_mtu: usize) -> (Box<dyn PacketSender>, ChannelReceiver) {
        let (sender, receiver) = channel();
        (
            Box::new(ChannelSender {
                sender,
                unreliable_mtu,
            }),
            ChannelReceiver { receiver },
        )
    }
}

struct ChannelSender {
    sender: Sender<(PeerId, DeliveryMethod, Box<[u8]>)>,
    unreliable_mtu: usize,
}

impl PacketSender for ChannelSender {
    fn send(
        &mut self,
        peer: &PeerId,
        payload: &[u8],
        delivery: DeliveryMethod,
    ) -> Result<(), SendError> {
        self.sender
            .send((*peer, delivery, payload.into()))
            .map_err(|_| SendError)
    }

    fn max_single_packet_size(&self, delivery: DeliveryMethod) -> usize {
        match delivery {
            // reliable-ordered transports fragment internally
            DeliveryMethod::ReliableOrdered => 1 << 20,
            DeliveryMethod::Unreliable => self.unreliable_mtu,
        }
    }
}

pub struct ChannelReceiver {
    receiver: Receiver<(PeerId, DeliveryMethod, Box<[u8]>)>,
}

impl ChannelReceiver {
    /// Receives the next packet the engine sent, if any.
    pub fn receive(&mut self) -> Option<(PeerId, DeliveryMethod, Box<[u8]>)> {
        match self.receiver.try_recv() {
            Ok(packet) => Some(packet),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }
}
