//! Broadcast dispatch: the set of connections subscribed to one room.
//!
//! Each room actor owns a [`Subscribers`] set. Connection tasks hand the
//! actor an [`OutboundSender`] when they join, and the actor pushes
//! [`Outbound`] events through it: to one connection, or to every
//! subscriber with an optional exclusion.
//!
//! # Delivery receipts
//!
//! An [`Outbound`] can carry a oneshot receipt that the connection task
//! fires once the frame has been written to the socket. The room uses it
//! to hold back `player_joined` until the joiner has its `room_state`.

use std::collections::BTreeMap;

use dibujo_protocol::{PlayerId, ServerEvent};
use dibujo_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};

/// An event on its way to one connection.
#[derive(Debug)]
pub struct Outbound {
    pub event: ServerEvent,
    delivered: Option<oneshot::Sender<()>>,
}

impl Outbound {
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event,
            delivered: None,
        }
    }

    /// An outbound event plus the receiver that resolves once it is written.
    pub fn with_receipt(event: ServerEvent) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                event,
                delivered: Some(tx),
            },
            rx,
        )
    }

    /// Called by the connection task after the frame hit the socket.
    pub fn mark_delivered(&mut self) {
        if let Some(tx) = self.delivered.take() {
            let _ = tx.send(());
        }
    }
}

/// Channel sender for delivering outbound events to a connection task.
pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

/// Who an event produced by the game is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Everyone in the room.
    All,
    /// One player.
    Player(PlayerId),
}

/// The connections currently subscribed to a room.
#[derive(Debug, Default)]
pub struct Subscribers {
    conns: BTreeMap<ConnectionId, OutboundSender>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the sender for `conn`.
    pub fn subscribe(&mut self, conn: ConnectionId, sender: OutboundSender) {
        self.conns.insert(conn, sender);
    }

    pub fn unsubscribe(&mut self, conn: ConnectionId) -> bool {
        self.conns.remove(&conn).is_some()
    }

    /// Sends to one connection. Returns `false` if it is not subscribed or
    /// its task is gone.
    pub fn send_to_connection(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        self.push(conn, Outbound::new(event))
    }

    /// Like [`send_to_connection`](Self::send_to_connection) but hands back
    /// a receipt. The receipt errors out if the frame can never be written.
    pub fn send_with_receipt(
        &self,
        conn: ConnectionId,
        event: ServerEvent,
    ) -> oneshot::Receiver<()> {
        let (outbound, receipt) = Outbound::with_receipt(event);
        self.push(conn, outbound);
        receipt
    }

    /// Sends to every subscriber except `except`.
    pub fn send_to_room(&self, event: &ServerEvent, except: Option<ConnectionId>) {
        for (&conn, sender) in &self.conns {
            if Some(conn) != except {
                let _ = sender.send(Outbound::new(event.clone()));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    fn push(&self, conn: ConnectionId, outbound: Outbound) -> bool {
        match self.conns.get(&conn) {
            Some(sender) => sender.send(outbound).is_ok(),
            None => false,
        }
    }
}
