//! In-memory peer transport.
//!
//! # Model
//!
//! A [`Switchboard`] maps each [`PeerAddress`] to the sending half of an
//! unbounded `tokio::sync::mpsc` channel carrying encoded frames.
//! Registering an address returns the matching [`Mailbox`].  Sends never
//! block; receives wait with an explicit deadline.
//!
//! Delivery is FIFO per sender/receiver pair and gives no ordering between
//! different senders.  A peer whose mailbox was dropped yields
//! [`SendError::Disconnected`].

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::{trace, warn};

use crate::codec::{decode_json, sender_of};
use crate::{encode, Envelope, Message, PeerAddress, ProtocolResult, RecvError, SendError};

type Frame = Vec<u8>;

// ── Switchboard ───────────────────────────────────────────────────────────────

/// Registry of live peers.  Share as `Arc<Switchboard>`.
#[derive(Default)]
pub struct Switchboard {
    peers: RwLock<FxHashMap<PeerAddress, UnboundedSender<Frame>>>,
}

impl Switchboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `addr` and return its mailbox.  Re-registering replaces the
    /// previous mailbox, which then sees [`RecvError::Closed`].
    pub fn register(&self, addr: PeerAddress) -> Mailbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr, tx);
        Mailbox { addr, rx }
    }

    /// Remove `addr`; later sends to it fail with `UnknownPeer`.
    pub fn deregister(&self, addr: PeerAddress) -> bool {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&addr)
            .is_some()
    }

    pub fn is_registered(&self, addr: PeerAddress) -> bool {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&addr)
    }

    /// Deliver an already-encoded frame.
    pub fn send_frame(&self, to: PeerAddress, frame: Frame) -> Result<(), SendError> {
        let peers = self.peers.read().unwrap_or_else(PoisonError::into_inner);
        let tx = peers.get(&to).ok_or(SendError::UnknownPeer(to))?;
        tx.send(frame).map_err(|_| SendError::Disconnected(to))
    }

    /// Encode and deliver `message` from `from` to `to`.
    pub fn send(&self, from: PeerAddress, to: PeerAddress, message: Message) -> ProtocolResult<()> {
        let kind = message.kind();
        let frame = encode(&Envelope::new(from, message))?;
        self.send_frame(to, frame)?;
        trace!(%from, %to, kind, "sent");
        Ok(())
    }

    /// Send `message` to every address in `targets`, skipping `from`.
    /// Returns how many deliveries succeeded; failures are logged.
    pub fn broadcast<I>(&self, from: PeerAddress, targets: I, message: &Message) -> usize
    where
        I: IntoIterator<Item = PeerAddress>,
    {
        let frame = match encode(&Envelope::new(from, message.clone())) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%from, error = %e, "broadcast encode failed");
                return 0;
            }
        };
        let mut delivered = 0;
        for to in targets.into_iter().filter(|to| *to != from) {
            match self.send_frame(to, frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => trace!(%from, error = %e, "broadcast delivery failed"),
            }
        }
        delivered
    }

    /// Every registered address, sorted.
    pub fn peers(&self) -> Vec<PeerAddress> {
        let mut out: Vec<PeerAddress> = self
            .peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        out.sort_unstable();
        out
    }

    /// Registered vehicles and ambulances, sorted: the gossip audience.
    pub fn vehicles(&self) -> Vec<PeerAddress> {
        let mut out = self.peers();
        out.retain(PeerAddress::is_vehicle);
        out
    }
}

// ── Mailbox ───────────────────────────────────────────────────────────────────

/// Receiving half of one peer's channel.
pub struct Mailbox {
    addr: PeerAddress,
    rx:   UnboundedReceiver<Frame>,
}

impl Mailbox {
    #[inline]
    pub fn addr(&self) -> PeerAddress {
        self.addr
    }

    /// Wait up to `timeout` for the next frame.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Envelope, RecvError> {
        self.recv_until(Instant::now() + timeout).await
    }

    /// Wait until `deadline` for the next frame.
    pub async fn recv_until(&mut self, deadline: Instant) -> Result<Envelope, RecvError> {
        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Err(_) => Err(RecvError::Timeout),
            Ok(None) => Err(RecvError::Closed),
            Ok(Some(frame)) => self.open(&frame),
        }
    }

    /// Take the next frame if one is already queued.
    pub fn try_recv(&mut self) -> Result<Envelope, RecvError> {
        match self.rx.try_recv() {
            Ok(frame) => self.open(&frame),
            Err(TryRecvError::Empty) => Err(RecvError::Empty),
            Err(TryRecvError::Disconnected) => Err(RecvError::Closed),
        }
    }

    fn open(&self, frame: &[u8]) -> Result<Envelope, RecvError> {
        decode_json(frame).map_err(|source| {
            let from = sender_of(frame);
            warn!(to = %self.addr, from = ?from, error = %source, "malformed frame");
            RecvError::Malformed { from, source }
        })
    }
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// A participant's view of the transport: its own address and mailbox plus
/// a handle to the switchboard for sending.
pub struct Endpoint {
    board:   Arc<Switchboard>,
    mailbox: Mailbox,
}

impl Endpoint {
    /// Register `addr` on `board`.
    pub fn connect(board: Arc<Switchboard>, addr: PeerAddress) -> Self {
        let mailbox = board.register(addr);
        Self { board, mailbox }
    }

    #[inline]
    pub fn addr(&self) -> PeerAddress {
        self.mailbox.addr
    }

    #[inline]
    pub fn board(&self) -> &Arc<Switchboard> {
        &self.board
    }

    pub fn send(&self, to: PeerAddress, message: Message) -> ProtocolResult<()> {
        self.board.send(self.addr(), to, message)
    }

    pub async fn recv(&mut self, timeout: Duration) -> Result<Envelope, RecvError> {
        self.mailbox.recv(timeout).await
    }

    pub async fn recv_until(&mut self, deadline: Instant) -> Result<Envelope, RecvError> {
        self.mailbox.recv_until(deadline).await
    }

    pub fn try_recv(&mut self) -> Result<Envelope, RecvError> {
        self.mailbox.try_recv()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.board.deregister(self.addr());
    }
}
