use std::fmt::Debug;

use tokio::sync::{mpsc, watch};

use crate::{Actor, ActorDeadError};

/// Object-safe form of [`Message`], so messages of different types can
/// share one queue.
pub trait BoxMessage<S>: Send + Debug + 'static {
    /// Handles the boxed message.
    fn handle_box(self: Box<Self>, state: &mut S, handle: &Actor<S>);
}

/// A message an actor with state `S` can handle.
pub trait Message<S>: BoxMessage<S> {
    /// Handles the message with mutable access to the actor's state.
    ///
    /// `handle` lets the message schedule follow-up messages to the same
    /// actor, typically from tasks it spawns.
    fn handle(self, state: &mut S, handle: &Actor<S>);
}

impl<S, M: Message<S>> BoxMessage<S> for M {
    #[inline]
    fn handle_box(self: Box<Self>, state: &mut S, handle: &Actor<S>) {
        (*self).handle(state, handle)
    }
}

pub(crate) type BoxedMessage<S> = Box<dyn BoxMessage<S>>;

pub(crate) struct Mailbox<S> {
    msg_tx: mpsc::UnboundedSender<BoxedMessage<S>>,
    kill_tx: watch::Sender<bool>,
}

pub(crate) struct Inbox<S> {
    pub msg_rx: mpsc::UnboundedReceiver<BoxedMessage<S>>,
    pub kill_rx: watch::Receiver<bool>,
}

impl<S: Send + 'static> Mailbox<S> {
    pub fn new() -> (Self, Inbox<S>) {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = watch::channel(false);
        (Mailbox { msg_tx, kill_tx }, Inbox { msg_rx, kill_rx })
    }

    #[inline]
    pub fn send(&self, msg: BoxedMessage<S>) -> Result<(), ActorDeadError> {
        self.msg_tx.send(msg).map_err(|_| ActorDeadError)
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.msg_tx.is_closed()
    }

    #[inline]
    pub fn try_kill(&self) {
        self.kill_tx.send(true).ok();
    }
}
