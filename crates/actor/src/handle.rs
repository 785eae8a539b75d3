use std::sync::Arc;

use tracing::Instrument;

use crate::mailbox::Mailbox;
use crate::scheduler::run_actor;
use crate::{ActorDeadError, Message};

/// Handle to an actor. Cloning it is cheap.
///
/// The actor stops once every handle has been dropped.
pub struct Actor<S> {
    mailbox: Arc<Mailbox<S>>,
}

impl<S: Send + 'static> Actor<S> {
    /// Spawns the actor on the current tokio runtime.
    ///
    /// Prefer the wrapper type generated by [`crate::define_actor`] over
    /// calling this directly.
    pub fn spawn(state: S, label: Option<&str>) -> Self {
        let (mailbox, inbox) = Mailbox::new();
        let mailbox = Arc::new(mailbox);
        tokio::spawn(
            run_actor(Arc::downgrade(&mailbox), state, inbox)
                .instrument(debug_span!("actor", label)),
        );
        Self { mailbox }
    }

    #[inline]
    pub(crate) fn from_mailbox(mailbox: Arc<Mailbox<S>>) -> Self {
        Self { mailbox }
    }

    /// Queues a message for the actor.
    #[inline]
    pub fn send<M: Message<S>>(&self, msg: M) -> Result<(), ActorDeadError> {
        self.mailbox.send(Box::new(msg))
    }

    /// Returns `false` once the actor task has stopped.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.mailbox.is_alive()
    }

    /// Asks the actor to stop. Messages already queued are dropped.
    #[inline]
    pub fn try_kill(&self) {
        self.mailbox.try_kill();
    }
}

impl<S> Clone for Actor<S> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}
