use std::sync::Weak;

use tokio::select;

use crate::Actor;
use crate::mailbox::{Inbox, Mailbox};

/// Drives one actor: handles messages one by one until the actor is
/// killed, its inbox closes, or no handle is left.
pub(crate) async fn run_actor<S: Send + 'static>(
    mailbox: Weak<Mailbox<S>>,
    mut state: S,
    inbox: Inbox<S>,
) {
    let Inbox {
        mut msg_rx,
        mut kill_rx,
    } = inbox;
    debug!("started");
    loop {
        let msg = select! {
            biased;

            _ = kill_rx.changed() => break,
            msg = msg_rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        trace!("received message: {msg:?}");

        // Handles are only needed while a message is being processed, so
        // the actor doesn't keep itself alive.
        let Some(mailbox) = mailbox.upgrade() else {
            debug!("all handles dropped, discarding the message");
            break;
        };
        trace_span!("handle").in_scope(|| {
            msg.handle_box(&mut state, &Actor::from_mailbox(mailbox));
        });
    }
    debug!("stopped");
}
