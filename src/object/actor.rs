//! Bus participant hosting one distributed object.
//!
//! Each object runs as its own task. Datagrams addressed to it are handled in
//! arrival order; effects are applied before the next datagram is taken.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{DistributedObject, Effect};
use crate::bus::{Mailbox, ParticipantId};
use crate::context::{wait_for_shutdown, ServerContext};
use crate::directory::{DirectoryError, ObjectEntry, SharedObject};

/// Register `object` with the bus and directory, apply its generation
/// effects and start its mailbox loop.
///
/// Fails without side effects if another live object holds the same id.
pub async fn spawn_object(
    ctx: &ServerContext,
    object: DistributedObject,
    effects: Vec<Effect>,
) -> Result<(ObjectEntry, JoinHandle<()>), DirectoryError> {
    let do_id = object.do_id();
    let (participant, mailbox) = ctx.bus().register(format!("object:{do_id}")).await;
    let entry = ObjectEntry {
        participant,
        object: Arc::new(Mutex::new(object)),
    };

    if let Err(e) = ctx.directory().insert(do_id, entry.clone()).await {
        ctx.bus().deregister(participant).await;
        return Err(e);
    }

    apply_effects(ctx, participant, do_id, effects).await;

    let handle = tokio::spawn(run(
        ctx.clone(),
        participant,
        do_id,
        Arc::clone(&entry.object),
        mailbox,
    ));
    Ok((entry, handle))
}

async fn run(
    ctx: ServerContext,
    participant: ParticipantId,
    do_id: u32,
    object: SharedObject,
    mut mailbox: Mailbox,
) {
    let mut shutdown = ctx.shutdown_signal();
    loop {
        tokio::select! {
            received = mailbox.recv() => {
                let Some(datagram) = received else {
                    break;
                };
                let effects = match object.lock().await.handle(&datagram) {
                    Ok(effects) => effects,
                    Err(e) => {
                        warn!(
                            do_id,
                            msg_type = datagram.msg_type(),
                            sender = datagram.sender(),
                            error = %e,
                            "Dropped datagram"
                        );
                        continue;
                    }
                };
                if apply_effects(&ctx, participant, do_id, effects).await {
                    break;
                }
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
    debug!(do_id, "Object task stopped");
}

/// Apply effects in order. Returns `true` once the object has been destroyed.
async fn apply_effects(
    ctx: &ServerContext,
    participant: ParticipantId,
    do_id: u32,
    effects: Vec<Effect>,
) -> bool {
    for effect in effects {
        match effect {
            Effect::Subscribe(channel) => {
                if let Err(e) = ctx.bus().subscribe(participant, channel).await {
                    warn!(do_id, channel, error = %e, "Subscribe failed");
                }
            }
            Effect::Unsubscribe(channel) => ctx.bus().unsubscribe(participant, channel).await,
            Effect::Publish(datagram) => {
                ctx.bus().publish_from(Some(participant), datagram).await;
            }
            Effect::Destroy => {
                ctx.bus().deregister(participant).await;
                ctx.directory().remove(do_id).await;
                return true;
            }
        }
    }
    false
}
