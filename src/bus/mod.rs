//! Channel-subscription message bus.
//!
//! This module contains:
//! - `MessageBus`: channel -> participant routing table with fan-out publish
//! - Participant mailboxes: each participant drains its own unbounded queue,
//!   so a slow participant never stalls a publisher or other subscribers
//!
//! Delivery is at most once per participant per publish, even when the
//! participant is subscribed to several of the destination channels.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::channel::Channel;
use crate::datagram::Datagram;

/// Identifier assigned to a participant at registration.
pub type ParticipantId = u64;

/// Receiving end of a participant's queue.
pub type Mailbox = mpsc::UnboundedReceiver<Arc<Datagram>>;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("Unknown participant {0}")]
    UnknownParticipant(ParticipantId),
}

struct Registration {
    name: String,
    sender: mpsc::UnboundedSender<Arc<Datagram>>,
    channels: HashSet<Channel>,
}

#[derive(Default)]
struct Routes {
    participants: HashMap<ParticipantId, Registration>,
    channels: HashMap<Channel, HashSet<ParticipantId>>,
}

/// In-process message director.
///
/// Safe for concurrent publish, subscribe and unsubscribe from independent
/// tasks. A publish routes against the subscription table as it stood when
/// the publish began.
pub struct MessageBus {
    next_id: AtomicU64,
    routes: RwLock<Routes>,
}

impl MessageBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            routes: RwLock::new(Routes::default()),
        }
    }

    /// Register a participant and hand back its mailbox.
    pub async fn register(&self, name: impl Into<String>) -> (ParticipantId, Mailbox) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        let name = name.into();
        debug!(participant = id, name = %name, "Participant registered");
        self.routes.write().await.participants.insert(
            id,
            Registration {
                name,
                sender,
                channels: HashSet::new(),
            },
        );
        (id, receiver)
    }

    /// Remove a participant and every subscription it holds.
    ///
    /// Returns the number of channels released.
    pub async fn deregister(&self, id: ParticipantId) -> usize {
        let mut routes = self.routes.write().await;
        let Some(registration) = routes.participants.remove(&id) else {
            return 0;
        };
        for channel in &registration.channels {
            remove_subscriber(&mut routes.channels, *channel, id);
        }
        debug!(
            participant = id,
            name = %registration.name,
            channels = registration.channels.len(),
            "Participant deregistered"
        );
        registration.channels.len()
    }

    /// Subscribe a participant to a channel. Idempotent.
    pub async fn subscribe(&self, id: ParticipantId, channel: Channel) -> Result<()> {
        let mut routes = self.routes.write().await;
        let registration = routes
            .participants
            .get_mut(&id)
            .ok_or(BusError::UnknownParticipant(id))?;
        if registration.channels.insert(channel) {
            routes.channels.entry(channel).or_default().insert(id);
            debug!(participant = id, channel, "Subscribed");
        }
        Ok(())
    }

    /// Unsubscribe a participant from a channel.
    ///
    /// Removing a subscription that does not exist is a no-op.
    pub async fn unsubscribe(&self, id: ParticipantId, channel: Channel) {
        let mut routes = self.routes.write().await;
        let removed = routes
            .participants
            .get_mut(&id)
            .map(|r| r.channels.remove(&channel))
            .unwrap_or(false);
        if removed {
            remove_subscriber(&mut routes.channels, channel, id);
            debug!(participant = id, channel, "Unsubscribed");
        }
    }

    /// Deliver a datagram to every subscriber of any of its recipients.
    ///
    /// Returns the number of participants it was queued for.
    pub async fn publish(&self, datagram: impl Into<Arc<Datagram>>) -> usize {
        self.publish_from(None, datagram).await
    }

    /// Publish on behalf of `origin`, which never receives its own datagram.
    pub async fn publish_from(
        &self,
        origin: Option<ParticipantId>,
        datagram: impl Into<Arc<Datagram>>,
    ) -> usize {
        let datagram = datagram.into();
        let targets: Vec<_> = {
            let routes = self.routes.read().await;
            let mut seen = HashSet::new();
            datagram
                .recipients()
                .iter()
                .filter_map(|channel| routes.channels.get(channel))
                .flatten()
                .filter(|id| Some(**id) != origin && seen.insert(**id))
                .filter_map(|id| {
                    routes
                        .participants
                        .get(id)
                        .map(|r| (*id, r.sender.clone()))
                })
                .collect()
        };

        let mut delivered = 0;
        for (id, sender) in targets {
            if sender.send(Arc::clone(&datagram)).is_ok() {
                delivered += 1;
            } else {
                debug!(participant = id, "Mailbox closed, datagram dropped");
            }
        }

        debug!(
            recipients = ?datagram.recipients(),
            sender = datagram.sender(),
            msg_type = datagram.msg_type(),
            delivered,
            "Published datagram"
        );
        delivered
    }

    /// Participants currently subscribed to `channel`, in ascending id order.
    pub async fn subscribers(&self, channel: Channel) -> Vec<ParticipantId> {
        let routes = self.routes.read().await;
        let mut ids: Vec<_> = routes
            .channels
            .get(&channel)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Whether `id` is subscribed to `channel`.
    pub async fn is_subscribed(&self, id: ParticipantId, channel: Channel) -> bool {
        self.routes
            .read()
            .await
            .participants
            .get(&id)
            .map(|r| r.channels.contains(&channel))
            .unwrap_or(false)
    }

    /// Number of registered participants.
    pub async fn participant_count(&self) -> usize {
        self.routes.read().await.participants.len()
    }

    /// Drop every participant and subscription. Mailboxes close.
    pub async fn clear(&self) {
        let mut routes = self.routes.write().await;
        let count = routes.participants.len();
        routes.participants.clear();
        routes.channels.clear();
        info!(participants = count, "Message bus cleared");
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_subscriber(
    channels: &mut HashMap<Channel, HashSet<ParticipantId>>,
    channel: Channel,
    id: ParticipantId,
) {
    if let Some(subscribers) = channels.get_mut(&channel) {
        subscribers.remove(&id);
        if subscribers.is_empty() {
            channels.remove(&channel);
        }
    }
}
