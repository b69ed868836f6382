//! Publish/subscribe message bus.
//!
//! Subscribers register on a [`Channel`]: either the broadcast channel or
//! a specific unit's channel. `publish` copies the message into the mailbox
//! of every subscriber of the target channel, in subscription order, before
//! it returns. Mailboxes are drained by their owners once per tick.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::math::GridPos;
use crate::units::{Team, UnitId};

/// What a message reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// An enemy was seen at `pos`.
    EnemySighted,
    /// The sender is out of ammunition.
    LowAmmo,
    /// The sender is wounded; `extra` carries its hp.
    Injured,
    /// The sender's cell is dangerous.
    UnderFire,
    /// An order was sent to `to`; `extra` carries the order code.
    OrderIssued,
    /// The sender accepted an order.
    OrderAck,
    /// The sender reached its movement goal.
    ReachedTarget,
    /// A supplier needs to restock.
    NeedResupply,
    /// The sender (a commander) died; `extra` carries its team index.
    CommanderDown,
}

/// Where a message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Everyone listening on the broadcast channel.
    Broadcast,
    /// Subscribers of one unit's channel.
    Unit(UnitId),
}

/// A mailbox owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subscriber {
    /// A unit's own inbox.
    Unit(UnitId),
    /// A team's commander.
    Commander(Team),
    /// External listener (metrics, tests, debug views).
    Observer(u32),
}

/// A value message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Event type.
    pub kind: EventKind,
    /// Sending unit, if any.
    pub from: Option<UnitId>,
    /// Destination channel.
    pub to: Channel,
    /// Cell the event refers to.
    pub pos: Option<GridPos>,
    /// Event-specific payload.
    pub extra: i32,
}

impl Message {
    /// A broadcast report from `from`.
    #[must_use]
    pub const fn report(kind: EventKind, from: UnitId, pos: GridPos, extra: i32) -> Self {
        Self {
            kind,
            from: Some(from),
            to: Channel::Broadcast,
            pos: Some(pos),
            extra,
        }
    }

    /// A message addressed to one unit.
    #[must_use]
    pub const fn direct(kind: EventKind, from: Option<UnitId>, to: UnitId, extra: i32) -> Self {
        Self {
            kind,
            from,
            to: Channel::Unit(to),
            pos: None,
            extra,
        }
    }
}

/// The bus.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    routes: HashMap<Channel, Vec<Subscriber>>,
    mailboxes: HashMap<Subscriber, VecDeque<Message>>,
    published: u64,
}

impl EventBus {
    /// Empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen on `channel`. Subscribing twice is a no-op.
    pub fn subscribe(&mut self, channel: Channel, subscriber: Subscriber) {
        let route = self.routes.entry(channel).or_default();
        if !route.contains(&subscriber) {
            route.push(subscriber);
        }
        self.mailboxes.entry(subscriber).or_default();
    }

    /// Deliver `message` to every subscriber of its channel.
    ///
    /// Returns the number of mailboxes it landed in.
    pub fn publish(&mut self, message: Message) -> usize {
        self.published += 1;
        let Some(route) = self.routes.get(&message.to) else {
            tracing::trace!(kind = ?message.kind, to = ?message.to, "Message without subscribers");
            return 0;
        };
        for sub in route {
            self.mailboxes.entry(*sub).or_default().push_back(message);
        }
        route.len()
    }

    /// Take every pending message for `subscriber`, oldest first.
    pub fn drain(&mut self, subscriber: Subscriber) -> Vec<Message> {
        self.mailboxes
            .get_mut(&subscriber)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    /// Number of pending messages for `subscriber`.
    #[must_use]
    pub fn pending(&self, subscriber: Subscriber) -> usize {
        self.mailboxes.get(&subscriber).map_or(0, VecDeque::len)
    }

    /// Total messages published since construction.
    #[must_use]
    pub const fn published(&self) -> u64 {
        self.published
    }

    /// Forget all routes and pending messages.
    pub fn clear(&mut self) {
        self.routes.clear();
        self.mailboxes.clear();
    }
}
