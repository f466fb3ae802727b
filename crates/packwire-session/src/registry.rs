use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use packwire_codec::Value;

use crate::control::SubscribeMessage;

/// An event delivered to handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedEvent {
    pub command: u8,
    pub subtype: u8,
    pub argument: u8,
    pub payload: Value,
}

/// Callback invoked for matching events.
pub type Handler = Arc<dyn Fn(&ReceivedEvent) + Send + Sync>;

/// Which events a handler wants.
///
/// - no arguments: every event of the command
/// - arguments, no sub-type: events of the command carrying one of the arguments
/// - arguments and a sub-type: only that sub-type with one of the arguments
///
/// A sub-type alone is only meaningful for removal, where it sweeps every
/// handler registered for that sub-type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    events: Vec<u8>,
    arguments: Vec<u8>,
    subtype: Option<u8>,
}

impl Subscription {
    pub fn event(command: u8) -> Self {
        Self::events([command])
    }

    pub fn events(commands: impl IntoIterator<Item = u8>) -> Self {
        Self {
            events: commands.into_iter().collect(),
            arguments: Vec::new(),
            subtype: None,
        }
    }

    pub fn argument(mut self, argument: u8) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn arguments(mut self, arguments: impl IntoIterator<Item = u8>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    pub fn subtype(mut self, subtype: u8) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub fn event_list(&self) -> &[u8] {
        &self.events
    }

    pub fn argument_list(&self) -> &[u8] {
        &self.arguments
    }

    pub fn subtype_filter(&self) -> Option<u8> {
        self.subtype
    }

    /// The `subscribe` requests announcing (or withdrawing) this
    /// subscription: one per argument, or a single one without.
    pub fn messages(&self, active: bool) -> Vec<SubscribeMessage> {
        let message = |argument| SubscribeMessage {
            events: self.events.clone(),
            active,
            subtype: self.subtype,
            argument,
        };
        if self.arguments.is_empty() {
            vec![message(None)]
        } else {
            self.arguments.iter().map(|&a| message(Some(a))).collect()
        }
    }
}

#[derive(Default)]
struct CommandHandlers {
    bare: Option<Handler>,
    by_argument: HashMap<u8, Handler>,
    exact: HashMap<(u8, u8), Handler>,
}

impl CommandHandlers {
    fn len(&self) -> usize {
        usize::from(self.bare.is_some()) + self.by_argument.len() + self.exact.len()
    }
}

/// Event handlers keyed by command, then by sub-type and argument.
///
/// One handler per key; registering again replaces it. An incoming event
/// fires every handler whose key matches, most specific first.
#[derive(Default)]
pub struct SubscriptionRegistry {
    commands: HashMap<u8, CommandHandlers>,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handler` under every key the subscription names. Returns the
    /// number of keys stored.
    ///
    /// A sub-type without arguments names no key, so nothing is stored.
    pub fn register(&mut self, subscription: &Subscription, handler: Handler) -> usize {
        if subscription.subtype.is_some() && subscription.arguments.is_empty() {
            return 0;
        }
        let mut stored = 0;
        for &command in &subscription.events {
            let entry = self.commands.entry(command).or_default();
            if subscription.arguments.is_empty() {
                entry.bare = Some(Arc::clone(&handler));
                stored += 1;
                continue;
            }
            for &argument in &subscription.arguments {
                match subscription.subtype {
                    Some(subtype) => {
                        entry.exact.insert((subtype, argument), Arc::clone(&handler));
                    }
                    None => {
                        entry.by_argument.insert(argument, Arc::clone(&handler));
                    }
                }
                stored += 1;
            }
        }
        stored
    }

    /// Remove handlers; returns how many were removed.
    ///
    /// With arguments, exactly the named keys go. Without arguments the
    /// removal sweeps: every handler of the command, or with a sub-type every
    /// handler registered for that sub-type.
    pub fn remove(&mut self, subscription: &Subscription) -> usize {
        let mut removed = 0;
        for command in &subscription.events {
            let Some(entry) = self.commands.get_mut(command) else {
                continue;
            };
            let before = entry.len();
            match (subscription.arguments.is_empty(), subscription.subtype) {
                (true, None) => *entry = CommandHandlers::default(),
                (true, Some(subtype)) => entry.exact.retain(|&(sub, _), _| sub != subtype),
                (false, Some(subtype)) => {
                    for argument in &subscription.arguments {
                        entry.exact.remove(&(subtype, *argument));
                    }
                }
                (false, None) => {
                    for argument in &subscription.arguments {
                        entry.by_argument.remove(argument);
                    }
                }
            }
            removed += before - entry.len();
            if entry.len() == 0 {
                self.commands.remove(command);
            }
        }
        removed
    }

    /// Handlers matching an event, most specific first.
    pub fn matching(&self, command: u8, subtype: u8, argument: u8) -> Vec<Handler> {
        let Some(entry) = self.commands.get(&command) else {
            return Vec::new();
        };
        entry
            .exact
            .get(&(subtype, argument))
            .into_iter()
            .chain(entry.by_argument.get(&argument))
            .chain(entry.bare.as_ref())
            .cloned()
            .collect()
    }

    /// Total number of registered handler keys.
    pub fn len(&self) -> usize {
        self.commands.values().map(CommandHandlers::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// `subscribe` requests that re-announce every registered key.
    pub fn announcements(&self) -> Vec<SubscribeMessage> {
        let mut commands: Vec<_> = self.commands.iter().collect();
        commands.sort_by_key(|(command, _)| **command);

        let mut out = Vec::new();
        for (&command, entry) in commands {
            let message = |subtype, argument| SubscribeMessage {
                events: vec![command],
                active: true,
                subtype,
                argument,
            };
            if entry.bare.is_some() {
                out.push(message(None, None));
            }
            let mut arguments: Vec<_> = entry.by_argument.keys().copied().collect();
            arguments.sort_unstable();
            out.extend(arguments.into_iter().map(|a| message(None, Some(a))));
            let mut exact: Vec<_> = entry.exact.keys().copied().collect();
            exact.sort_unstable();
            out.extend(exact.into_iter().map(|(s, a)| message(Some(s), Some(a))));
        }
        out
    }
}
