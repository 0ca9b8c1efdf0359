//! Behavior context types.
//!
//! A context is the mutable carrier threaded through a pipeline. Every
//! context owns exactly one [`ContextBag`]; the pipeline itself only relies on
//! the [`BehaviorContext`] trait, so applications define their own context
//! structs and the kernel dispatches on them by [`TypeId`](std::any::TypeId).

use crate::bag::ContextBag;
use serde::{Deserialize, Serialize};
use std::any::Any;
use uuid::Uuid;

/// A unique identifier for each message, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps message ids sortable in logs.
///
/// # Example
///
/// ```
/// use tessera_core::MessageId;
///
/// let id = MessageId::new();
/// println!("Message ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new unique message ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `MessageId` from an existing UUID, e.g. one read from a header.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<MessageId> for Uuid {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

/// Upcasting support for contexts.
///
/// Implemented for every `Any + Send` type, so context authors never write it
/// by hand.
pub trait ContextAny: Any + Send {
    /// Returns the context as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Returns the context as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Returns the concrete type name of the context.
    fn context_name(&self) -> &'static str;
}

impl<T: Any + Send> ContextAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn context_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// The mutable per-invocation carrier passed through a pipeline.
///
/// # Example
///
/// ```
/// use tessera_core::{BehaviorContext, ContextBag};
///
/// struct OrderContext {
///     order_id: u64,
///     bag: ContextBag,
/// }
///
/// impl BehaviorContext for OrderContext {
///     fn extensions(&self) -> &ContextBag {
///         &self.bag
///     }
///
///     fn extensions_mut(&mut self) -> &mut ContextBag {
///         &mut self.bag
///     }
/// }
/// ```
pub trait BehaviorContext: ContextAny {
    /// Returns the context bag.
    fn extensions(&self) -> &ContextBag;

    /// Returns the context bag for writing.
    fn extensions_mut(&mut self) -> &mut ContextBag;

    /// Returns the id of the message being processed, if the context has one.
    ///
    /// Used to correlate invocation spans.
    fn message_id(&self) -> Option<MessageId> {
        None
    }
}

impl dyn BehaviorContext + '_ {
    /// Returns `true` if the context is a `C`.
    #[must_use]
    pub fn is<C: BehaviorContext>(&self) -> bool {
        self.as_any().is::<C>()
    }

    /// Returns the context as a `C`, if it is one.
    #[must_use]
    pub fn downcast_ref<C: BehaviorContext>(&self) -> Option<&C> {
        self.as_any().downcast_ref::<C>()
    }

    /// Returns the context as a mutable `C`, if it is one.
    pub fn downcast_mut<C: BehaviorContext>(&mut self) -> Option<&mut C> {
        self.as_any_mut().downcast_mut::<C>()
    }
}

/// The stock root context for an incoming message.
///
/// Carries the message id and the root [`ContextBag`]. Applications with
/// richer envelopes define their own context type instead.
#[derive(Debug, Default)]
pub struct RootContext {
    message_id: MessageId,
    bag: ContextBag,
}

impl RootContext {
    /// Creates a root context with a fresh message id and an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a root context for the given message id.
    #[must_use]
    pub fn with_message_id(message_id: MessageId) -> Self {
        Self {
            message_id,
            bag: ContextBag::new(),
        }
    }

    /// Creates a root context around an existing bag.
    #[must_use]
    pub fn with_bag(bag: ContextBag) -> Self {
        Self {
            message_id: MessageId::new(),
            bag,
        }
    }

    /// Returns the message id.
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.message_id
    }
}

impl BehaviorContext for RootContext {
    fn extensions(&self) -> &ContextBag {
        &self.bag
    }

    fn extensions_mut(&mut self) -> &mut ContextBag {
        &mut self.bag
    }

    fn message_id(&self) -> Option<MessageId> {
        Some(self.message_id)
    }
}
