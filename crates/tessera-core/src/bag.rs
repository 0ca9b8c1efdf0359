//! Hierarchical per-invocation key/value store.
//!
//! A [`ContextBag`] maps string keys to shared values. Typed accessors key
//! entries by [`std::any::type_name`], and explicit string keys live in the
//! same table. A bag may have a read-only parent; lookups that miss locally
//! continue in the parent chain, while writes and removals only ever touch
//! the local table.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tessera_core::ContextBag;
//!
//! let mut root = ContextBag::new();
//! root.set(String::from("tenant-a"));
//!
//! let mut child = ContextBag::with_parent(Arc::new(root));
//! child.set(42_u32);
//!
//! assert_eq!(child.get::<String>().unwrap(), "tenant-a");
//! assert_eq!(*child.get::<u32>().unwrap(), 42);
//! ```

use crate::error::ContextBagError;
use std::any::{type_name, Any};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A shared, type-erased value stored in a [`ContextBag`].
pub type BagValue = Arc<dyn Any + Send + Sync>;

/// Hierarchical key/value store attached to every behavior context.
///
/// Values are held as [`BagValue`] handles, so [`merge`](Self::merge) and
/// [`scoped`](Self::scoped) share values instead of copying them.
#[derive(Default, Clone)]
pub struct ContextBag {
    stash: HashMap<Cow<'static, str>, BagValue>,
    parent: Option<Arc<ContextBag>>,
    behaviors: Option<BagValue>,
}

impl ContextBag {
    /// Creates an empty bag with no parent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty bag whose lookups fall back to `parent`.
    #[must_use]
    pub fn with_parent(parent: Arc<ContextBag>) -> Self {
        Self {
            stash: HashMap::new(),
            parent: Some(parent),
            behaviors: None,
        }
    }

    /// Creates a child bag over a snapshot of this bag.
    ///
    /// Writes made to `self` afterwards are not visible through the child.
    /// Stage connectors use this to derive the bag of a narrower context.
    #[must_use]
    pub fn scoped(&self) -> Self {
        Self::with_parent(Arc::new(self.clone()))
    }

    /// Returns the parent bag, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<ContextBag>> {
        self.parent.as_ref()
    }

    /// Retrieves the `T` stored under its type name.
    ///
    /// # Errors
    ///
    /// Returns [`ContextBagError::NotFound`] if neither this bag nor any
    /// ancestor holds the key, or [`ContextBagError::TypeMismatch`] if the
    /// nearest entry is not a `T`.
    pub fn get<T: Any>(&self) -> Result<&T, ContextBagError> {
        self.get_with_key(type_name::<T>())
    }

    /// Retrieves the `T` stored under `key`.
    ///
    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub fn get_with_key<T: Any>(&self, key: &str) -> Result<&T, ContextBagError> {
        match self.lookup(key) {
            Some(value) => (**value)
                .downcast_ref::<T>()
                .ok_or_else(|| ContextBagError::type_mismatch::<T>(key)),
            None => Err(ContextBagError::not_found(key)),
        }
    }

    /// Retrieves the `T` stored under its type name, or `None`.
    #[must_use]
    pub fn try_get<T: Any>(&self) -> Option<&T> {
        self.try_get_with_key(type_name::<T>())
    }

    /// Retrieves the `T` stored under `key`, or `None`.
    ///
    /// A nearer entry of another type shadows ancestors, so this returns
    /// `None` rather than continuing up the chain.
    #[must_use]
    pub fn try_get_with_key<T: Any>(&self, key: &str) -> Option<&T> {
        (**self.lookup(key)?).downcast_ref::<T>()
    }

    /// Retrieves the shared handle stored under the type name of `T`.
    #[must_use]
    pub fn get_shared<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let value = self.lookup(type_name::<T>())?;
        Arc::clone(value).downcast::<T>().ok()
    }

    /// Stores `value` locally under its type name, replacing any local entry.
    pub fn set<T: Any + Send + Sync>(&mut self, value: T) {
        self.set_shared(Arc::new(value));
    }

    /// Stores an already shared value locally under the type name of `T`.
    pub fn set_shared<T: Any + Send + Sync>(&mut self, value: Arc<T>) {
        self.stash.insert(Cow::Borrowed(type_name::<T>()), value);
    }

    /// Stores `value` locally under `key`, replacing any local entry.
    pub fn set_with_key<T: Any + Send + Sync>(
        &mut self,
        key: impl Into<Cow<'static, str>>,
        value: T,
    ) {
        self.stash.insert(key.into(), Arc::new(value));
    }

    /// Returns the existing `T` (local or inherited) or stores a new default one.
    ///
    /// The returned handle is shared with the bag: two calls without an
    /// intervening [`remove`](Self::remove) yield the same instance. An entry
    /// of another type under the same key is shadowed by the new value.
    pub fn get_or_create<T: Any + Send + Sync + Default>(&mut self) -> Arc<T> {
        if let Some(existing) = self.get_shared::<T>() {
            return existing;
        }
        let created = Arc::new(T::default());
        self.set_shared(Arc::clone(&created));
        created
    }

    /// Mutably borrows the local `T`, if this bag is its only holder.
    ///
    /// Inherited entries are never mutable through a child. Returns `None`
    /// when the entry is absent locally, has another type, or is shared.
    pub fn get_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        let value = self.stash.get_mut(type_name::<T>())?;
        Arc::get_mut(value)?.downcast_mut::<T>()
    }

    /// Removes the local entry stored under the type name of `T`.
    ///
    /// Returns `true` if an entry was removed. Ancestors are untouched, so an
    /// inherited value becomes visible again.
    pub fn remove<T: Any>(&mut self) -> bool {
        self.remove_key(type_name::<T>())
    }

    /// Removes the local entry stored under `key`.
    pub fn remove_key(&mut self, key: &str) -> bool {
        self.stash.remove(key).is_some()
    }

    /// Copies the local entries of `other` into this bag.
    ///
    /// Colliding keys are overwritten. The parent chain of `other` is not
    /// walked.
    pub fn merge(&mut self, other: &ContextBag) {
        for (key, value) in &other.stash {
            self.stash.insert(key.clone(), Arc::clone(value));
        }
    }

    /// Returns `true` if `key` resolves in this bag or an ancestor.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Returns the local keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.stash.keys().map(|key| &**key)
    }

    /// Returns the number of local entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stash.len()
    }

    /// Returns `true` if there are no local entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stash.is_empty()
    }

    /// Returns the attached behavior table, falling back to the parent chain.
    #[doc(hidden)]
    #[must_use]
    pub fn behaviors(&self) -> Option<&BagValue> {
        let mut bag = self;
        loop {
            if let Some(table) = &bag.behaviors {
                return Some(table);
            }
            bag = bag.parent.as_deref()?;
        }
    }

    /// Replaces the local behavior table handle, returning the previous one.
    #[doc(hidden)]
    pub fn replace_behaviors(&mut self, table: Option<BagValue>) -> Option<BagValue> {
        std::mem::replace(&mut self.behaviors, table)
    }

    fn lookup(&self, key: &str) -> Option<&BagValue> {
        let mut bag = self;
        loop {
            if let Some(value) = bag.stash.get(key) {
                return Some(value);
            }
            bag = bag.parent.as_deref()?;
        }
    }
}

impl fmt::Debug for ContextBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("ContextBag")
            .field("keys", &keys)
            .field("has_parent", &self.parent.is_some())
            .field("has_behaviors", &self.behaviors.is_some())
            .finish()
    }
}
