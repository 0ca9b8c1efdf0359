//! Object builder contract and the in-process container.
//!
//! Pipelines never construct behaviors themselves. Each step registration
//! carries a factory that receives a [`ObjectBuilder`] and resolves whatever
//! the behavior depends on. [`Container`] is the shipped builder: a type-keyed
//! registry of shared instances and factories.
//!
//! # Example
//!
//! ```rust
//! use tessera_core::di::{Container, ObjectBuilder};
//! use std::sync::Arc;
//!
//! struct Clock {
//!     offset_ms: i64,
//! }
//!
//! let mut container = Container::new();
//! container.register(Arc::new(Clock { offset_ms: 0 }));
//!
//! let builder: &dyn ObjectBuilder = &container;
//! let clock: Arc<Clock> = builder.build().unwrap();
//! assert_eq!(clock.offset_ms, 0);
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error when a dependency cannot be built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Nothing is registered for the requested type.
    #[error("failed to build {type_name}: service not registered")]
    NotRegistered {
        /// The type name that could not be built.
        type_name: &'static str,
    },

    /// A registration exists but producing the value failed.
    #[error("failed to build {type_name}: {reason}")]
    Failed {
        /// The type name that could not be built.
        type_name: &'static str,
        /// The reason for the failure.
        reason: String,
    },
}

impl BuildError {
    /// Creates a build error for a missing registration.
    #[must_use]
    pub fn not_registered<T: ?Sized>() -> Self {
        Self::NotRegistered {
            type_name: type_name::<T>(),
        }
    }

    /// Creates a build error with a custom reason.
    pub fn custom<T: ?Sized>(reason: impl Into<String>) -> Self {
        Self::Failed {
            type_name: type_name::<T>(),
            reason: reason.into(),
        }
    }
}

/// Builds shared instances by type.
///
/// Implementations must be usable from any thread; construction of a
/// pipeline may happen on a different thread than its invocations.
pub trait ObjectBuilder: Send + Sync {
    /// Builds the value registered for `type_id`.
    ///
    /// `type_name` is used for error reporting only.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when the type is unknown or its factory fails.
    fn build_any(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<Arc<dyn Any + Send + Sync>, BuildError>;
}

impl dyn ObjectBuilder + '_ {
    /// Builds a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when the type is unknown, its factory fails, or
    /// the builder hands back a value of another type.
    pub fn build<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, BuildError> {
        self.build_any(TypeId::of::<T>(), type_name::<T>())?
            .downcast::<T>()
            .map_err(|_| BuildError::custom::<T>("builder returned a value of another type"))
    }
}

type Factory = Arc<dyn Fn(&Container) -> Result<Arc<dyn Any + Send + Sync>, BuildError> + Send + Sync>;

#[derive(Clone)]
enum Registration {
    Instance(Arc<dyn Any + Send + Sync>),
    Factory(Factory),
}

/// A type-keyed object builder.
///
/// Instances registered with [`register`](Self::register) are shared by
/// every build. Factories registered with
/// [`register_factory`](Self::register_factory) run on every build and may
/// resolve their own dependencies from the container.
///
/// # Thread Safety
///
/// The container is `Send + Sync` and can be shared across threads once
/// populated.
#[derive(Default, Clone)]
pub struct Container {
    registrations: HashMap<TypeId, Registration>,
}

impl Container {
    /// Creates a new empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registrations: HashMap::new(),
        }
    }

    /// Registers a shared instance.
    ///
    /// ```rust
    /// use tessera_core::di::Container;
    /// use std::sync::Arc;
    ///
    /// struct MyService;
    ///
    /// let mut container = Container::new();
    /// container.register(Arc::new(MyService));
    /// assert!(container.contains::<MyService>());
    /// ```
    pub fn register<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.registrations
            .insert(TypeId::of::<T>(), Registration::Instance(service));
    }

    /// Registers a factory producing a fresh `T` on every build.
    ///
    /// ```rust
    /// use tessera_core::di::Container;
    /// use std::sync::Arc;
    ///
    /// struct Prefix(&'static str);
    /// struct Greeter(Arc<Prefix>);
    ///
    /// let mut container = Container::new();
    /// container.register(Arc::new(Prefix("hello")));
    /// container.register_factory(|c: &Container| Ok(Greeter(c.resolve_required::<Prefix>()?)));
    ///
    /// let greeter = container.resolve::<Greeter>().unwrap();
    /// assert_eq!(greeter.0 .0, "hello");
    /// ```
    pub fn register_factory<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, BuildError> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |container: &Container| {
            factory(container).map(|value| Arc::new(value) as Arc<dyn Any + Send + Sync>)
        });
        self.registrations
            .insert(TypeId::of::<T>(), Registration::Factory(factory));
    }

    /// Resolves a `T`, or `None` if it is unknown or its factory fails.
    #[must_use]
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.resolve_required().ok()
    }

    /// Resolves a `T` or returns an error.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the type is not registered or its factory fails.
    pub fn resolve_required<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, BuildError> {
        (self as &dyn ObjectBuilder).build::<T>()
    }

    /// Checks if a type is registered.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl ObjectBuilder for Container {
    fn build_any(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<Arc<dyn Any + Send + Sync>, BuildError> {
        match self.registrations.get(&type_id) {
            Some(Registration::Instance(instance)) => Ok(Arc::clone(instance)),
            Some(Registration::Factory(factory)) => factory(self),
            None => Err(BuildError::NotRegistered { type_name }),
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registration_count", &self.registrations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestService {
        value: String,
    }

    impl TestService {
        fn new(value: &str) -> Self {
            Self {
                value: value.to_string(),
            }
        }
    }

    #[test]
    fn test_container_new() {
        let container = Container::new();
        assert!(container.is_empty());
        assert_eq!(container.len(), 0);
    }

    #[test]
    fn test_register_instance_is_shared() {
        let mut container = Container::new();
        container.register(Arc::new(TestService::new("hello")));

        let first = container.resolve::<TestService>().unwrap();
        let second = container.resolve::<TestService>().unwrap();
        assert_eq!(first.value, "hello");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_factory_runs_per_build() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut container = Container::new();
        container.register_factory(move |_: &Container| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(TestService::new("fresh"))
        });

        let first = container.resolve::<TestService>().unwrap();
        let second = container.resolve::<TestService>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_factory_error_propagates() {
        let mut container = Container::new();
        container.register_factory(|_: &Container| -> Result<TestService, BuildError> {
            Err(BuildError::custom::<TestService>("connection refused"))
        });

        let err = container.resolve_required::<TestService>().unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert!(container.resolve::<TestService>().is_none());
    }

    #[test]
    fn test_resolve_required_missing() {
        let container = Container::new();
        let err = container.resolve_required::<TestService>().unwrap_err();
        assert_eq!(err, BuildError::not_registered::<TestService>());
        assert!(err.to_string().contains("TestService"));
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn test_dyn_builder_build() {
        let mut container = Container::new();
        container.register(Arc::new(TestService::new("dyn")));

        let builder: &dyn ObjectBuilder = &container;
        let service = builder.build::<TestService>().unwrap();
        assert_eq!(service.value, "dyn");
        assert!(builder.build::<String>().is_err());
    }

    #[test]
    fn test_container_contains() {
        let mut container = Container::new();
        assert!(!container.contains::<TestService>());

        container.register(Arc::new(TestService::new("test")));
        assert!(container.contains::<TestService>());
    }

    #[test]
    fn test_container_debug() {
        let mut container = Container::new();
        container.register(Arc::new(TestService::new("debug")));

        let debug = format!("{:?}", container);
        assert!(debug.contains("Container"));
        assert!(debug.contains("registration_count"));
    }
}
