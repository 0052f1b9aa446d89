//! Name → constructor map for extensions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::buffer::{BucketedBufferPool, NullBufferPool, SharedBufferPool};
use crate::config::{Config, Limits};
use crate::error::Result;
use crate::extensions::fragment::FragmentExtension;
use crate::extensions::identity::IdentityExtension;
use crate::extensions::validation::ValidationExtension;
use crate::extensions::{Extension, ExtensionConfig};

/// Builds an extension instance from its negotiated configuration.
///
/// Returning an error means the configuration cannot be honored; the stack
/// decides whom to blame.
pub type ExtensionFactory =
    Arc<dyn Fn(&ExtensionResources, &ExtensionConfig) -> Result<Box<dyn Extension>> + Send + Sync>;

/// Connection-scoped resources handed to every extension constructor.
#[derive(Clone)]
pub struct ExtensionResources {
    /// Pool extensions draw payload buffers from.
    pub buffer_pool: SharedBufferPool,
    /// Limits extensions enforce on transformed payloads.
    pub limits: Limits,
    /// Minimum allocation for accumulators created by extensions.
    pub allocation_size: usize,
}

impl ExtensionResources {
    /// Resources backed by `buffer_pool` with default limits.
    #[must_use]
    pub fn new(buffer_pool: SharedBufferPool) -> Self {
        let defaults = Config::default();
        Self {
            buffer_pool,
            limits: defaults.limits,
            allocation_size: defaults.accumulator_allocation_size,
        }
    }

    /// Resources with a fresh bucketed pool sized from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            buffer_pool: BucketedBufferPool::shared(config.pool),
            limits: config.limits,
            allocation_size: config.accumulator_allocation_size,
        }
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

impl Default for ExtensionResources {
    fn default() -> Self {
        Self::new(NullBufferPool::shared())
    }
}

impl fmt::Debug for ExtensionResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionResources")
            .field("limits", &self.limits)
            .field("allocation_size", &self.allocation_size)
            .finish_non_exhaustive()
    }
}

/// Registry of available extensions, keyed by name.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    factories: BTreeMap<String, ExtensionFactory>,
}

impl ExtensionRegistry {
    /// Create a new empty extension registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in extension.
    ///
    /// `identity`, `fragment` and `@validation`, plus `permessage-deflate`
    /// when the `compression` feature is enabled.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(IdentityExtension::NAME, |_, config| {
            Ok(Box::new(IdentityExtension::new(config.clone())))
        });
        registry.register(FragmentExtension::NAME, |_, config| {
            Ok(Box::new(FragmentExtension::from_config(config.clone())?))
        });
        registry.register(ValidationExtension::NAME, |resources, config| {
            Ok(Box::new(ValidationExtension::new(
                config.clone(),
                resources.limits,
            )))
        });
        #[cfg(feature = "compression")]
        registry.register(
            crate::extensions::deflate::DeflateExtension::NAME,
            |resources, config| {
                Ok(Box::new(crate::extensions::deflate::DeflateExtension::from_config(
                    resources,
                    config.clone(),
                )?))
            },
        );
        registry
    }

    /// Register a constructor under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ExtensionResources, &ExtensionConfig) -> Result<Box<dyn Extension>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Remove the constructor registered under `name`.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.factories.remove(name).is_some()
    }

    /// Check if an extension with this name can be instantiated.
    #[must_use]
    pub fn is_available(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Get the number of registered extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate the extension named by `config`.
    ///
    /// Returns `Ok(None)` when no constructor is registered for the name.
    ///
    /// # Errors
    ///
    /// Propagates the constructor's error when the configuration is invalid.
    pub fn new_instance(
        &self,
        resources: &ExtensionResources,
        config: &ExtensionConfig,
    ) -> Result<Option<Box<dyn Extension>>> {
        match self.factories.get(&config.name) {
            Some(factory) => factory(resources, config).map(Some),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.names())
            .finish()
    }
}
