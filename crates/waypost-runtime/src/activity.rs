//! Typed activity registry and dispatch.
//!
//! Activities are addressed by an [`ActivityRef`], a name bound to the
//! input type the handler expects. Handlers are registered once at startup
//! and the registry is validated before any workflow runs, so a missing or
//! misnamed activity is caught before the first dispatch.
//!
//! Payloads cross the dispatch boundary as JSON values, the way a workflow
//! engine would serialize activity inputs into its history.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use waypost_core::ActivityConfig;

use crate::error::{ActivityError, RegistryError};

/// Name of an activity, bound to its input type.
pub struct ActivityRef<I> {
    name: &'static str,
    _input: PhantomData<fn(I)>,
}

impl<I> ActivityRef<I> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _input: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<I> Clone for ActivityRef<I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I> Copy for ActivityRef<I> {}

impl<I> std::fmt::Debug for ActivityRef<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ActivityRef").field(&self.name).finish()
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), ActivityError>> + Send>>;

/// Type-erased handler that decodes its payload before running.
type BoxedHandler = Box<dyn Fn(serde_json::Value) -> HandlerFuture + Send + Sync>;

/// Registry mapping activity names to handlers.
#[derive(Default)]
pub struct ActivityRegistry {
    handlers: HashMap<&'static str, BoxedHandler>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `activity`.
    ///
    /// # Returns
    /// * `Err(RegistryError::AlreadyRegistered)` if the name is taken
    pub fn register<I, F, Fut, E>(
        &mut self,
        activity: ActivityRef<I>,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        I: DeserializeOwned + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<ActivityError> + 'static,
    {
        let name = activity.name();
        if self.handlers.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered(name.to_string()));
        }

        let handler = Arc::new(handler);
        let boxed: BoxedHandler = Box::new(move |payload: serde_json::Value| {
            let handler = handler.clone();
            Box::pin(async move {
                let input: I =
                    serde_json::from_value(payload).map_err(|e| ActivityError::InvalidInput {
                        activity: name.to_string(),
                        reason: e.to_string(),
                    })?;
                (*handler)(input).await.map_err(Into::into)
            }) as HandlerFuture
        });

        self.handlers.insert(name, boxed);
        Ok(())
    }

    /// Check that every name in `required` has a handler.
    pub fn validate(&self, required: &[&str]) -> Result<(), RegistryError> {
        let mut missing: Vec<String> = required
            .iter()
            .filter(|name| !self.handlers.contains_key(**name))
            .map(|name| name.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            missing.sort();
            Err(RegistryError::Missing(missing))
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Run the handler registered under `name`.
    pub async fn invoke(&self, name: &str, payload: serde_json::Value) -> Result<(), ActivityError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ActivityError::NotRegistered(name.to_string()))?;
        handler(payload).await
    }
}

impl std::fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("activities", &self.names())
            .finish()
    }
}

/// Seam between workflow code and the engine's activity execution.
#[async_trait]
pub trait ActivityDispatcher: Send + Sync {
    /// Execute the activity and wait for its result.
    async fn dispatch(
        &self,
        activity: &'static str,
        payload: serde_json::Value,
    ) -> Result<(), ActivityError>;
}

/// Dispatcher that runs registry handlers in-process.
pub struct LocalDispatcher {
    registry: Arc<ActivityRegistry>,
    timeout: Duration,
}

impl LocalDispatcher {
    pub fn new(registry: Arc<ActivityRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn from_config(registry: Arc<ActivityRegistry>, config: &ActivityConfig) -> Self {
        Self::new(registry, config.start_to_close_timeout())
    }

    pub fn registry(&self) -> &ActivityRegistry {
        &self.registry
    }
}

#[async_trait]
impl ActivityDispatcher for LocalDispatcher {
    async fn dispatch(
        &self,
        activity: &'static str,
        payload: serde_json::Value,
    ) -> Result<(), ActivityError> {
        tracing::trace!(activity, "Dispatching activity");

        match tokio::time::timeout(self.timeout, self.registry.invoke(activity, payload)).await {
            Ok(result) => result,
            Err(_) => Err(ActivityError::Timeout {
                activity: activity.to_string(),
                after: self.timeout,
            }),
        }
    }
}
