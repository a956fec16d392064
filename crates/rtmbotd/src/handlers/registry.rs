//! Resolution of handler descriptors into live handlers.
//!
//! Each configured descriptor names a `kind`; the registry maps kinds to
//! factories. `prepare` starts one task per descriptor that constructs
//! the handler and runs its `initialize`. The tasks run concurrently and
//! independently: a failure, or even a panic, in one never affects the
//! others. Callers await the returned `PendingHandler`s in declaration
//! order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::builtin::{IssueLinkHandler, PingHandler};
use super::MessageHandler;
use crate::config::HandlerDescriptor;
use crate::error::HandlerError;

/// Builds a handler from its descriptor's configuration.
pub type HandlerFactory =
    Arc<dyn Fn(&serde_json::Value) -> anyhow::Result<Box<dyn MessageHandler>> + Send + Sync>;

// ============================================================================
// Ready / Pending Handlers
// ============================================================================

/// An initialized handler together with its configured name.
pub struct ReadyHandler {
    name: String,
    handler: Box<dyn MessageHandler>,
}

impl ReadyHandler {
    pub fn new(name: impl Into<String>, handler: Box<dyn MessageHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &dyn MessageHandler {
        self.handler.as_ref()
    }
}

impl std::fmt::Debug for ReadyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyHandler").field("name", &self.name).finish()
    }
}

/// Readiness of one descriptor's handler.
pub struct PendingHandler {
    name: String,
    task: JoinHandle<Result<ReadyHandler, HandlerError>>,
}

impl PendingHandler {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for construction and initialization to finish.
    ///
    /// # Errors
    ///
    /// - `HandlerError::UnknownKind` if no factory matches the descriptor
    /// - `HandlerError::Construct` if the factory rejected the configuration
    /// - `HandlerError::Initialize` if `initialize` failed
    /// - `HandlerError::Panicked` if the factory or `initialize` panicked
    pub async fn ready(self) -> Result<ReadyHandler, HandlerError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(HandlerError::Panicked { name: self.name }),
            Err(e) => Err(HandlerError::Initialize {
                name: self.name,
                source: anyhow::Error::new(e),
            }),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Maps handler kinds to factories.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in handlers registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PingHandler::KIND, |config| {
            Ok(Box::new(PingHandler::from_config(config)?) as Box<dyn MessageHandler>)
        });
        registry.register(IssueLinkHandler::KIND, |config| {
            Ok(Box::new(IssueLinkHandler::from_config(config)?) as Box<dyn MessageHandler>)
        });
        registry
    }

    /// Registers a factory, replacing any previous one for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<Box<dyn MessageHandler>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Starts constructing and initializing every descriptor.
    ///
    /// Returns one `PendingHandler` per descriptor, in the same order.
    pub fn prepare(&self, descriptors: &[HandlerDescriptor], cancel: &CancellationToken) -> Vec<PendingHandler> {
        descriptors
            .iter()
            .map(|descriptor| self.spawn_one(descriptor, cancel.clone()))
            .collect()
    }

    fn spawn_one(&self, descriptor: &HandlerDescriptor, cancel: CancellationToken) -> PendingHandler {
        let name = descriptor.name.clone();
        let kind = descriptor.kind.clone();
        let config = descriptor.config.clone();
        let factory = self.factories.get(&kind).cloned();

        let task_name = name.clone();
        let task = tokio::spawn(async move {
            let name = task_name;
            let factory = factory.ok_or_else(|| HandlerError::UnknownKind {
                name: name.clone(),
                kind: kind.clone(),
            })?;

            let mut handler = factory(&config).map_err(|source| HandlerError::Construct {
                name: name.clone(),
                source,
            })?;
            debug!(handler = %name, kind = %kind, "Handler constructed");

            handler
                .initialize(&name, &cancel)
                .await
                .map_err(|source| HandlerError::Initialize {
                    name: name.clone(),
                    source,
                })?;
            info!(handler = %name, kind = %kind, "Handler initialized");

            Ok(ReadyHandler::new(name, handler))
        });

        PendingHandler { name, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{HandlerOutcome, MessageSink};
    use async_trait::async_trait;
    use rtmbot_core::Message;

    struct Stub {
        fail_init: bool,
        panic_init: bool,
    }

    #[async_trait]
    impl MessageHandler for Stub {
        async fn initialize(&mut self, _name: &str, _cancel: &CancellationToken) -> anyhow::Result<()> {
            if self.panic_init {
                panic!("stub panicked");
            }
            if self.fail_init {
                anyhow::bail!("stub failed");
            }
            Ok(())
        }

        async fn process(
            &self,
            _sink: &dyn MessageSink,
            _message: &Message,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<HandlerOutcome> {
            Ok(HandlerOutcome::Continue)
        }
    }

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register("stub", |config| {
            if config.get("reject").is_some() {
                anyhow::bail!("bad config");
            }
            Ok(Box::new(Stub {
                fail_init: config.get("fail").is_some(),
                panic_init: config.get("panic").is_some(),
            }) as Box<dyn MessageHandler>)
        });
        registry
    }

    fn descriptor(name: &str, kind: &str, config: serde_json::Value) -> HandlerDescriptor {
        HandlerDescriptor {
            name: name.to_string(),
            kind: kind.to_string(),
            config,
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_descriptor() {
        let descriptors = vec![
            descriptor("first", "stub", serde_json::json!({})),
            descriptor("missing", "nope", serde_json::json!({})),
            descriptor("rejected", "stub", serde_json::json!({"reject": true})),
            descriptor("failing", "stub", serde_json::json!({"fail": true})),
            descriptor("panicking", "stub", serde_json::json!({"panic": true})),
            descriptor("last", "stub", serde_json::json!({})),
        ];

        let pending = registry().prepare(&descriptors, &CancellationToken::new());
        let names: Vec<&str> = pending.iter().map(PendingHandler::name).collect();
        assert_eq!(names, vec!["first", "missing", "rejected", "failing", "panicking", "last"]);

        let mut results = Vec::new();
        for p in pending {
            results.push(p.ready().await);
        }

        assert_eq!(results[0].as_ref().unwrap().name(), "first");
        assert!(matches!(
            &results[1],
            Err(HandlerError::UnknownKind { kind, .. }) if kind == "nope"
        ));
        assert!(matches!(&results[2], Err(HandlerError::Construct { .. })));
        assert!(matches!(&results[3], Err(HandlerError::Initialize { .. })));
        assert!(matches!(&results[4], Err(HandlerError::Panicked { name }) if name == "panicking"));
        assert_eq!(results[5].as_ref().unwrap().name(), "last");
    }

    #[test]
    fn test_builtins_registered() {
        let registry = HandlerRegistry::with_builtins();
        assert_eq!(registry.kinds(), vec!["issue_link", "ping"]);
        assert!(registry.contains("ping"));
        assert!(!registry.contains("tfs"));
    }
}
