//! Handler registry: task_type -> handler dispatch table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::TaskType;

/// A handler for a specific task type.
///
/// Takes the envelope's payload object and returns a JSON-serializable
/// result; failures are reported as a description string, which ends up
/// verbatim in the attempt row's error_message.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: &serde_json::Value) -> Result<serde_json::Value, String>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate handler for task_type={0}")]
    DuplicateHandler(TaskType),
}

/// Registry of handlers (task_type -> handler).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable, behind an Arc).
/// This avoids locks entirely: there is no concurrent-write hazard because
/// registration finishes before the worker starts.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a task type. Duplicate registration is a
    /// startup bug, so it errors rather than silently replacing.
    pub fn register(
        &mut self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), RegistryError> {
        if self.handlers.contains_key(&task_type) {
            return Err(RegistryError::DuplicateHandler(task_type));
        }
        self.handlers.insert(task_type, handler);
        Ok(())
    }

    /// Look up the handler for a type. `None` is the "unknown task type"
    /// outcome the worker routes to the failure path, never a crash.
    pub fn get(&self, task_type: &TaskType) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(task_type)
    }

    pub fn registered_types(&self) -> Vec<TaskType> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OkHandler;

    #[async_trait]
    impl TaskHandler for OkHandler {
        async fn handle(&self, _payload: &serde_json::Value) -> Result<serde_json::Value, String> {
            Ok(serde_json::json!({"ok": true}))
        }
    }

    #[tokio::test]
    async fn registered_handler_is_dispatchable() {
        let mut reg = HandlerRegistry::new();
        reg.register(TaskType::new("ok"), Arc::new(OkHandler)).unwrap();

        let handler = reg.get(&TaskType::new("ok")).unwrap();
        let result = handler.handle(&serde_json::json!({})).await.unwrap();
        assert_eq!(result["ok"], true);
    }

    #[test]
    fn missing_handler_is_none_not_a_crash() {
        let reg = HandlerRegistry::new();
        assert!(reg.get(&TaskType::new("missing")).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = HandlerRegistry::new();
        reg.register(TaskType::new("ok"), Arc::new(OkHandler)).unwrap();

        let err = reg
            .register(TaskType::new("ok"), Arc::new(OkHandler))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateHandler(_)));
        assert_eq!(reg.len(), 1);
    }
}
