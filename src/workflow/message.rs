use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::error::WorkflowError;

/// Identity of a message payload type, used to declare executor inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A typed value travelling along workflow edges.
///
/// The payload is shared, so fan-out clones are cheap and every receiver sees
/// the same value.
#[derive(Clone)]
pub struct Message {
    payload: Arc<dyn Any + Send + Sync>,
    key: TypeKey,
    source_id: Option<String>,
    target_id: Option<String>,
}

impl Message {
    pub fn new<T>(payload: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            payload: Arc::new(payload),
            key: TypeKey::of::<T>(),
            source_id: None,
            target_id: None,
        }
    }

    pub(crate) fn with_source(mut self, source_id: &str) -> Self {
        self.source_id = Some(source_id.to_string());
        self
    }

    pub(crate) fn addressed_to(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn type_key(&self) -> TypeKey {
        self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.key.name
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    /// Set when the sender addressed one specific downstream executor.
    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn downcast<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }

    /// Payload as `T`, or `UnhandledMessage` on behalf of `executor_id`.
    pub fn require<T: Any>(&self, executor_id: &str) -> Result<&T, WorkflowError> {
        self.downcast_ref::<T>()
            .ok_or_else(|| WorkflowError::UnhandledMessage {
                executor: executor_id.to_string(),
                type_name: self.key.name,
            })
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.key.name)
            .field("source_id", &self.source_id)
            .field("target_id", &self.target_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_downcasts_to_its_payload_type_only() {
        let message = Message::new("8".to_string());

        assert!(message.is::<String>());
        assert!(!message.is::<i64>());
        assert_eq!(message.downcast::<String>().as_deref(), Some("8"));
        assert_eq!(message.type_key(), TypeKey::of::<String>());
    }

    #[test]
    fn require_reports_the_executor_and_type() {
        let message = Message::new(3_i64);
        let err = message.require::<String>("upper").expect_err("wrong type");

        assert!(matches!(
            err,
            WorkflowError::UnhandledMessage { executor, type_name }
                if executor == "upper" && type_name == "i64"
        ));
    }
}
