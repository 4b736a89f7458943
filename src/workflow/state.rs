use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::WorkflowError;

/// Key-value blackboard shared by every executor of a workflow.
///
/// Values are stored as JSON so executors only agree on the shape of the
/// data, not on a Rust type. Clones share the same map.
#[derive(Clone, Default, Debug)]
pub struct SharedState {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T>(&self, key: impl Into<String>, value: &T) -> Result<(), WorkflowError>
    where
        T: Serialize + ?Sized,
    {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|err| WorkflowError::SharedState {
            key: key.clone(),
            message: err.to_string(),
        })?;
        let mut values = self.values.write().expect("shared state lock poisoned");
        values.insert(key, value);
        Ok(())
    }

    pub fn get<T>(&self, key: &str) -> Result<Option<T>, WorkflowError>
    where
        T: DeserializeOwned,
    {
        let Some(value) = self.get_value(key) else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| WorkflowError::SharedState {
                key: key.to_string(),
                message: err.to_string(),
            })
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        let values = self.values.read().expect("shared state lock poisoned");
        values.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values
            .read()
            .expect("shared state lock poisoned")
            .contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut values = self.values.write().expect("shared state lock poisoned");
        values.remove(key)
    }

    /// A copy of every entry, for inspection after a run.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values
            .read()
            .expect("shared state lock poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq, Serialize)]
    struct Draft {
        text: String,
        revision: u32,
    }

    #[test]
    fn typed_values_round_trip_through_json() {
        let state = SharedState::new();
        state
            .set(
                "draft",
                &Draft {
                    text: "hello".to_string(),
                    revision: 2,
                },
            )
            .expect("set");

        let draft = state.get::<Draft>("draft").expect("get").expect("present");
        assert_eq!(draft.revision, 2);
        assert_eq!(state.get_value("draft"), Some(json!({"text": "hello", "revision": 2})));
        assert_eq!(state.get::<Draft>("missing").expect("get"), None);
    }

    #[test]
    fn clones_share_entries() {
        let state = SharedState::new();
        let handle = state.clone();
        handle.set("count", &3).expect("set");

        assert!(state.contains("count"));
        assert_eq!(state.remove("count"), Some(json!(3)));
        assert!(handle.snapshot().is_empty());
    }

    #[test]
    fn mismatched_type_is_reported_with_key() {
        let state = SharedState::new();
        state.set("count", "three").expect("set");

        let err = state.get::<u32>("count").expect_err("not a number");
        assert!(matches!(err, WorkflowError::SharedState { key, .. } if key == "count"));
    }

    #[test]
    fn poisoned_lock_panics_on_every_access() {
        let state = SharedState::new();
        state.set("count", &1).expect("set");

        let values = Arc::clone(&state.values);
        let poisoner = std::thread::spawn(move || {
            let _guard = values.write().expect("first lock");
            panic!("poison the shared state lock");
        });
        assert!(poisoner.join().is_err());

        let read = |access: &dyn Fn()| {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(access)).is_err()
        };
        assert!(read(&|| {
            state.get_value("count");
        }));
        assert!(read(&|| {
            state.contains("count");
        }));
        assert!(read(&|| {
            state.snapshot();
        }));
    }
}
