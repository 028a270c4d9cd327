//! The model interface: the external collaborator contract the Executor dispatches against.
//! Each model is user-supplied; this module only defines the trait, the registry that maps
//! `model_name -> Arc<dyn Model>`, and a minimal in-memory double used by this crate's own
//! tests.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A model served by an Executor. Every method returns a `serde_json::Value` so that the
/// dispatch layer can check the returned shape (list, string, or mapping) against the contract
/// in one place rather than per-model.
pub trait Model: Send + Sync {
    fn predict(&self, features: &[Value]) -> Value;
    fn evaluate(&self, features: &[Value], targets: &[Value]) -> Value;
    fn get_feedback(&self, y_pred: &[Value], y_true: &[Value]) -> Value;
    fn get_model_info(&self) -> Value;
    fn get_model_version(&self) -> String;
}

#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn Model>>,
}

impl ModelRegistry {
    pub fn new() -> ModelRegistry {
        ModelRegistry {
            models: HashMap::new(),
        }
    }

    pub fn insert(&mut self, model_name: impl Into<String>, model: Arc<dyn Model>) {
        self.models.insert(model_name.into(), model);
    }

    pub fn get(&self, model_name: &str) -> Option<Arc<dyn Model>> {
        self.models.get(model_name).cloned()
    }

    pub fn model_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }
}

/// A deterministic test double: `predict` echoes its input back, `evaluate`/`get_feedback`
/// report a fixed metric, `get_model_info`/`get_model_version` are static. Used by this crate's
/// own executor tests; not meant to stand in for a real model.
pub struct EchoModel {
    pub version: String,
}

impl Model for EchoModel {
    fn predict(&self, features: &[Value]) -> Value {
        Value::Array(features.to_vec())
    }

    fn evaluate(&self, features: &[Value], _targets: &[Value]) -> Value {
        serde_json::json!({ "accuracy": 1.0, "n": features.len() })
    }

    fn get_feedback(&self, y_pred: &[Value], y_true: &[Value]) -> Value {
        let matches = y_pred.iter().zip(y_true.iter()).filter(|(a, b)| a == b).count();
        serde_json::json!({ "matches": matches, "total": y_pred.len() })
    }

    fn get_model_info(&self) -> Value {
        serde_json::json!({ "name": "echo" })
    }

    fn get_model_version(&self) -> String {
        self.version.clone()
    }
}

#[cfg(test)]
mod tests {
    use model_runtime::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_registry_insert_and_get() {
        let mut registry = ModelRegistry::new();
        registry.insert(
            "echo",
            Arc::new(EchoModel {
                version: "1.0.0".to_owned(),
            }),
        );

        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(vec!["echo".to_owned()], registry.model_names());
    }

    #[test]
    fn test_echo_model_predict() {
        let model = EchoModel {
            version: "1.0.0".to_owned(),
        };
        let features = vec![json!("x"), json!("y")];
        assert_eq!(json!(["x", "y"]), model.predict(&features));
    }
}
