//! Conflict resolution strategies
//!
//! When two peers produce partial snapshots concurrently, a strategy decides
//! how the local and remote key sets are combined. Resolution is applied via
//! the state bridge and must stay idempotent: resolving and applying the
//! same remote snapshot twice yields the same state as doing it once.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::protocol::StateMap;

/// User-supplied resolver: given local and remote partial snapshots, return
/// the merged object. An `Err` or a non-object value counts as a failure.
pub type CustomResolverFn =
    dyn Fn(&StateMap, &StateMap) -> anyhow::Result<Value> + Send + Sync + 'static;

/// Trait for conflict resolution strategies
#[async_trait::async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Merge a local and a remote partial snapshot into the result to apply
    async fn resolve(&self, local: &StateMap, remote: &StateMap) -> StateMap;

    /// Get the name of this resolver
    fn name(&self) -> &'static str;
}

/// Predefined conflict resolution strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictStrategy {
    /// Remote values override local for every key present in remote (default:
    /// remote is, by construction, the most recently observed change)
    #[default]
    LastWriteWins,
    /// Local values are retained for keys present in both; only keys present
    /// solely in remote are adopted
    FirstWriteWins,
    /// Deep merge: objects recurse, lists concatenate, scalars remote-wins
    Merge,
    /// Delegate to a user-supplied resolver function
    Custom,
}

impl ConflictStrategy {
    /// Create a resolver for this strategy.
    ///
    /// `Custom` without a function is a programmer mistake and fails fast.
    pub fn create_resolver(
        &self,
        custom: Option<Arc<CustomResolverFn>>,
    ) -> SyncResult<Arc<dyn ConflictResolver>> {
        match self {
            ConflictStrategy::LastWriteWins => Ok(Arc::new(LastWriteWinsResolver)),
            ConflictStrategy::FirstWriteWins => Ok(Arc::new(FirstWriteWinsResolver)),
            ConflictStrategy::Merge => Ok(Arc::new(DeepMergeResolver)),
            ConflictStrategy::Custom => match custom {
                Some(f) => Ok(Arc::new(CustomResolver { inner: f })),
                None => Err(SyncError::InvalidConfig(
                    "conflict strategy 'custom' requires a resolver function".to_string(),
                )),
            },
        }
    }
}

/// Remote overrides local per key; keys absent from remote keep local
pub struct LastWriteWinsResolver;

#[async_trait::async_trait]
impl ConflictResolver for LastWriteWinsResolver {
    async fn resolve(&self, local: &StateMap, remote: &StateMap) -> StateMap {
        let mut merged = local.clone();
        for (key, value) in remote {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    fn name(&self) -> &'static str {
        "last_write_wins"
    }
}

/// Local wins for keys present in both; only remote-only keys are adopted
pub struct FirstWriteWinsResolver;

#[async_trait::async_trait]
impl ConflictResolver for FirstWriteWinsResolver {
    async fn resolve(&self, local: &StateMap, remote: &StateMap) -> StateMap {
        let mut merged = local.clone();
        for (key, value) in remote {
            if !merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    fn name(&self) -> &'static str {
        "first_write_wins"
    }
}

/// Recursive merge: nested objects merge per sub-key, lists concatenate
/// remote after local (no deduplication, a caller concern), scalars
/// remote-wins
pub struct DeepMergeResolver;

#[async_trait::async_trait]
impl ConflictResolver for DeepMergeResolver {
    async fn resolve(&self, local: &StateMap, remote: &StateMap) -> StateMap {
        let mut merged = local.clone();
        for (key, remote_value) in remote {
            match merged.get(key) {
                Some(local_value) => {
                    let combined = deep_merge_value(local_value, remote_value);
                    merged.insert(key.clone(), combined);
                }
                None => {
                    merged.insert(key.clone(), remote_value.clone());
                }
            }
        }
        merged
    }

    fn name(&self) -> &'static str {
        "merge"
    }
}

/// User-supplied resolver with last-write-wins fallback.
///
/// A failing or misbehaving resolver must never abort message processing;
/// its merge falls back to last-write-wins and is logged.
pub struct CustomResolver {
    inner: Arc<CustomResolverFn>,
}

impl CustomResolver {
    pub fn new(inner: Arc<CustomResolverFn>) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl ConflictResolver for CustomResolver {
    async fn resolve(&self, local: &StateMap, remote: &StateMap) -> StateMap {
        match (self.inner)(local, remote) {
            Ok(Value::Object(merged)) => merged,
            Ok(other) => {
                warn!(
                    "Custom resolver returned non-object value ({}), falling back to last-write-wins",
                    value_kind(&other)
                );
                LastWriteWinsResolver.resolve(local, remote).await
            }
            Err(e) => {
                warn!("Custom resolver failed: {}, falling back to last-write-wins", e);
                LastWriteWinsResolver.resolve(local, remote).await
            }
        }
    }

    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Merge two values recursively per the `Merge` strategy rules
fn deep_merge_value(local: &Value, remote: &Value) -> Value {
    match (local, remote) {
        (Value::Object(local_map), Value::Object(remote_map)) => {
            let mut merged = local_map.clone();
            for (key, remote_value) in remote_map {
                match merged.get(key) {
                    Some(local_value) => {
                        let combined = deep_merge_value(local_value, remote_value);
                        merged.insert(key.clone(), combined);
                    }
                    None => {
                        merged.insert(key.clone(), remote_value.clone());
                    }
                }
            }
            Value::Object(merged)
        }
        (Value::Array(local_items), Value::Array(remote_items)) => {
            let mut combined = local_items.clone();
            combined.extend(remote_items.iter().cloned());
            Value::Array(combined)
        }
        // Scalars and mismatched shapes: remote wins
        _ => remote.clone(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(value: Value) -> StateMap {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_last_write_wins_remote_overrides() {
        let local = state(json!({"theme": "dark", "locale": "en"}));
        let remote = state(json!({"theme": "light"}));

        let merged = LastWriteWinsResolver.resolve(&local, &remote).await;
        assert_eq!(merged["theme"], json!("light"));
        assert_eq!(merged["locale"], json!("en"));
    }

    #[tokio::test]
    async fn test_first_write_wins_keeps_local() {
        let local = state(json!({"theme": "dark"}));
        let remote = state(json!({"theme": "light", "locale": "fr"}));

        let merged = FirstWriteWinsResolver.resolve(&local, &remote).await;
        assert_eq!(merged["theme"], json!("dark"));
        assert_eq!(merged["locale"], json!("fr"));
    }

    #[tokio::test]
    async fn test_deep_merge_nested_objects() {
        let local = state(json!({"prefs": {"theme": "dark", "font": 12}}));
        let remote = state(json!({"prefs": {"theme": "light", "lang": "fr"}}));

        let merged = DeepMergeResolver.resolve(&local, &remote).await;
        assert_eq!(
            merged["prefs"],
            json!({"theme": "light", "font": 12, "lang": "fr"})
        );
    }

    #[tokio::test]
    async fn test_deep_merge_concatenates_lists() {
        let local = state(json!({"tags": ["a", "b"]}));
        let remote = state(json!({"tags": ["b", "c"]}));

        let merged = DeepMergeResolver.resolve(&local, &remote).await;
        // No deduplication: that is a caller concern
        assert_eq!(merged["tags"], json!(["a", "b", "b", "c"]));
    }

    #[tokio::test]
    async fn test_deep_merge_scalar_remote_wins() {
        let local = state(json!({"count": 1}));
        let remote = state(json!({"count": 2}));

        let merged = DeepMergeResolver.resolve(&local, &remote).await;
        assert_eq!(merged["count"], json!(2));
    }

    #[tokio::test]
    async fn test_merge_commutative_on_disjoint_keys() {
        let a = state(json!({"x": 1, "nested": {"p": true}}));
        let b = state(json!({"y": 2, "list": [1, 2]}));

        let ab = DeepMergeResolver.resolve(&a, &b).await;
        let ba = DeepMergeResolver.resolve(&b, &a).await;

        // Equal up to key ordering
        assert_eq!(Value::Object(ab), Value::Object(ba));
    }

    #[tokio::test]
    async fn test_idempotent_application() {
        let local = state(json!({"theme": "dark", "tags": ["a"]}));
        let remote = state(json!({"theme": "light"}));

        for strategy in [
            ConflictStrategy::LastWriteWins,
            ConflictStrategy::FirstWriteWins,
            ConflictStrategy::Merge,
        ] {
            let resolver = strategy.create_resolver(None).unwrap();
            let once = resolver.resolve(&local, &remote).await;
            let twice = resolver.resolve(&once, &remote).await;
            assert_eq!(
                Value::Object(once.clone()),
                Value::Object(twice),
                "strategy {:?} is not idempotent",
                strategy
            );
        }
    }

    #[tokio::test]
    async fn test_merge_array_concat_is_not_idempotent() {
        // List concatenation preserves remote items at the cost of
        // idempotence: re-resolving the same remote payload appends again.
        // Duplicate-tolerant replication therefore holds for object and
        // scalar payloads only.
        let local = state(json!({"tags": ["a"]}));
        let remote = state(json!({"tags": ["b"]}));
        let resolver = ConflictStrategy::Merge.create_resolver(None).unwrap();

        let once = resolver.resolve(&local, &remote).await;
        assert_eq!(once["tags"], json!(["a", "b"]));

        let twice = resolver.resolve(&once, &remote).await;
        assert_eq!(twice["tags"], json!(["a", "b", "b"]));
    }

    #[tokio::test]
    async fn test_custom_resolver_merged_result() {
        let f: Arc<CustomResolverFn> = Arc::new(|local, remote| {
            let mut merged = local.clone();
            for (k, v) in remote {
                merged.insert(format!("remote_{}", k), v.clone());
            }
            Ok(Value::Object(merged))
        });
        let resolver = ConflictStrategy::Custom.create_resolver(Some(f)).unwrap();

        let local = state(json!({"a": 1}));
        let remote = state(json!({"b": 2}));
        let merged = resolver.resolve(&local, &remote).await;

        assert_eq!(merged["a"], json!(1));
        assert_eq!(merged["remote_b"], json!(2));
    }

    #[tokio::test]
    async fn test_custom_resolver_error_falls_back_to_lww() {
        let f: Arc<CustomResolverFn> = Arc::new(|_, _| anyhow::bail!("resolver exploded"));
        let resolver = ConflictStrategy::Custom.create_resolver(Some(f)).unwrap();

        let local = state(json!({"theme": "dark"}));
        let remote = state(json!({"theme": "light"}));
        let merged = resolver.resolve(&local, &remote).await;

        assert_eq!(merged["theme"], json!("light"));
    }

    #[tokio::test]
    async fn test_custom_resolver_non_object_falls_back_to_lww() {
        let f: Arc<CustomResolverFn> = Arc::new(|_, _| Ok(json!("not an object")));
        let resolver = ConflictStrategy::Custom.create_resolver(Some(f)).unwrap();

        let local = state(json!({"theme": "dark", "locale": "en"}));
        let remote = state(json!({"theme": "light"}));
        let merged = resolver.resolve(&local, &remote).await;

        assert_eq!(merged["theme"], json!("light"));
        assert_eq!(merged["locale"], json!("en"));
    }

    #[test]
    fn test_custom_without_function_fails_fast() {
        let result = ConflictStrategy::Custom.create_resolver(None);
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }
}
