//! Evaluation scopes with parent/child derivation

use std::collections::HashMap;

use crate::value::Value;

/// A name-to-value binding environment.
///
/// Scopes chain: a child derived with [`Context::child`] resolves
/// lookups through its ancestors, but writes land only in the child.
/// The parent is held by shared reference, so mutating an ancestor
/// through a child is not expressible - derivation can never disturb
/// the caller's scope.
///
/// Executions derive a child from the caller's base context before
/// overlaying helper bindings, and the evaluator derives further
/// children for loop bodies and branches.
#[derive(Debug, Default)]
pub struct Context<'a> {
    parent: Option<&'a Context<'a>>,
    data: HashMap<String, Value>,
}

impl<'a> Context<'a> {
    /// An empty root scope
    pub fn new() -> Context<'static> {
        Context {
            parent: None,
            data: HashMap::new(),
        }
    }

    /// Derive a child scope that falls back to `self` for unknown names
    pub fn child(&self) -> Context<'_> {
        Context {
            parent: Some(self),
            data: HashMap::new(),
        }
    }

    /// Bind a name in this scope, shadowing any ancestor binding
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(name.into(), value.into());
    }

    /// Look up a name, walking the scope chain outward
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.data.get(name) {
            Some(value) => Some(value),
            None => self.parent.and_then(|p| p.get(name)),
        }
    }

    /// Whether a name resolves in this scope or any ancestor
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names bound directly in this scope (not ancestors)
    pub fn local_keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }
}

impl From<serde_json::Value> for Context<'static> {
    /// Build a root scope from a JSON object's top-level entries.
    /// Non-object documents bind under the name `value`.
    fn from(json: serde_json::Value) -> Self {
        let mut ctx = Context::new();
        match json {
            serde_json::Value::Object(map) => {
                for (key, value) in map {
                    ctx.set(key, Value::from(value));
                }
            }
            other => ctx.set("value", Value::from(other)),
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut ctx = Context::new();
        ctx.set("name", "bob");
        assert_eq!(ctx.get("name"), Some(&Value::from("bob")));
        assert_eq!(ctx.get("missing"), None);
    }

    #[test]
    fn test_child_reads_through_to_parent() {
        let mut parent = Context::new();
        parent.set("a", 1);
        let child = parent.child();
        assert_eq!(child.get("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_child_writes_shadow_without_mutating_parent() {
        let mut parent = Context::new();
        parent.set("a", 1);
        {
            let mut child = parent.child();
            child.set("a", 2);
            child.set("b", 3);
            assert_eq!(child.get("a"), Some(&Value::Int(2)));
            assert_eq!(child.get("b"), Some(&Value::Int(3)));
        }
        assert_eq!(parent.get("a"), Some(&Value::Int(1)));
        assert_eq!(parent.get("b"), None);
    }

    #[test]
    fn test_grandchild_lookup_walks_full_chain() {
        let mut root = Context::new();
        root.set("a", 1);
        let mut mid = root.child();
        mid.set("b", 2);
        let leaf = mid.child();
        assert_eq!(leaf.get("a"), Some(&Value::Int(1)));
        assert_eq!(leaf.get("b"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_from_json_object() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"name": "bob", "count": 3}"#).unwrap();
        let ctx = Context::from(json);
        assert_eq!(ctx.get("name"), Some(&Value::from("bob")));
        assert_eq!(ctx.get("count"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_from_json_scalar_binds_value() {
        let ctx = Context::from(serde_json::Value::from(7));
        assert_eq!(ctx.get("value"), Some(&Value::Int(7)));
    }
}
