//! Store engine: the tree of policy-guarded nodes
//!
//! A [`Store`] owns a table of entries keyed by single path segments and a
//! [`Permissions`] table governing them. Multi-segment operations walk the
//! tree top-down, delegating to child stores; writes auto-vivify missing
//! intermediate stores. Each level enforces its own permissions — policy is
//! re-evaluated per store, never inherited.
//!
//! Stored values come in four kinds (see [`Slot`]): an explicit absence, a
//! JSON primitive, a deferred value evaluated fresh on every access, or a
//! child store. Composite JSON never lands in a slot as-is; writing an
//! object or array expands it through [`flatten`] into a child store.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::{Result, StoreError};
use crate::flatten::flatten;
use crate::path;
use crate::policy::{Action, Permissions, Policy, Schema};

/// Deferred value: evaluated on every read and serialize, never cached
pub type Thunk<S> = Rc<dyn Fn() -> Resolved<S>>;

/// What a key holds inside a store
pub enum Slot<S: Schema> {
    /// Explicit "no value"
    Absent,
    /// A JSON primitive (string, number, boolean or null)
    Value(Value),
    /// A deferred value, invoked afresh on each access
    Deferred(Thunk<S>),
    /// A child store, exclusively owned by this slot
    Store(Store<S>),
}

/// Result of reading a path or invoking a deferred value
pub enum Resolved<S: Schema> {
    /// The key holds no value (or does not exist)
    Absent,
    /// A JSON primitive
    Value(Value),
    /// A child store; reads hand back a snapshot of the subtree
    Store(Store<S>),
}

impl<S: Schema> Resolved<S> {
    /// The primitive value, if that is what resolved
    pub fn into_value(self) -> Option<Value> {
        match self {
            Resolved::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow the primitive value, if that is what resolved
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Resolved::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The child store, if that is what resolved
    pub fn into_store(self) -> Option<Store<S>> {
        match self {
            Resolved::Store(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Resolved::Absent)
    }
}

/// A value being written into a store
///
/// `From` conversions cover primitives, `serde_json::Value` (which may be
/// composite — the engine expands it) and child stores; use
/// [`Input::deferred`] for deferred values and [`Input::Absent`] to store an
/// explicit absence.
pub enum Input<S: Schema> {
    Absent,
    /// JSON value; composites are flattened into a child store on write
    Value(Value),
    Deferred(Thunk<S>),
    Store(Store<S>),
}

impl<S: Schema> Input<S> {
    /// Wrap a zero-argument supplier as a deferred value
    pub fn deferred<F>(supplier: F) -> Self
    where
        F: Fn() -> Resolved<S> + 'static,
    {
        Input::Deferred(Rc::new(supplier))
    }
}

impl<S: Schema> From<Value> for Input<S> {
    fn from(v: Value) -> Self {
        Input::Value(v)
    }
}

impl<'a, S: Schema> From<&'a str> for Input<S> {
    fn from(v: &'a str) -> Self {
        Input::Value(Value::String(v.to_string()))
    }
}

impl<S: Schema> From<String> for Input<S> {
    fn from(v: String) -> Self {
        Input::Value(Value::String(v))
    }
}

impl<S: Schema> From<bool> for Input<S> {
    fn from(v: bool) -> Self {
        Input::Value(Value::Bool(v))
    }
}

impl<S: Schema> From<i32> for Input<S> {
    fn from(v: i32) -> Self {
        Input::Value(Value::from(v))
    }
}

impl<S: Schema> From<i64> for Input<S> {
    fn from(v: i64) -> Self {
        Input::Value(Value::from(v))
    }
}

impl<S: Schema> From<u32> for Input<S> {
    fn from(v: u32) -> Self {
        Input::Value(Value::from(v))
    }
}

impl<S: Schema> From<u64> for Input<S> {
    fn from(v: u64) -> Self {
        Input::Value(Value::from(v))
    }
}

impl<S: Schema> From<f64> for Input<S> {
    fn from(v: f64) -> Self {
        Input::Value(Value::from(v))
    }
}

impl<S: Schema> From<Store<S>> for Input<S> {
    fn from(v: Store<S>) -> Self {
        Input::Store(v)
    }
}

/// One node in the policy-guarded tree
///
/// The schema type parameter fixes the permission table every node of the
/// tree is constructed with; auto-vivified children are built by the same
/// constructor, so the concrete type of child stores always matches the
/// tree.
pub struct Store<S: Schema> {
    permissions: Permissions,
    entries: AHashMap<String, Slot<S>>,
}

/// Store with the trivial [`Open`](crate::policy::Open) schema
pub type OpenStore = Store<crate::policy::Open>;

impl<S: Schema> Store<S> {
    /// Create an empty store, consulting the schema's declared policy table
    pub fn new() -> Self {
        let mut permissions = Permissions::new(S::default_policy());
        for (key, policy) in S::overrides() {
            permissions.set_override(key, policy);
        }
        Store {
            permissions,
            entries: AHashMap::new(),
        }
    }

    /// Read the value at a colon-delimited path
    ///
    /// Single-segment reads check the key's read permission, invoke deferred
    /// values, and return [`Resolved::Absent`] for missing keys. On a
    /// multi-segment path every non-terminal segment must resolve to a child
    /// store (possibly through a deferred value); only the terminal store
    /// checks its leaf key's permission.
    pub fn read(&self, path: &str) -> Result<Resolved<S>> {
        let segments = path::validate(path)?;
        trace!(path, "read");
        self.read_segments(&segments)
    }

    fn read_segments(&self, segments: &[&str]) -> Result<Resolved<S>> {
        let Some((&head, rest)) = segments.split_first() else {
            return Err(StoreError::InvalidPath("empty path".to_string()));
        };

        if rest.is_empty() {
            if !self.permissions.allows(Action::Read, head) {
                return Err(StoreError::AccessDenied {
                    action: Action::Read,
                    key: head.to_string(),
                });
            }
            return Ok(match self.entries.get(head) {
                None | Some(Slot::Absent) => Resolved::Absent,
                Some(Slot::Value(v)) => Resolved::Value(v.clone()),
                Some(Slot::Deferred(thunk)) => thunk(),
                Some(Slot::Store(child)) => Resolved::Store(child.clone()),
            });
        }

        // Traversal does not consult the head key's own policy; only the
        // terminal store checks its leaf.
        match self.entries.get(head) {
            Some(Slot::Store(child)) => child.read_segments(rest),
            Some(Slot::Deferred(thunk)) => match thunk() {
                Resolved::Store(child) => child.read_segments(rest),
                _ => Err(not_a_store(head)),
            },
            _ => Err(not_a_store(head)),
        }
    }

    /// Write a value at a colon-delimited path
    ///
    /// Missing intermediate stores are auto-vivified, gated on the write
    /// permission of the key being vivified. Composite JSON is expanded into
    /// a fresh child store via [`flatten`], wholly replacing any prior value
    /// under the key.
    pub fn write<V: Into<Input<S>>>(&mut self, path: &str, value: V) -> Result<()> {
        let segments = path::validate(path)?;
        trace!(path, "write");
        self.write_segments(&segments, value.into())
    }

    fn write_segments(&mut self, segments: &[&str], value: Input<S>) -> Result<()> {
        let Some((&head, rest)) = segments.split_first() else {
            return Err(StoreError::InvalidPath("empty path".to_string()));
        };

        if rest.is_empty() {
            return self.write_leaf(head, value);
        }

        match self.entries.get_mut(head) {
            Some(Slot::Store(child)) => child.write_segments(rest, value),
            _ => {
                // Auto-vivify: replace whatever non-store slot is here with a
                // fresh child, but only if the key is writable. The child is
                // stored back only once the deeper write succeeded.
                if !self.permissions.allows(Action::Write, head) {
                    return Err(StoreError::AccessDenied {
                        action: Action::Write,
                        key: head.to_string(),
                    });
                }
                debug!(key = head, "auto-vivifying child store");
                let mut child = Store::new();
                child.write_segments(rest, value)?;
                self.entries.insert(head.to_string(), Slot::Store(child));
                Ok(())
            }
        }
    }

    fn write_leaf(&mut self, key: &str, value: Input<S>) -> Result<()> {
        if !self.permissions.allows(Action::Write, key) {
            return Err(StoreError::AccessDenied {
                action: Action::Write,
                key: key.to_string(),
            });
        }

        let slot = match value {
            Input::Absent => Slot::Absent,
            Input::Deferred(thunk) => Slot::Deferred(thunk),
            Input::Store(store) => Slot::Store(store),
            Input::Value(v) if v.is_object() || v.is_array() => {
                // Composites are never stored raw: expand into a child store,
                // re-entering the write protocol for every flattened leaf so
                // the schema's policies apply inside as well.
                let mut child = Store::new();
                for (leaf_path, primitive) in flatten(&v) {
                    child.write(&leaf_path, primitive)?;
                }
                Slot::Store(child)
            }
            Input::Value(v) => Slot::Value(v),
        };

        self.entries.insert(key.to_string(), slot);
        Ok(())
    }

    /// Write every top-level key of a JSON object through [`write`](Self::write)
    ///
    /// Keys are written in the map's iteration order. The batch is not
    /// transactional: the first failure aborts the remaining keys, and
    /// already-applied writes stay in place.
    pub fn write_entries(&mut self, entries: Map<String, Value>) -> Result<()> {
        for (key, value) in entries {
            self.write(&key, value)?;
        }
        Ok(())
    }

    /// Serialize the readable portion of the tree as a JSON object
    ///
    /// Keys denied by this store's policy are omitted; child stores apply
    /// their own policy in turn, so a denied key never appears at any depth.
    /// Deferred values are invoked; absent results and absent slots are
    /// omitted. Never fails.
    pub fn entries(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, slot) in &self.entries {
            if !self.permissions.allows(Action::Read, key) {
                continue;
            }
            match slot {
                Slot::Absent => {}
                Slot::Value(v) => {
                    out.insert(key.clone(), v.clone());
                }
                Slot::Store(child) => {
                    out.insert(key.clone(), Value::Object(child.entries()));
                }
                Slot::Deferred(thunk) => match thunk() {
                    Resolved::Absent => {}
                    Resolved::Value(v) => {
                        out.insert(key.clone(), v);
                    }
                    Resolved::Store(child) => {
                        out.insert(key.clone(), Value::Object(child.entries()));
                    }
                },
            }
        }
        out
    }

    /// Whether the resolved policy for a key permits reading
    pub fn allowed_to_read(&self, key: &str) -> bool {
        self.permissions.allows(Action::Read, key)
    }

    /// Whether the resolved policy for a key permits writing
    pub fn allowed_to_write(&self, key: &str) -> bool {
        self.permissions.allows(Action::Write, key)
    }

    /// Resolve the policy for a key: override if present, else the default
    pub fn policy_for(&self, key: &str) -> Policy {
        self.permissions.policy_for(key)
    }

    /// Insert or replace the policy override for a key
    pub fn set_override(&mut self, key: impl Into<String>, policy: Policy) {
        self.permissions.set_override(key, policy);
    }

    /// The policy applied to keys without an override
    pub fn default_policy(&self) -> Policy {
        self.permissions.default_policy()
    }

    /// Replace the default policy for this store only
    pub fn set_default_policy(&mut self, policy: Policy) {
        self.permissions.set_default_policy(policy);
    }

    /// Number of keys with a slot in this store (regardless of policy)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn not_a_store(key: &str) -> StoreError {
    StoreError::InvalidPath(format!("'{key}' does not resolve to a nested store"))
}

impl<S: Schema> Default for Store<S> {
    fn default() -> Self {
        Self::new()
    }
}

// Manual impls: deriving would demand S: Clone / S: Debug, and deferred
// values only expose their shared supplier.

impl<S: Schema> Clone for Store<S> {
    fn clone(&self) -> Self {
        Store {
            permissions: self.permissions.clone(),
            entries: self.entries.clone(),
        }
    }
}

impl<S: Schema> Clone for Slot<S> {
    fn clone(&self) -> Self {
        match self {
            Slot::Absent => Slot::Absent,
            Slot::Value(v) => Slot::Value(v.clone()),
            Slot::Deferred(thunk) => Slot::Deferred(Rc::clone(thunk)),
            Slot::Store(s) => Slot::Store(s.clone()),
        }
    }
}

impl<S: Schema> Clone for Resolved<S> {
    fn clone(&self) -> Self {
        match self {
            Resolved::Absent => Resolved::Absent,
            Resolved::Value(v) => Resolved::Value(v.clone()),
            Resolved::Store(s) => Resolved::Store(s.clone()),
        }
    }
}

impl<S: Schema> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("default_policy", &self.permissions.default_policy())
            .field("entries", &self.entries)
            .finish()
    }
}

impl<S: Schema> fmt::Debug for Slot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Absent => f.write_str("Absent"),
            Slot::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Slot::Deferred(_) => f.write_str("Deferred(..)"),
            Slot::Store(s) => f.debug_tuple("Store").field(s).finish(),
        }
    }
}

impl<S: Schema> fmt::Debug for Resolved<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Absent => f.write_str("Absent"),
            Resolved::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Resolved::Store(s) => f.debug_tuple("Store").field(s).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Open;
    use serde_json::json;
    use std::cell::Cell;

    fn read_json(store: &Store<Open>, path: &str) -> Option<Value> {
        store.read(path).unwrap().into_value()
    }

    #[test]
    fn test_round_trip_primitives() {
        let mut store = OpenStore::new();
        store.write("s", "hello").unwrap();
        store.write("n", 42).unwrap();
        store.write("f", 2.5).unwrap();
        store.write("b", true).unwrap();
        store.write("z", Value::Null).unwrap();

        assert_eq!(read_json(&store, "s"), Some(json!("hello")));
        assert_eq!(read_json(&store, "n"), Some(json!(42)));
        assert_eq!(read_json(&store, "f"), Some(json!(2.5)));
        assert_eq!(read_json(&store, "b"), Some(json!(true)));
        assert_eq!(read_json(&store, "z"), Some(Value::Null));
    }

    #[test]
    fn test_missing_key_is_absent() {
        let store = OpenStore::new();
        assert!(store.read("nothing").unwrap().is_absent());
    }

    #[test]
    fn test_explicit_absent_slot() {
        let mut store = OpenStore::new();
        store.write("gone", Input::Absent).unwrap();
        assert!(store.read("gone").unwrap().is_absent());
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_write_replaces_previous_value() {
        let mut store = OpenStore::new();
        store.write("k", 1).unwrap();
        store.write("k", "two").unwrap();
        assert_eq!(read_json(&store, "k"), Some(json!("two")));
    }

    #[test]
    fn test_auto_vivification() {
        let mut store = OpenStore::new();
        store.write("x:y:z", 5).unwrap();

        assert_eq!(read_json(&store, "x:y:z"), Some(json!(5)));
        assert!(store.read("x").unwrap().into_store().is_some());
        assert!(store.read("x:y").unwrap().into_store().is_some());
    }

    #[test]
    fn test_composite_expansion() {
        let mut store = OpenStore::new();
        store.write("a", json!({"b": 1, "c": [2, 3]})).unwrap();

        assert_eq!(read_json(&store, "a:b"), Some(json!(1)));
        assert_eq!(read_json(&store, "a:c:0"), Some(json!(2)));
        assert_eq!(read_json(&store, "a:c:1"), Some(json!(3)));
    }

    #[test]
    fn test_composite_replaces_not_merges() {
        let mut store = OpenStore::new();
        store.write("a", json!({"old": 1, "kept": 2})).unwrap();
        store.write("a", json!({"kept": 3})).unwrap();

        assert!(store.read("a:old").unwrap().is_absent());
        assert_eq!(read_json(&store, "a:kept"), Some(json!(3)));
    }

    #[test]
    fn test_empty_composite_becomes_empty_store() {
        let mut store = OpenStore::new();
        store.write("a", json!({})).unwrap();
        let child = store.read("a").unwrap().into_store().unwrap();
        assert!(child.is_empty());
    }

    #[test]
    fn test_deep_write_replaces_non_store_slot() {
        let mut store = OpenStore::new();
        store.write("a", 1).unwrap();
        store.write("a:b", 2).unwrap();
        assert_eq!(read_json(&store, "a:b"), Some(json!(2)));
    }

    #[test]
    fn test_invalid_traversal_through_primitive() {
        let mut store = OpenStore::new();
        store.write("a", 1).unwrap();
        assert!(matches!(
            store.read("a:b"),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_empty_path_rejected() {
        let mut store = OpenStore::new();
        assert!(matches!(store.read(""), Err(StoreError::InvalidPath(_))));
        assert!(matches!(
            store.write("", 1),
            Err(StoreError::InvalidPath(_))
        ));
        assert!(matches!(
            store.write("a::b", 1),
            Err(StoreError::InvalidPath(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_denied_read() {
        let mut store = OpenStore::new();
        store.write("k", 1).unwrap();
        store.set_override("k", Policy::WriteOnly);
        assert!(matches!(
            store.read("k"),
            Err(StoreError::AccessDenied {
                action: Action::Read,
                ..
            })
        ));
    }

    #[test]
    fn test_denied_write_leaves_store_unchanged() {
        let mut store = OpenStore::new();
        store.write("k", 1).unwrap();
        store.set_override("k", Policy::ReadOnly);

        assert!(matches!(
            store.write("k", 2),
            Err(StoreError::AccessDenied {
                action: Action::Write,
                ..
            })
        ));
        assert_eq!(read_json(&store, "k"), Some(json!(1)));
    }

    #[test]
    fn test_default_policy_none_denies_everything() {
        let mut store = OpenStore::new();
        store.set_default_policy(Policy::None);

        assert!(store.read("any").is_err());
        assert!(store.write("any", 1).is_err());
    }

    #[test]
    fn test_vivification_denied_when_head_unwritable() {
        let mut store = OpenStore::new();
        store.set_override("x", Policy::ReadOnly);

        assert!(matches!(
            store.write("x:y", 1),
            Err(StoreError::AccessDenied { .. })
        ));
        assert!(store.read("x").unwrap().is_absent());
    }

    #[test]
    fn test_traversal_skips_head_read_policy() {
        // Only the leaf key at the terminal store is permission checked.
        let mut store = OpenStore::new();
        store.write("x:y", 7).unwrap();
        store.set_override("x", Policy::None);

        assert_eq!(read_json(&store, "x:y"), Some(json!(7)));
        assert!(store.read("x").is_err());
    }

    #[test]
    fn test_deferred_value_fresh_on_every_read() {
        let mut store = OpenStore::new();
        let calls = Rc::new(Cell::new(0u32));
        let probe = Rc::clone(&calls);
        store
            .write(
                "stamp",
                Input::deferred(move || {
                    probe.set(probe.get() + 1);
                    Resolved::Value(json!(probe.get()))
                }),
            )
            .unwrap();

        assert_eq!(read_json(&store, "stamp"), Some(json!(1)));
        assert_eq!(read_json(&store, "stamp"), Some(json!(2)));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_deferred_store_is_traversable() {
        let mut store = OpenStore::new();
        store
            .write(
                "lazy",
                Input::deferred(|| {
                    let mut inner = OpenStore::new();
                    inner.write("leaf", 9).unwrap();
                    Resolved::Store(inner)
                }),
            )
            .unwrap();

        assert_eq!(read_json(&store, "lazy:leaf"), Some(json!(9)));
    }

    #[test]
    fn test_deferred_non_store_fails_traversal() {
        let mut store = OpenStore::new();
        store
            .write("lazy", Input::deferred(|| Resolved::Value(json!(1))))
            .unwrap();

        assert!(matches!(
            store.read("lazy:deeper"),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_child_store_written_directly() {
        let mut inner = OpenStore::new();
        inner.write("k", 1).unwrap();

        let mut store = OpenStore::new();
        store.write("sub", inner).unwrap();
        assert_eq!(read_json(&store, "sub:k"), Some(json!(1)));
    }

    #[test]
    fn test_entries_serializes_tree() {
        let mut store = OpenStore::new();
        store.write("top", "v").unwrap();
        store.write("nest:leaf", 1).unwrap();

        assert_eq!(
            Value::Object(store.entries()),
            json!({"top": "v", "nest": {"leaf": 1}})
        );
    }

    #[test]
    fn test_entries_filters_denied_keys() {
        let mut store = OpenStore::new();
        store.write("a", 1).unwrap();
        store.write("b", 2).unwrap();
        store.set_override("b", Policy::WriteOnly);

        let entries = store.entries();
        assert!(entries.contains_key("a"));
        assert!(!entries.contains_key("b"));
    }

    #[test]
    fn test_entries_invokes_deferred() {
        let mut store = OpenStore::new();
        store
            .write("now", Input::deferred(|| Resolved::Value(json!("tick"))))
            .unwrap();
        store
            .write("never", Input::deferred(|| Resolved::Absent))
            .unwrap();

        let entries = store.entries();
        assert_eq!(entries.get("now"), Some(&json!("tick")));
        assert!(!entries.contains_key("never"));
    }

    #[test]
    fn test_write_entries_batch() {
        let mut store = OpenStore::new();
        let Value::Object(batch) = json!({"a": 1, "b": {"c": 2}}) else {
            unreachable!()
        };
        store.write_entries(batch).unwrap();

        assert_eq!(read_json(&store, "a"), Some(json!(1)));
        assert_eq!(read_json(&store, "b:c"), Some(json!(2)));
    }

    #[test]
    fn test_write_entries_aborts_on_first_failure() {
        let mut store = OpenStore::new();
        store.set_override("locked", Policy::ReadOnly);

        let Value::Object(batch) = json!({"alpha": 1, "locked": 2, "zeta": 3}) else {
            unreachable!()
        };
        // serde_json maps iterate in key order: alpha, locked, zeta
        let result = store.write_entries(batch);

        assert!(matches!(result, Err(StoreError::AccessDenied { .. })));
        assert_eq!(read_json(&store, "alpha"), Some(json!(1)));
        assert!(store.read("zeta").unwrap().is_absent());
    }

    #[test]
    fn test_read_returns_store_snapshot() {
        let mut store = OpenStore::new();
        store.write("sub:k", 1).unwrap();

        let mut snapshot = store.read("sub").unwrap().into_store().unwrap();
        snapshot.write("k", 99).unwrap();

        // The tree is unaffected; snapshots are independent copies.
        assert_eq!(read_json(&store, "sub:k"), Some(json!(1)));
    }
}
