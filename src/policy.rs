//! Per-key access policies
//!
//! Every store carries a [`Permissions`] table: a default [`Policy`] plus
//! per-key overrides. A policy governs a single key in a single store; deeper
//! levels of the tree consult their own table as a path is walked, so there
//! is no downward inheritance.
//!
//! Concrete store types declare their initial override table through the
//! [`Schema`] trait, consulted once at construction. This replaces any
//! notion of per-field annotations with a plain constant table.

use std::fmt;
use std::str::FromStr;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Access policy for a single key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Key may be read but not written
    ReadOnly,
    /// Key may be written but not read
    WriteOnly,
    /// Key may be read and written
    ReadWrite,
    /// Key may be neither read nor written
    None,
}

/// Actions a caller can perform on a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
}

impl Policy {
    /// Check whether this policy permits the given action
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Read => matches!(self, Policy::ReadOnly | Policy::ReadWrite),
            Action::Write => matches!(self, Policy::WriteOnly | Policy::ReadWrite),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Policy::ReadOnly => "read-only",
            Policy::WriteOnly => "write-only",
            Policy::ReadWrite => "read-write",
            Policy::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for Policy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read-only" => Ok(Policy::ReadOnly),
            "write-only" => Ok(Policy::WriteOnly),
            "read-write" => Ok(Policy::ReadWrite),
            "none" => Ok(Policy::None),
            other => Err(StoreError::UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Read => f.write_str("read"),
            Action::Write => f.write_str("write"),
        }
    }
}

/// Permission table for one store: a default policy plus per-key overrides
#[derive(Debug, Clone)]
pub struct Permissions {
    default: Policy,
    overrides: AHashMap<String, Policy>,
}

impl Permissions {
    /// Create a table with the given default and no overrides
    pub fn new(default: Policy) -> Self {
        Permissions {
            default,
            overrides: AHashMap::new(),
        }
    }

    /// Resolve the policy for a key: the override if present, else the default
    pub fn policy_for(&self, key: &str) -> Policy {
        self.overrides.get(key).copied().unwrap_or(self.default)
    }

    /// Check whether the resolved policy for a key permits an action
    pub fn allows(&self, action: Action, key: &str) -> bool {
        self.policy_for(key).allows(action)
    }

    /// Insert or replace the override for a key
    pub fn set_override(&mut self, key: impl Into<String>, policy: Policy) {
        self.overrides.insert(key.into(), policy);
    }

    /// The policy applied to keys without an override
    pub fn default_policy(&self) -> Policy {
        self.default
    }

    /// Replace the default policy; existing overrides are untouched
    pub fn set_default_policy(&mut self, policy: Policy) {
        self.default = policy;
    }
}

/// Declarative permission schema for a concrete store type
///
/// The schema is consulted exactly once, when a store of that type is
/// constructed — explicitly or by auto-vivification during a deep write.
/// Because child stores share the concrete type of their parent, the whole
/// tree answers to one schema.
///
/// # Examples
/// ```
/// use gatestore::{Policy, Schema, Store};
///
/// struct Credentials;
///
/// impl Schema for Credentials {
///     fn overrides() -> Vec<(&'static str, Policy)> {
///         vec![("password", Policy::WriteOnly)]
///     }
/// }
///
/// let store = Store::<Credentials>::new();
/// assert!(!store.allowed_to_read("password"));
/// assert!(store.allowed_to_write("password"));
/// ```
pub trait Schema: 'static {
    /// Key-to-policy overrides applied at construction
    fn overrides() -> Vec<(&'static str, Policy)> {
        Vec::new()
    }

    /// Policy for keys without an override
    fn default_policy() -> Policy {
        Policy::ReadWrite
    }
}

/// The trivial schema: no overrides, every key read-write
#[derive(Debug, Clone, Copy, Default)]
pub struct Open;

impl Schema for Open {}
