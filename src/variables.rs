//! Variable storage with read-only protection
//!
//! Two stores share the same shape: a process-global map seeded by
//! configuration and shared by every pipeline, and a per-pipeline local
//! store that inherits a snapshot of the globals at construction time.
//!
//! All keys pass through [`normalize_variable`]: a leading `$` is
//! stripped and the name is lowercased, so `$Name`, `Name`, and `name`
//! address the same slot. A variable holding no value renders as the
//! empty string at retrieval.
//!
//! Retrieval fires two per-store hooks: *retrieving* (which may rewrite
//! the key before lookup) and *retrieved* (which may rewrite the value
//! handed back).

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::command::normalize_variable;
use crate::errors::{EngineError, Result};
use crate::hooks::{
    VariableRetrievedEvent, VariableRetrievedHook, VariableRetrievingEvent, VariableRetrievingHook,
};

// ============================================================================
// PipelineVariable
// ============================================================================

/// A named value with a read-only flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineVariable {
    /// The normalized name.
    pub name: String,
    /// The stored value; `None` renders as the empty string.
    pub value: Option<String>,
    /// When `true`, [`VariableStore::safe_set`] refuses to overwrite.
    pub read_only: bool,
}

impl PipelineVariable {
    /// Create a variable with an already-normalized name.
    pub fn new(name: impl Into<String>, value: Option<String>, read_only: bool) -> Self {
        Self {
            name: normalize_variable(&name.into()),
            value,
            read_only,
        }
    }

    /// The value rendered as a string (`None` becomes `""`).
    pub fn render(&self) -> String {
        self.value.clone().unwrap_or_default()
    }
}

// ============================================================================
// Process-global store
// ============================================================================

static GLOBALS: Lazy<RwLock<FxHashMap<String, PipelineVariable>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

fn globals_write() -> std::sync::RwLockWriteGuard<'static, FxHashMap<String, PipelineVariable>> {
    GLOBALS.write().unwrap_or_else(|e| e.into_inner())
}

fn globals_read() -> std::sync::RwLockReadGuard<'static, FxHashMap<String, PipelineVariable>> {
    GLOBALS.read().unwrap_or_else(|e| e.into_inner())
}

/// Set a process-global variable, bypassing read-only protection.
pub fn set_global(key: &str, value: Option<String>, read_only: bool) {
    let key = normalize_variable(key);
    let var = PipelineVariable {
        name: key.clone(),
        value,
        read_only,
    };
    globals_write().insert(key, var);
}

/// Remove one process-global variable.
pub fn unset_global(key: &str) {
    globals_write().remove(&normalize_variable(key));
}

/// Remove every process-global variable.
pub fn clear_globals() {
    globals_write().clear();
}

/// Check whether a process-global variable exists.
pub fn global_is_set(key: &str) -> bool {
    globals_read().contains_key(&normalize_variable(key))
}

fn global_lookup(key: &str) -> Option<PipelineVariable> {
    globals_read().get(key).cloned()
}

// ============================================================================
// VariableStore
// ============================================================================

/// A per-pipeline map of name to [`PipelineVariable`].
#[derive(Default)]
pub struct VariableStore {
    vars: FxHashMap<String, PipelineVariable>,
    retrieving_hooks: Vec<VariableRetrievingHook>,
    retrieved_hooks: Vec<VariableRetrievedHook>,
}

impl std::fmt::Debug for VariableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableStore")
            .field("vars", &self.vars)
            .field("retrieving_hooks", &self.retrieving_hooks.len())
            .field("retrieved_hooks", &self.retrieved_hooks.len())
            .finish()
    }
}

impl VariableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current process-global variables into this store.
    ///
    /// Called at pipeline construction so config-seeded globals (and
    /// their read-only flags) are visible locally.
    pub fn inherit_globals(&mut self) {
        for (key, var) in globals_read().iter() {
            self.vars.insert(key.clone(), var.clone());
        }
    }

    /// Set a variable, bypassing read-only protection.
    ///
    /// This is the engine-internal path, used to seed `__global` and to
    /// service the read-from/write-to pseudo-commands' source slots.
    pub fn set(&mut self, key: &str, value: Option<String>, read_only: bool) {
        let key = normalize_variable(key);
        let var = PipelineVariable {
            name: key.clone(),
            value,
            read_only,
        };
        self.vars.insert(key, var);
    }

    /// Set a variable, honoring read-only protection.
    ///
    /// Fails with [`EngineError::ReadOnlyViolation`] when the key exists
    /// and is marked read-only.
    pub fn safe_set(&mut self, key: &str, value: Option<String>) -> Result<()> {
        let key = normalize_variable(key);
        if let Some(existing) = self.vars.get(&key) {
            if existing.read_only {
                return Err(EngineError::read_only_violation(key));
            }
        }
        let var = PipelineVariable {
            name: key.clone(),
            value,
            read_only: false,
        };
        self.vars.insert(key, var);
        Ok(())
    }

    /// Retrieve a variable's rendered value.
    ///
    /// Fires the retrieving hook (which may rewrite the key) before
    /// lookup and the retrieved hook (which may rewrite the value)
    /// after. With `fallback_to_global`, a miss in this store consults
    /// the process-global store before failing with
    /// [`EngineError::UnknownVariable`].
    pub fn get(&self, key: &str, fallback_to_global: bool) -> Result<String> {
        let mut retrieving = VariableRetrievingEvent {
            key: normalize_variable(key),
        };
        for hook in &self.retrieving_hooks {
            hook(&mut retrieving);
        }
        let key = normalize_variable(&retrieving.key);

        let var = match self.vars.get(&key) {
            Some(var) => var.clone(),
            None if fallback_to_global => {
                global_lookup(&key).ok_or_else(|| EngineError::unknown_variable(&key))?
            }
            None => return Err(EngineError::unknown_variable(&key)),
        };

        let mut retrieved = VariableRetrievedEvent {
            key,
            value: var.render(),
        };
        for hook in &self.retrieved_hooks {
            hook(&mut retrieved);
        }
        Ok(retrieved.value)
    }

    /// Check whether a variable exists in this store.
    pub fn is_set(&self, key: &str) -> bool {
        self.vars.contains_key(&normalize_variable(key))
    }

    /// Fetch the full record for a variable, if present locally.
    pub fn lookup(&self, key: &str) -> Option<&PipelineVariable> {
        self.vars.get(&normalize_variable(key))
    }

    /// Number of variables held locally.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Check whether the local store is empty.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Subscribe to variable lookups on this store (fires before the
    /// lookup; the event's key is rewritable).
    pub fn on_retrieving(
        &mut self,
        hook: impl Fn(&mut VariableRetrievingEvent) + Send + Sync + 'static,
    ) {
        self.retrieving_hooks.push(std::sync::Arc::new(hook));
    }

    /// Subscribe to variable lookups on this store (fires after the
    /// lookup; the event's value is rewritable).
    pub fn on_retrieved(
        &mut self,
        hook: impl Fn(&mut VariableRetrievedEvent) + Send + Sync + 'static,
    ) {
        self.retrieved_hooks.push(std::sync::Arc::new(hook));
    }
}
