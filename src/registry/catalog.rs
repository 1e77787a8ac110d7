//! The registry maps and their operations.
//!
//! Keys are always the normalized qualified name (`category.name`,
//! lowercased, non-alphanumerics stripped per segment). Exactly one
//! filter lives under a key at any time; re-registration replaces
//! atomically, and the last registration wins.
//!
//! A name is either *live* or *hidden*, never both: removing a live
//! entry records a hidden entry carrying the reason, and a successful
//! re-registration clears any hidden entry under the key. Hidden
//! entries are also how registration-time dependency failures surface —
//! they are not errors at registration time, only when the name is
//! later invoked.

use once_cell::sync::Lazy;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::command::{normalize_name, PipelineCommand};
use crate::errors::Result;
use crate::hooks::{self, CommandLoadingEvent, FilterDocLoadingEvent};
use crate::pipeline::LogEntry;

// ─── Filter callable shape ──────────────────────────────────────────────────

/// The single callable shape every filter reduces to.
///
/// A filter receives the input text, the command record (mutable, so
/// jump filters can rewrite `send_to_label`), and the in-flight log
/// entry, and returns the output text.
pub type FilterFn =
    Arc<dyn Fn(&str, &mut PipelineCommand, &mut LogEntry) -> Result<String> + Send + Sync>;

/// A live registry entry.
#[derive(Clone)]
pub struct FilterEntry {
    pub func: FilterFn,
    pub description: Option<String>,
}

impl std::fmt::Debug for FilterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEntry")
            .field("description", &self.description)
            .finish()
    }
}

/// Documentation recorded for one category.
#[derive(Debug, Clone, Default)]
pub struct CategoryDoc {
    pub description: Option<String>,
    /// Command name to description, in name order.
    pub commands: BTreeMap<String, String>,
}

// ─── Shared state ───────────────────────────────────────────────────────────

static FILTERS: Lazy<RwLock<FxHashMap<String, FilterEntry>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));
static HIDDEN: Lazy<RwLock<FxHashMap<String, String>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));
static DOCS: Lazy<RwLock<FxHashMap<String, CategoryDoc>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));
static TYPES: Lazy<RwLock<FxHashSet<String>>> = Lazy::new(|| RwLock::new(FxHashSet::default()));

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

// ─── Registration ───────────────────────────────────────────────────────────

/// Register a filter callable under `category.name`.
///
/// Returns `true` when the registration landed, `false` when a
/// command-loading subscriber cancelled it.
pub fn add_filter(
    func: FilterFn,
    category: &str,
    name: &str,
    description: Option<&str>,
) -> bool {
    add_filter_with_deps(func, category, name, description, &[])
}

/// Registration path used by the descriptor façade: evaluates the
/// method's dependency declarations before anything else.
///
/// An unresolvable dependency records a hidden entry naming the missing
/// type and registers nothing.
pub(crate) fn add_filter_with_deps(
    func: FilterFn,
    category: &str,
    name: &str,
    description: Option<&str>,
    dependencies: &[String],
) -> bool {
    let category = normalize_name(category);
    let name = normalize_name(name);
    let key = format!("{category}.{name}");

    for dep in dependencies {
        if !type_resolvable(dep) {
            let reason =
                format!("the command could not be loaded: missing dependency '{dep}'");
            tracing::warn!(command = %key, dependency = %dep, "hiding command");
            write(&FILTERS).remove(&key);
            write(&HIDDEN).insert(key, reason);
            return false;
        }
    }

    let mut event = CommandLoadingEvent {
        category,
        name,
        description: description.map(str::to_string),
        cancel: false,
    };
    hooks::notify_command_loading(&mut event);
    if event.cancel {
        tracing::debug!(command = %event.qualified_name(), "registration cancelled by subscriber");
        return false;
    }

    // Subscribers may have rewritten the identifiers.
    let category = normalize_name(&event.category);
    let name = normalize_name(&event.name);
    let key = format!("{category}.{name}");

    write(&FILTERS).insert(
        key.clone(),
        FilterEntry {
            func,
            description: event.description.clone(),
        },
    );
    write(&HIDDEN).remove(&key);
    tracing::debug!(command = %key, "filter registered");

    let mut doc_event = FilterDocLoadingEvent {
        category: category.clone(),
        name: name.clone(),
        description: event.description,
        cancel: false,
    };
    hooks::notify_filter_doc_loading(&mut doc_event);
    if !doc_event.cancel {
        write(&DOCS)
            .entry(category)
            .or_default()
            .commands
            .insert(name, doc_event.description.unwrap_or_default());
    }

    true
}

/// Record a category's documentation entry. Fired-through by the
/// descriptor façade after the category-doc-loading event.
pub(crate) fn record_category_doc(category: &str, description: Option<String>) {
    let category = normalize_name(category);
    let mut docs = write(&DOCS);
    let doc = docs.entry(category).or_default();
    if description.is_some() {
        doc.description = description;
    }
}

// ─── Removal ────────────────────────────────────────────────────────────────

/// Remove a filter and record a hidden entry with the reason.
///
/// Subsequent invocations of the name fail with `CommandUnavailable`
/// carrying that reason.
pub fn remove(qualified_name: &str, reason: Option<&str>) {
    let key = normalize_name(qualified_name);
    let reason = reason
        .map(str::to_string)
        .unwrap_or_else(|| "the command was removed from the catalog".to_string());

    write(&FILTERS).remove(&key);
    if let Some((category, name)) = key.split_once('.') {
        if let Some(doc) = write(&DOCS).get_mut(category) {
            doc.commands.remove(name);
        }
    }
    tracing::debug!(command = %key, %reason, "filter removed");
    write(&HIDDEN).insert(key, reason);
}

/// Remove every filter whose key begins with `category.`.
pub fn remove_category(category: &str, reason: Option<&str>) {
    let category = normalize_name(category);
    let prefix = format!("{category}.");
    let keys: Vec<String> = read(&FILTERS)
        .keys()
        .filter(|k| k.starts_with(&prefix))
        .cloned()
        .collect();

    let reason = reason
        .map(str::to_string)
        .unwrap_or_else(|| format!("the category '{category}' was removed from the catalog"));
    for key in keys {
        remove(&key, Some(&reason));
    }
    write(&DOCS).remove(&category);
}

// ─── Lookup ─────────────────────────────────────────────────────────────────

/// Fetch the live entry for a normalized qualified name.
pub fn lookup(normalized_name: &str) -> Option<FilterEntry> {
    read(&FILTERS).get(normalized_name).cloned()
}

/// Check whether a qualified name has a live registration.
pub fn is_registered(qualified_name: &str) -> bool {
    read(&FILTERS).contains_key(&normalize_name(qualified_name))
}

/// Fetch the recorded reason a qualified name is hidden, if it is.
pub fn hidden_reason(qualified_name: &str) -> Option<String> {
    read(&HIDDEN).get(&normalize_name(qualified_name)).cloned()
}

/// The categories present in the documentation index, sorted.
pub fn categories() -> Vec<String> {
    let mut out: Vec<String> = read(&DOCS).keys().cloned().collect();
    out.sort();
    out
}

/// The documentation recorded for one category.
pub fn category_doc(category: &str) -> Option<CategoryDoc> {
    read(&DOCS).get(&normalize_name(category)).cloned()
}

// ─── Dependency resolution ──────────────────────────────────────────────────

/// Declare a type name as resolvable for dependency checks.
///
/// Registering a bundle declares its own type name automatically; hosts
/// declare external collaborator types here before registering bundles
/// that depend on them.
pub fn declare_type(type_name: &str) {
    write(&TYPES).insert(type_name.to_string());
}

pub(crate) fn type_resolvable(type_name: &str) -> bool {
    read(&TYPES).contains(type_name)
}

// ─── Reset ──────────────────────────────────────────────────────────────────

pub(crate) fn clear() {
    write(&FILTERS).clear();
    write(&HIDDEN).clear();
    write(&DOCS).clear();
    write(&TYPES).clear();
}
