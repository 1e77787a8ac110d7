//! The process-global filter catalog.
//!
//! This module owns everything shared by all pipelines: the live filter
//! map, the hidden-command map, the documentation index, the
//! resolvable-type set, and the command-factory table.
//!
//! ## Submodules
//!
//! - [`catalog`] — the registry maps and their operations
//! - [`descriptor`] — bundle/method descriptors and the registration façade
//! - [`factory`] — wildcard command factories and the expansion pass

pub mod catalog;
pub mod descriptor;
pub mod factory;

pub use catalog::{
    add_filter, categories, category_doc, declare_type, hidden_reason, is_registered, lookup,
    remove, remove_category, CategoryDoc, FilterEntry, FilterFn,
};
pub use descriptor::{
    register_bundle, register_bundle_as, register_method, FilterAnnotation, FilterBundle,
    FilterMethod,
};
pub use factory::{register_factory, FactoryFn};

/// Clear every piece of process-global registry state: live filters,
/// hidden commands, documentation, resolvable types, and factories.
///
/// Intended for embedders that re-initialize the catalog, and for tests.
/// Hook subscriptions are cleared separately via [`crate::hooks::reset`].
pub fn reset() {
    catalog::clear();
    factory::clear();
}
