//! Bundle and method descriptors — the registration façade.
//!
//! Filter providers describe themselves with plain data instead of
//! language reflection: a [`FilterBundle`] carries a type name, an
//! optional category, and a list of [`FilterMethod`]s, each of which
//! carries zero or more [`FilterAnnotation`]s and dependency
//! declarations. [`register_bundle`] walks the descriptor and populates
//! the catalog, firing the category-doc-loading event (cancellable)
//! before recording the category and the command-loading event for each
//! derived registration.
//!
//! A method with no annotations is skipped by the bundle walk; it can
//! still be registered explicitly through [`register_method`] with an
//! explicit name.

use crate::hooks::{self, CategoryDocLoadingEvent};
use crate::registry::catalog::{self, FilterFn};

/// The category single callables land in when none is given.
const DEFAULT_METHOD_CATEGORY: &str = "user";

// ─── Descriptors ────────────────────────────────────────────────────────────

/// One filter declaration on a method.
///
/// Every annotation produces one registration. An absent name falls
/// back to the method's name; an absent category falls back to the
/// bundle's.
#[derive(Debug, Clone, Default)]
pub struct FilterAnnotation {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl FilterAnnotation {
    /// An annotation registering under the method's own name.
    pub fn new() -> Self {
        Self::default()
    }

    /// An annotation registering under an explicit name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Override the category for this registration only.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Attach a description recorded in the documentation index.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One callable plus its declared metadata.
#[derive(Clone)]
pub struct FilterMethod {
    pub method_name: String,
    pub annotations: Vec<FilterAnnotation>,
    pub dependencies: Vec<String>,
    pub func: FilterFn,
}

impl std::fmt::Debug for FilterMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterMethod")
            .field("method_name", &self.method_name)
            .field("annotations", &self.annotations)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl FilterMethod {
    pub fn new(method_name: impl Into<String>, func: FilterFn) -> Self {
        Self {
            method_name: method_name.into(),
            annotations: Vec::new(),
            dependencies: Vec::new(),
            func,
        }
    }

    /// Add a filter annotation.
    pub fn with_annotation(mut self, annotation: FilterAnnotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Declare a type that must be resolvable when this method is
    /// registered. An unresolved dependency hides the command instead of
    /// registering it.
    pub fn with_dependency(mut self, type_name: impl Into<String>) -> Self {
        self.dependencies.push(type_name.into());
        self
    }
}

/// A bundle of methods registered together, with a shared default
/// category.
#[derive(Debug, Clone)]
pub struct FilterBundle {
    pub type_name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub methods: Vec<FilterMethod>,
}

impl FilterBundle {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            category: None,
            description: None,
            methods: Vec::new(),
        }
    }

    /// Declare the bundle's category; without it, the type name is used.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Attach a category description for the documentation index.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a method.
    pub fn with_method(mut self, method: FilterMethod) -> Self {
        self.methods.push(method);
        self
    }
}

// ─── Registration façade ────────────────────────────────────────────────────

/// Register every annotated method of a bundle.
///
/// Returns the number of registrations that landed.
pub fn register_bundle(bundle: &FilterBundle) -> usize {
    register_bundle_as(bundle, None)
}

/// Register a bundle under an explicit category, overriding whatever
/// the bundle declares.
pub fn register_bundle_as(bundle: &FilterBundle, category_override: Option<&str>) -> usize {
    let category = category_override
        .map(str::to_string)
        .or_else(|| bundle.category.clone())
        .unwrap_or_else(|| bundle.type_name.clone());

    // A registered bundle's own type becomes resolvable for dependency
    // checks, its own methods' included.
    catalog::declare_type(&bundle.type_name);

    let mut event = CategoryDocLoadingEvent {
        category: crate::command::normalize_name(&category),
        description: bundle.description.clone(),
        cancel: false,
    };
    hooks::notify_category_doc_loading(&mut event);
    if !event.cancel {
        catalog::record_category_doc(&event.category, event.description.clone());
    }

    let mut registered = 0;
    for method in &bundle.methods {
        for annotation in &method.annotations {
            let name = annotation
                .name
                .clone()
                .unwrap_or_else(|| method.method_name.clone());
            let method_category = annotation.category.as_deref().unwrap_or(&category);
            if catalog::add_filter_with_deps(
                method.func.clone(),
                method_category,
                &name,
                annotation.description.as_deref(),
                &method.dependencies,
            ) {
                registered += 1;
            }
        }
    }
    registered
}

/// Register a single callable.
///
/// With an explicit `name`, exactly one registration is made; without
/// one, the method's annotations drive the walk the same way
/// [`register_bundle`] does (an unannotated method falls back to its
/// own name). The category falls back to `"user"`.
pub fn register_method(method: &FilterMethod, category: Option<&str>, name: Option<&str>) -> usize {
    let fallback_category = category.unwrap_or(DEFAULT_METHOD_CATEGORY);

    if let Some(name) = name {
        let description = method
            .annotations
            .first()
            .and_then(|a| a.description.as_deref());
        return usize::from(catalog::add_filter_with_deps(
            method.func.clone(),
            fallback_category,
            name,
            description,
            &method.dependencies,
        ));
    }

    if method.annotations.is_empty() {
        return usize::from(catalog::add_filter_with_deps(
            method.func.clone(),
            fallback_category,
            &method.method_name,
            None,
            &method.dependencies,
        ));
    }

    let mut registered = 0;
    for annotation in &method.annotations {
        let name = annotation
            .name
            .clone()
            .unwrap_or_else(|| method.method_name.clone());
        let method_category = annotation.category.as_deref().unwrap_or(fallback_category);
        if catalog::add_filter_with_deps(
            method.func.clone(),
            method_category,
            &name,
            annotation.description.as_deref(),
            &method.dependencies,
        ) {
            registered += 1;
        }
    }
    registered
}
