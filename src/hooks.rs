//! Lifecycle hooks and their event records
//!
//! The engine exposes five process-global lifecycle events and four
//! per-instance events. Subscribers receive a mutable event record and
//! fire in subscription order:
//!
//! | Event | Scope | Record | Cancellable |
//! |-------|-------|--------|-------------|
//! | pipeline-created | global | the new [`Pipeline`] | no |
//! | command-loading | global | [`CommandLoadingEvent`] | yes |
//! | pipeline-complete | global | [`PipelineCompleteEvent`] | no |
//! | filter-doc-loading | global | [`FilterDocLoadingEvent`] | yes |
//! | category-doc-loading | global | [`CategoryDocLoadingEvent`] | yes |
//! | filter-executing | per pipeline | [`FilterExecutingEvent`] | no |
//! | filter-executed | per pipeline | [`FilterExecutedEvent`] | no |
//! | variable-retrieving | per store | [`VariableRetrievingEvent`] | no |
//! | variable-retrieved | per store | [`VariableRetrievedEvent`] | no |
//!
//! Cancellable events expose a `cancel` flag; setting it suppresses the
//! registration or documentation write the event announces. Global
//! subscription is guarded by locks and may happen on any thread, but it
//! is not transactional with respect to an in-flight dispatch: a
//! dispatch observes the subscriber list as it was when the event fired.

use once_cell::sync::Lazy;
use std::sync::{Arc, RwLock};

use crate::pipeline::Pipeline;

// ─── Event records ──────────────────────────────────────────────────────────

/// Fired while a filter registration is being recorded.
///
/// Category and name arrive normalized. Setting [`cancel`](Self::cancel)
/// suppresses the registration entirely.
#[derive(Debug, Clone)]
pub struct CommandLoadingEvent {
    pub category: String,
    pub name: String,
    pub description: Option<String>,
    pub cancel: bool,
}

impl CommandLoadingEvent {
    /// The normalized `category.name` key the registration would land
    /// under.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.category, self.name)
    }
}

/// Fired after a pipeline run terminates, with the final value still
/// rewritable.
#[derive(Debug, Clone)]
pub struct PipelineCompleteEvent {
    /// The value of `__global` read at termination. Subscribers may
    /// replace it; the pipeline returns whatever is left here.
    pub value: Option<String>,
}

/// Fired before a filter's documentation entry is written.
#[derive(Debug, Clone)]
pub struct FilterDocLoadingEvent {
    pub category: String,
    pub name: String,
    pub description: Option<String>,
    pub cancel: bool,
}

/// Fired before a category's documentation record is written.
#[derive(Debug, Clone)]
pub struct CategoryDocLoadingEvent {
    pub category: String,
    pub description: Option<String>,
    pub cancel: bool,
}

/// Fired immediately before a filter body runs.
///
/// Both the input text and the command record are rewritable; the
/// filter sees whatever the subscribers leave behind.
#[derive(Debug)]
pub struct FilterExecutingEvent<'a> {
    pub input: &'a mut String,
    pub command: &'a mut crate::command::PipelineCommand,
}

/// Fired immediately after a filter body returns, before the output is
/// written to the store.
#[derive(Debug)]
pub struct FilterExecutedEvent<'a> {
    pub output: &'a mut String,
    pub command: &'a crate::command::PipelineCommand,
}

/// Fired before a variable lookup; the key may be rewritten.
#[derive(Debug, Clone)]
pub struct VariableRetrievingEvent {
    /// The normalized key about to be looked up.
    pub key: String,
}

/// Fired after a variable lookup; the value may be rewritten.
#[derive(Debug, Clone)]
pub struct VariableRetrievedEvent {
    pub key: String,
    pub value: String,
}

// ─── Subscriber types ───────────────────────────────────────────────────────

pub type PipelineCreatedHook = Arc<dyn Fn(&mut Pipeline) + Send + Sync>;
pub type CommandLoadingHook = Arc<dyn Fn(&mut CommandLoadingEvent) + Send + Sync>;
pub type PipelineCompleteHook = Arc<dyn Fn(&mut PipelineCompleteEvent) + Send + Sync>;
pub type FilterDocLoadingHook = Arc<dyn Fn(&mut FilterDocLoadingEvent) + Send + Sync>;
pub type CategoryDocLoadingHook = Arc<dyn Fn(&mut CategoryDocLoadingEvent) + Send + Sync>;
pub type FilterExecutingHook = Arc<dyn Fn(&mut FilterExecutingEvent<'_>) + Send + Sync>;
pub type FilterExecutedHook = Arc<dyn Fn(&mut FilterExecutedEvent<'_>) + Send + Sync>;
pub type VariableRetrievingHook = Arc<dyn Fn(&mut VariableRetrievingEvent) + Send + Sync>;
pub type VariableRetrievedHook = Arc<dyn Fn(&mut VariableRetrievedEvent) + Send + Sync>;

// ─── Global subscriber lists ────────────────────────────────────────────────

static PIPELINE_CREATED: Lazy<RwLock<Vec<PipelineCreatedHook>>> =
    Lazy::new(|| RwLock::new(Vec::new()));
static COMMAND_LOADING: Lazy<RwLock<Vec<CommandLoadingHook>>> =
    Lazy::new(|| RwLock::new(Vec::new()));
static PIPELINE_COMPLETE: Lazy<RwLock<Vec<PipelineCompleteHook>>> =
    Lazy::new(|| RwLock::new(Vec::new()));
static FILTER_DOC_LOADING: Lazy<RwLock<Vec<FilterDocLoadingHook>>> =
    Lazy::new(|| RwLock::new(Vec::new()));
static CATEGORY_DOC_LOADING: Lazy<RwLock<Vec<CategoryDocLoadingHook>>> =
    Lazy::new(|| RwLock::new(Vec::new()));

fn write_poisoned<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn snapshot<H: Clone>(lock: &RwLock<Vec<H>>) -> Vec<H> {
    lock.read().unwrap_or_else(|e| e.into_inner()).clone()
}

// ─── Subscription API ───────────────────────────────────────────────────────

/// Subscribe to pipeline construction. The hook receives the new
/// instance before it is handed back to the caller and may mutate it,
/// e.g. to seed variables or attach per-instance hooks.
pub fn on_pipeline_created(hook: impl Fn(&mut Pipeline) + Send + Sync + 'static) {
    write_poisoned(&PIPELINE_CREATED).push(Arc::new(hook));
}

/// Subscribe to filter registrations.
pub fn on_command_loading(hook: impl Fn(&mut CommandLoadingEvent) + Send + Sync + 'static) {
    write_poisoned(&COMMAND_LOADING).push(Arc::new(hook));
}

/// Subscribe to pipeline completion.
pub fn on_pipeline_complete(hook: impl Fn(&mut PipelineCompleteEvent) + Send + Sync + 'static) {
    write_poisoned(&PIPELINE_COMPLETE).push(Arc::new(hook));
}

/// Subscribe to filter documentation writes.
pub fn on_filter_doc_loading(hook: impl Fn(&mut FilterDocLoadingEvent) + Send + Sync + 'static) {
    write_poisoned(&FILTER_DOC_LOADING).push(Arc::new(hook));
}

/// Subscribe to category documentation writes.
pub fn on_category_doc_loading(
    hook: impl Fn(&mut CategoryDocLoadingEvent) + Send + Sync + 'static,
) {
    write_poisoned(&CATEGORY_DOC_LOADING).push(Arc::new(hook));
}

/// Drop every global subscription.
///
/// Intended for embedders that re-initialize the engine, and for tests,
/// which share the process-global subscriber lists.
pub fn reset() {
    write_poisoned(&PIPELINE_CREATED).clear();
    write_poisoned(&COMMAND_LOADING).clear();
    write_poisoned(&PIPELINE_COMPLETE).clear();
    write_poisoned(&FILTER_DOC_LOADING).clear();
    write_poisoned(&CATEGORY_DOC_LOADING).clear();
}

// ─── Dispatch (crate-internal) ──────────────────────────────────────────────

pub(crate) fn notify_pipeline_created(pipeline: &mut Pipeline) {
    for hook in snapshot(&PIPELINE_CREATED) {
        hook(pipeline);
    }
}

pub(crate) fn notify_command_loading(event: &mut CommandLoadingEvent) {
    for hook in snapshot(&COMMAND_LOADING) {
        hook(event);
    }
}

pub(crate) fn notify_pipeline_complete(event: &mut PipelineCompleteEvent) {
    for hook in snapshot(&PIPELINE_COMPLETE) {
        hook(event);
    }
}

pub(crate) fn notify_filter_doc_loading(event: &mut FilterDocLoadingEvent) {
    for hook in snapshot(&FILTER_DOC_LOADING) {
        hook(event);
    }
}

pub(crate) fn notify_category_doc_loading(event: &mut CategoryDocLoadingEvent) {
    for hook in snapshot(&CATEGORY_DOC_LOADING) {
        hook(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::global_guard;

    #[test]
    fn test_command_loading_fires_in_subscription_order() {
        let _guard = global_guard();
        reset();

        on_command_loading(|e| e.description = Some("first".into()));
        on_command_loading(|e| {
            // The second subscriber observes the first one's rewrite.
            assert_eq!(e.description.as_deref(), Some("first"));
            e.description = Some("second".into());
        });

        let mut event = CommandLoadingEvent {
            category: "text".into(),
            name: "append".into(),
            description: None,
            cancel: false,
        };
        notify_command_loading(&mut event);
        assert_eq!(event.description.as_deref(), Some("second"));
    }

    #[test]
    fn test_qualified_name() {
        let event = CommandLoadingEvent {
            category: "text".into(),
            name: "append".into(),
            description: None,
            cancel: false,
        };
        assert_eq!(event.qualified_name(), "text.append");
    }

    #[test]
    fn test_pipeline_complete_value_rewrite() {
        let _guard = global_guard();
        reset();

        on_pipeline_complete(|e| e.value = Some("rewritten".into()));
        let mut event = PipelineCompleteEvent {
            value: Some("original".into()),
        };
        notify_pipeline_complete(&mut event);
        assert_eq!(event.value.as_deref(), Some("rewritten"));
    }

    #[test]
    fn test_reset_clears_subscribers() {
        let _guard = global_guard();
        reset();

        on_pipeline_complete(|e| e.value = Some("rewritten".into()));
        reset();

        let mut event = PipelineCompleteEvent { value: None };
        notify_pipeline_complete(&mut event);
        assert!(event.value.is_none());
    }
}
