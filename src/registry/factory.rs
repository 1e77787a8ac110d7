//! Command factories — macro-style rewrite of the command list.
//!
//! A factory pairs a wildcard pattern (`*` matches any run of
//! characters, `?` matches exactly one) with a function that turns one
//! matched command into a replacement sequence. Patterns match against
//! the normalized qualified name, so matching is case-insensitive.
//!
//! Expansion walks the command list with a mutable index. The first
//! factory whose pattern matches the current command wins; the match is
//! removed, its emissions are inserted in its place, and the index does
//! *not* advance, so emitted commands are themselves subject to
//! expansion. A full walk therefore reaches a fixed point — unless a
//! factory emits a command matching its own pattern, which recurses
//! without bound and is the caller's responsibility to avoid.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::{Arc, RwLock};

use crate::command::PipelineCommand;

/// A factory function: one matched command in, its replacements out.
pub type FactoryFn = Arc<dyn Fn(&PipelineCommand) -> Vec<PipelineCommand> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct CommandFactory {
    pattern: String,
    matcher: Regex,
    func: FactoryFn,
}

impl std::fmt::Debug for CommandFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandFactory")
            .field("pattern", &self.pattern)
            .finish()
    }
}

static FACTORIES: Lazy<RwLock<Vec<CommandFactory>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// Compile a wildcard pattern to an anchored regex over normalized
/// names.
fn compile_wildcard(pattern: &str) -> Regex {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for c in pattern.to_lowercase().chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            c => source.push_str(&regex::escape(&c.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).expect("wildcard patterns always compile")
}

/// Register a command factory under a wildcard pattern.
///
/// Factories are consulted in registration order; the first match wins.
pub fn register_factory(
    pattern: &str,
    func: impl Fn(&PipelineCommand) -> Vec<PipelineCommand> + Send + Sync + 'static,
) {
    let factory = CommandFactory {
        matcher: compile_wildcard(pattern),
        pattern: pattern.to_string(),
        func: Arc::new(func),
    };
    tracing::debug!(pattern = %factory.pattern, "command factory registered");
    FACTORIES
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .push(factory);
}

pub(crate) fn clear() {
    FACTORIES
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .clear();
}

/// Run the expansion pass over a command list, in place.
///
/// Idempotent once a fixed point is reached: a list containing no
/// factory-matched names is left untouched.
pub(crate) fn expand(commands: &mut Vec<PipelineCommand>) {
    let factories: Vec<CommandFactory> = FACTORIES
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    if factories.is_empty() {
        return;
    }

    let mut index = 0;
    while index < commands.len() {
        let key = commands[index].normalized_name();
        let matched = factories.iter().find(|f| f.matcher.is_match(&key));
        let Some(factory) = matched else {
            index += 1;
            continue;
        };

        let source = commands.remove(index);
        tracing::debug!(
            pattern = %factory.pattern,
            command = %key,
            "expanding command through factory"
        );
        let mut emitted = (factory.func)(&source);
        for command in &mut emitted {
            command.factory_source = Some(source.original_text.clone());
        }
        for (offset, command) in emitted.into_iter().enumerate() {
            commands.insert(index + offset, command);
        }
        // The index stays put: emitted commands are expandable too.
    }
}
