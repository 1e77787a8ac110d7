//! Command records and name normalization
//!
//! A [`PipelineCommand`] is the parsed unit of work produced by the
//! surface-syntax parser (external to this crate): a qualified filter
//! name, an argument map, input/output variable slots, an append flag,
//! and the label plumbing that drives non-linear control flow.
//!
//! All registry and queue lookups go through the normalization helpers
//! defined here: qualified names are lowercased with non-alphanumerics
//! stripped per segment, and variable names are lowercased with a
//! leading `$` removed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Reserved names
// ============================================================================

/// The implicit current-text variable slot.
pub const GLOBAL_VARIABLE: &str = "__global";

/// The reserved label of the terminal sink command.
pub const END_LABEL: &str = "end";

/// Built-in label pseudo-command.
pub const CMD_LABEL: &str = "core.label";

/// Built-in pseudo-command copying a named slot into `__global`.
pub const CMD_READ_FROM: &str = "core.readfrom";

/// Built-in pseudo-command copying `__global` into a named slot.
pub const CMD_WRITE_TO: &str = "core.writeto";

/// Reserved for script inclusion, which is handled by the surface
/// parser before a command list reaches the engine.
pub const CMD_INCLUDE: &str = "core.include";

/// The sigil marking an argument value as a variable reference.
pub const VARIABLE_SIGIL: char = '$';

// ============================================================================
// Normalization
// ============================================================================

/// Normalize a qualified name for registry and dispatch lookups.
///
/// Each dot-separated segment is lowercased and stripped of
/// non-alphanumeric characters: `"Text.Append-2"` becomes
/// `"text.append2"`.
pub fn normalize_name(name: &str) -> String {
    name.split('.')
        .map(|segment| {
            segment
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .map(|c| c.to_ascii_lowercase())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Normalize a variable name: strip one leading `$`, lowercase.
///
/// Every store lookup and every store write applies this transform, so
/// `get("$Name")`, `get("Name")`, and `get("name")` address the same
/// slot.
pub fn normalize_variable(name: &str) -> String {
    name.strip_prefix(VARIABLE_SIGIL)
        .unwrap_or(name)
        .to_lowercase()
}

/// Normalize a label for queue indexing (labels are case-insensitive).
pub fn normalize_label(label: &str) -> String {
    label.to_lowercase()
}

static NEXT_LABEL: AtomicU64 = AtomicU64::new(0);

/// Produce a unique synthetic label for a command that carries none.
fn synthetic_label() -> String {
    format!("__cmd{}", NEXT_LABEL.fetch_add(1, Ordering::Relaxed))
}

// ============================================================================
// Argument keys
// ============================================================================

/// The key of a command argument: positional index or explicit name.
///
/// Keys render as plain strings (`"0"`, `"times"`) so argument maps
/// serialize as ordinary JSON objects; an all-digit key is always
/// positional.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ArgKey {
    /// A positional argument (`arg1 arg2 …`), zero-indexed.
    Positional(usize),
    /// A named argument; names are stored lowercased.
    Named(String),
}

impl From<usize> for ArgKey {
    fn from(index: usize) -> Self {
        ArgKey::Positional(index)
    }
}

impl From<String> for ArgKey {
    fn from(raw: String) -> Self {
        match raw.parse::<usize>() {
            Ok(index) => ArgKey::Positional(index),
            Err(_) => ArgKey::Named(raw.to_lowercase()),
        }
    }
}

impl From<&str> for ArgKey {
    fn from(raw: &str) -> Self {
        ArgKey::from(raw.to_string())
    }
}

impl From<ArgKey> for String {
    fn from(key: ArgKey) -> String {
        match key {
            ArgKey::Positional(index) => index.to_string(),
            ArgKey::Named(name) => name,
        }
    }
}

// ============================================================================
// PipelineCommand
// ============================================================================

/// One invocation of a named filter: the parsed unit of work.
///
/// Constructed by the surface parser or directly through the builder
/// methods. Argument values beginning with `$` denote variable
/// references resolved at dispatch time, not at parse time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineCommand {
    /// Qualified `Category.Name`; lookups use [`normalize_name`].
    pub qualified_name: String,

    /// Positional and named argument values, in key order.
    pub args: BTreeMap<ArgKey, String>,

    /// The variable slot read as filter input. Defaults to `__global`.
    pub input_variable: String,

    /// The variable slot the filter output is written to. Defaults to
    /// `__global`.
    pub output_variable: String,

    /// When `true`, the output slot's current contents are prepended to
    /// the filter output instead of being replaced.
    pub append_to_output: bool,

    /// The label addressing this command in the execution queue.
    pub label: String,

    /// The label of the command to run next; `None` terminates the
    /// pipeline. Filters may rewrite this to branch.
    pub send_to_label: Option<String>,

    /// The source text this command was parsed from, for logging.
    pub original_text: String,

    /// The source text of the factory-matched command this one was
    /// emitted from, if any.
    pub factory_source: Option<String>,
}

impl PipelineCommand {
    /// Create a command invoking `qualified_name` with no arguments and
    /// default slots.
    pub fn new(qualified_name: impl Into<String>) -> Self {
        let qualified_name = qualified_name.into();
        Self {
            original_text: qualified_name.clone(),
            qualified_name,
            args: BTreeMap::new(),
            input_variable: GLOBAL_VARIABLE.to_string(),
            output_variable: GLOBAL_VARIABLE.to_string(),
            append_to_output: false,
            label: synthetic_label(),
            send_to_label: None,
            factory_source: None,
        }
    }

    /// Add or replace an argument.
    pub fn with_arg(mut self, key: impl Into<ArgKey>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Set the input variable slot.
    pub fn with_input(mut self, variable: impl Into<String>) -> Self {
        self.input_variable = variable.into();
        self
    }

    /// Set the output variable slot.
    pub fn with_output(mut self, variable: impl Into<String>) -> Self {
        self.output_variable = variable.into();
        self
    }

    /// Mark the output as appending rather than replacing.
    pub fn with_append(mut self) -> Self {
        self.append_to_output = true;
        self
    }

    /// Set the command's label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the label of the command to run next.
    pub fn with_send_to(mut self, label: impl Into<String>) -> Self {
        self.send_to_label = Some(label.into());
        self
    }

    /// Set the originating source text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.original_text = text.into();
        self
    }

    /// The normalized form of the qualified name, as used for registry
    /// and dispatch lookups.
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.qualified_name)
    }

    /// Fetch a positional argument value.
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.args
            .get(&ArgKey::Positional(index))
            .map(String::as_str)
    }

    /// Fetch a named argument value (name matching is case-insensitive).
    pub fn named(&self, name: &str) -> Option<&str> {
        self.args
            .get(&ArgKey::Named(name.to_lowercase()))
            .map(String::as_str)
    }

    /// The operand of a pseudo-command: positional argument 0 when
    /// present, used by `core.label`, `core.readfrom`, and
    /// `core.writeto` to name a label or variable slot.
    pub(crate) fn operand(&self) -> Option<&str> {
        self.positional(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name_lowercases_and_strips() {
        assert_eq!(normalize_name("Text.Append"), "text.append");
        assert_eq!(normalize_name("Text.Append-2"), "text.append2");
        assert_eq!(normalize_name("HTML.Strip_Tags"), "html.striptags");
        assert_eq!(normalize_name("core.label"), "core.label");
    }

    #[test]
    fn test_normalize_variable() {
        assert_eq!(normalize_variable("$Name"), "name");
        assert_eq!(normalize_variable("Name"), "name");
        assert_eq!(normalize_variable("__GLOBAL"), "__global");
        // Only one sigil is stripped
        assert_eq!(normalize_variable("$$name"), "$name");
    }

    #[test]
    fn test_synthetic_labels_are_unique() {
        let a = PipelineCommand::new("Text.Append");
        let b = PipelineCommand::new("Text.Append");
        assert_ne!(a.label, b.label);
    }

    #[test]
    fn test_builder_round_trip() {
        let cmd = PipelineCommand::new("Text.Append")
            .with_arg(0, "BAR")
            .with_arg("times", "3")
            .with_input("source")
            .with_output("result")
            .with_append()
            .with_label("start")
            .with_send_to("finish")
            .with_text("Text.Append BAR times=3");

        assert_eq!(cmd.normalized_name(), "text.append");
        assert_eq!(cmd.positional(0), Some("BAR"));
        assert_eq!(cmd.named("Times"), Some("3"));
        assert_eq!(cmd.input_variable, "source");
        assert_eq!(cmd.output_variable, "result");
        assert!(cmd.append_to_output);
        assert_eq!(cmd.label, "start");
        assert_eq!(cmd.send_to_label.as_deref(), Some("finish"));
        assert_eq!(cmd.original_text, "Text.Append BAR times=3");
    }

    #[test]
    fn test_defaults() {
        let cmd = PipelineCommand::new("Text.Trim");
        assert_eq!(cmd.input_variable, GLOBAL_VARIABLE);
        assert_eq!(cmd.output_variable, GLOBAL_VARIABLE);
        assert!(!cmd.append_to_output);
        assert!(cmd.send_to_label.is_none());
        assert_eq!(cmd.original_text, "Text.Trim");
    }

    #[test]
    fn test_serde_round_trip() {
        let cmd = PipelineCommand::new("Text.Append")
            .with_arg(0, "$suffix")
            .with_label("a");
        let json = serde_json::to_string(&cmd).unwrap();
        let back: PipelineCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back.qualified_name, cmd.qualified_name);
        assert_eq!(back.positional(0), Some("$suffix"));
        assert_eq!(back.label, "a");
    }
}
