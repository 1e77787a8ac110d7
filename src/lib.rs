//! # textpipe
//!
//! An embedded interpreter for textual filter pipelines.
//!
//! A pipeline is an ordered list of commands, each naming a filter in a
//! process-global catalog, that transforms a string value as it flows
//! from command to command. The engine binds each command to its
//! registered filter, expands macro-style command factories, and drives
//! a label-indexed interpreter loop to produce a final string.
//!
//! ## Features
//!
//! - **Dynamic filter catalog**: filters register under qualified
//!   `category.name` keys, with override-on-re-registration and
//!   hidden-command records for names that failed to load or were
//!   removed
//! - **Labeled control flow**: commands address each other by label, and
//!   filters branch by rewriting the next-label cursor
//! - **Command factories**: wildcard-matched rewrite rules expand one
//!   command into a sequence before execution
//! - **Variable routing**: named slots with read-only protection, a
//!   process-global store, and `$name` references resolved at dispatch
//!   time
//! - **Lifecycle hooks**: nine events across registration, execution,
//!   and variable access, each carrying a mutable record
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use textpipe::{registry, Pipeline, PipelineCommand};
//!
//! registry::add_filter(
//!     Arc::new(|input, cmd, _log| {
//!         Ok(format!("{input}{}", cmd.positional(0).unwrap_or_default()))
//!     }),
//!     "Text",
//!     "Append",
//!     Some("Appends the first argument to the input"),
//! );
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.add_command(PipelineCommand::new("Text.Append").with_arg(0, "BAR"));
//! assert_eq!(pipeline.execute(Some("FOO")).unwrap(), "FOOBAR");
//! ```

pub mod command;
pub mod config;
pub mod errors;
pub mod hooks;
pub mod pipeline;
pub mod registry;
pub mod variables;

// Re-export commonly used types
pub use command::{
    normalize_name, normalize_variable, ArgKey, PipelineCommand, CMD_INCLUDE, CMD_LABEL,
    CMD_READ_FROM, CMD_WRITE_TO, END_LABEL, GLOBAL_VARIABLE,
};
pub use config::{ConfigVariable, PipelineConfig};
pub use errors::{EngineError, Result};
pub use pipeline::{ExecutionLog, LogEntry, Pipeline};
pub use registry::{FilterAnnotation, FilterBundle, FilterEntry, FilterFn, FilterMethod};
pub use variables::{PipelineVariable, VariableStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared serialization for unit tests that touch process-global
    //! state (the catalog, global hooks, global variables).

    use once_cell::sync::Lazy;
    use std::sync::{Mutex, MutexGuard};

    static GLOBAL_STATE: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    /// Serialize tests that mutate process-global state. Callers must
    /// establish the state they need after acquiring the guard.
    pub fn global_guard() -> MutexGuard<'static, ()> {
        GLOBAL_STATE.lock().unwrap_or_else(|e| e.into_inner())
    }
}
