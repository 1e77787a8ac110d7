//! Pipeline instances and the execution driver.
//!
//! A [`Pipeline`] owns an ordered command list, a local variable store
//! (seeded from the process-global store at construction), an execution
//! log, and per-instance hook subscriptions. Executing it drives the
//! label-indexed interpreter loop:
//!
//! 1. run the command-factory expansion pass (retained on the instance),
//! 2. replace any `end`-labeled command with the synthetic terminal
//!    sink,
//! 3. lift `core.label` operands into label fields and link each
//!    command's `send_to_label` to its successor,
//! 4. seed `__global` with the input text,
//! 5. follow the label cursor: pseudo-commands route values between
//!    slots, everything else dispatches through the filter catalog,
//! 6. read `__global`, fire pipeline-complete, return.
//!
//! Control flow is non-linear by construction: the interpreter only
//! ever follows the label currently stored in the command it just ran,
//! and filters may rewrite that label to branch.

use rustc_hash::FxHashMap;
use std::time::Instant;

use crate::command::{
    normalize_label, PipelineCommand, CMD_LABEL, CMD_READ_FROM, CMD_WRITE_TO, END_LABEL,
    GLOBAL_VARIABLE, VARIABLE_SIGIL,
};
use crate::config::PipelineConfig;
use crate::errors::{EngineError, Result};
use crate::hooks::{
    self, FilterExecutedEvent, FilterExecutedHook, FilterExecutingEvent, FilterExecutingHook,
    PipelineCompleteEvent,
};
use crate::pipeline::log::{ExecutionLog, LogEntry};
use crate::registry;
use crate::variables::VariableStore;

/// An executable pipeline: commands, variables, log, and hooks.
///
/// Instances are built by the surface parser or directly through
/// [`add_command`](Self::add_command), executed one or more times, and
/// discarded. One instance must be used by one thread at a time; the
/// catalog it dispatches through is shared and thread-safe.
pub struct Pipeline {
    commands: Vec<PipelineCommand>,
    variables: VariableStore,
    log: ExecutionLog,
    executing_hooks: Vec<FilterExecutingHook>,
    executed_hooks: Vec<FilterExecutedHook>,
    /// The label cursor of the in-flight run, for introspection from
    /// filter code that holds the instance.
    next_label: Option<String>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("commands", &self.commands.len())
            .field("variables", &self.variables.len())
            .field("next_label", &self.next_label)
            .finish()
    }
}

impl Pipeline {
    /// Create an empty pipeline.
    ///
    /// The local store inherits a snapshot of the process-global
    /// variables, then the global pipeline-created hook fires with the
    /// new instance.
    pub fn new() -> Self {
        let mut variables = VariableStore::new();
        variables.inherit_globals();
        let mut pipeline = Self {
            commands: Vec::new(),
            variables,
            log: ExecutionLog::new(),
            executing_hooks: Vec::new(),
            executed_hooks: Vec::new(),
            next_label: None,
        };
        hooks::notify_pipeline_created(&mut pipeline);
        pipeline
    }

    /// Create a pipeline after seeding the process-global store from a
    /// configuration document.
    pub fn with_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        config.apply();
        Ok(Self::new())
    }

    /// Append one command to the queue.
    pub fn add_command(&mut self, command: PipelineCommand) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Append a sequence of commands to the queue.
    pub fn add_commands(&mut self, commands: impl IntoIterator<Item = PipelineCommand>) {
        self.commands.extend(commands);
    }

    /// The current command list (expanded in place after the first
    /// execute).
    pub fn commands(&self) -> &[PipelineCommand] {
        &self.commands
    }

    /// The local variable store.
    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// Mutable access to the local variable store.
    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    /// The execution log of the most recent run.
    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    /// The label the in-flight run will execute next, if a run is in
    /// flight.
    pub fn next_label(&self) -> Option<&str> {
        self.next_label.as_deref()
    }

    /// Subscribe to filter-executing on this instance (fires before each
    /// filter body; input and command are rewritable).
    pub fn on_filter_executing(
        &mut self,
        hook: impl Fn(&mut FilterExecutingEvent<'_>) + Send + Sync + 'static,
    ) {
        self.executing_hooks.push(std::sync::Arc::new(hook));
    }

    /// Subscribe to filter-executed on this instance (fires after each
    /// filter body; output is rewritable).
    pub fn on_filter_executed(
        &mut self,
        hook: impl Fn(&mut FilterExecutedEvent<'_>) + Send + Sync + 'static,
    ) {
        self.executed_hooks.push(std::sync::Arc::new(hook));
    }

    // ─── Execution ──────────────────────────────────────────────────────

    /// Run the pipeline over `input` and return the final value of
    /// `__global`.
    pub fn execute(&mut self, input: Option<&str>) -> Result<String> {
        registry::factory::expand(&mut self.commands);
        self.prepare_queue();
        let index = self.label_index();

        self.log.clear();
        self.variables
            .set(GLOBAL_VARIABLE, input.map(str::to_string), false);

        tracing::debug!(commands = self.commands.len(), "pipeline starting");

        self.next_label = self
            .commands
            .first()
            .map(|c| normalize_label(&c.label));

        while let Some(label) = self.next_label.take() {
            let position = *index
                .get(&label)
                .ok_or_else(|| EngineError::unknown_label(&label))?;
            let mut command = self.commands[position].clone();
            self.step(&mut command)?;
            self.next_label = command.send_to_label.as_deref().map(normalize_label);
            self.commands[position] = command;
        }

        let final_value = self
            .variables
            .lookup(GLOBAL_VARIABLE)
            .and_then(|v| v.value.clone());
        let mut event = PipelineCompleteEvent { value: final_value };
        hooks::notify_pipeline_complete(&mut event);
        tracing::debug!(log_entries = self.log.len(), "pipeline complete");
        Ok(event.value.unwrap_or_default())
    }

    /// Execute one command of the queue.
    fn step(&mut self, command: &mut PipelineCommand) -> Result<()> {
        let name = command.normalized_name();
        match name.as_str() {
            CMD_LABEL => Ok(()),
            CMD_WRITE_TO => self.write_to(command),
            CMD_READ_FROM => self.read_from(command),
            _ => self.dispatch(command),
        }
    }

    /// `core.writeto` — copy the current `__global` into the named slot.
    fn write_to(&mut self, command: &PipelineCommand) -> Result<()> {
        let slot = command
            .operand()
            .unwrap_or(&command.output_variable)
            .to_string();
        let value = self
            .variables
            .get(GLOBAL_VARIABLE, false)
            .map_err(|e| e.annotate(CMD_WRITE_TO, &command.original_text))?;
        self.variables
            .safe_set(&slot, Some(value))
            .map_err(|e| e.annotate(CMD_WRITE_TO, &command.original_text))?;
        Ok(())
    }

    /// `core.readfrom` — copy the named slot into `__global`.
    fn read_from(&mut self, command: &PipelineCommand) -> Result<()> {
        let slot = command
            .operand()
            .unwrap_or(&command.input_variable)
            .to_string();
        let value = self
            .variables
            .get(&slot, true)
            .map_err(|e| e.annotate(CMD_READ_FROM, &command.original_text))?;
        self.variables.set(GLOBAL_VARIABLE, Some(value), false);
        Ok(())
    }

    /// Full filter dispatch for anything that is not a pseudo-command.
    fn dispatch(&mut self, command: &mut PipelineCommand) -> Result<()> {
        let name = command.normalized_name();
        let annotate =
            |e: EngineError, c: &PipelineCommand| e.annotate(c.normalized_name(), &c.original_text);

        let Some(entry) = registry::lookup(&name) else {
            let err = match registry::hidden_reason(&name) {
                Some(reason) => EngineError::command_unavailable(&name, reason),
                None => EngineError::command_missing(&name),
            };
            return Err(annotate(err, command));
        };

        // Resolve $-prefixed argument values against the store now, so
        // late binding works; the unresolved values are restored after
        // the dispatch so the next run re-resolves them.
        let text = command.original_text.clone();
        let unresolved_args = command.args.clone();
        for value in command.args.values_mut() {
            if value.starts_with(VARIABLE_SIGIL) && value.len() > 1 {
                *value = self
                    .variables
                    .get(value, true)
                    .map_err(|e| e.annotate(&name, &text))?;
            }
        }

        let started = Instant::now();
        let mut entry_log = LogEntry::begin(command);
        let mut input = self
            .variables
            .get(&command.input_variable, true)
            .map_err(|e| annotate(e, command))?;

        {
            let mut event = FilterExecutingEvent {
                input: &mut input,
                command: &mut *command,
            };
            for hook in &self.executing_hooks {
                hook(&mut event);
            }
        }

        tracing::trace!(command = %name, "dispatching filter");
        let mut output = match (entry.func)(&input, command, &mut entry_log) {
            Ok(output) => output,
            Err(e) => {
                entry_log.elapsed = started.elapsed();
                entry_log.success = false;
                self.log.push(entry_log);
                return Err(annotate(e, command));
            }
        };

        {
            let mut event = FilterExecutedEvent {
                output: &mut output,
                command: &*command,
            };
            for hook in &self.executed_hooks {
                hook(&mut event);
            }
        }

        if command.append_to_output && self.variables.is_set(&command.output_variable) {
            let current = self
                .variables
                .get(&command.output_variable, false)
                .map_err(|e| annotate(e, command))?;
            output = format!("{current}{output}");
        }

        if let Err(e) = self
            .variables
            .safe_set(&command.output_variable, Some(output))
        {
            entry_log.elapsed = started.elapsed();
            entry_log.success = false;
            self.log.push(entry_log);
            return Err(annotate(e, command));
        }

        entry_log.elapsed = started.elapsed();
        entry_log.success = true;
        self.log.push(entry_log);
        command.args = unresolved_args;
        Ok(())
    }

    // ─── Queue preparation ──────────────────────────────────────────────

    /// Guarantee the terminal sink, lift label operands, and link each
    /// command to its successor.
    fn prepare_queue(&mut self) {
        self.commands
            .retain(|c| normalize_label(&c.label) != END_LABEL);
        self.commands.push(
            PipelineCommand::new(CMD_LABEL)
                .with_arg(0, END_LABEL)
                .with_label(END_LABEL)
                .with_text("Label end"),
        );

        for command in &mut self.commands {
            if command.normalized_name() == CMD_LABEL {
                if let Some(operand) = command.operand().map(str::to_string) {
                    command.label = operand;
                }
            }
        }

        for position in 0..self.commands.len() - 1 {
            if self.commands[position].send_to_label.is_none() {
                let successor = self.commands[position + 1].label.clone();
                self.commands[position].send_to_label = Some(successor);
            }
        }
    }

    /// Index the queue by lowercased label. Later commands win a
    /// duplicated label; within one pipeline labels are expected unique.
    fn label_index(&self) -> FxHashMap<String, usize> {
        let mut index = FxHashMap::default();
        for (position, command) in self.commands.iter().enumerate() {
            index.insert(normalize_label(&command.label), position);
        }
        index
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{add_filter, FilterFn};
    use crate::test_support::global_guard;
    use std::sync::Arc;

    fn appender() -> FilterFn {
        Arc::new(|input, cmd, _log| {
            let suffix = cmd.positional(0).unwrap_or_default();
            Ok(format!("{input}{suffix}"))
        })
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        let mut pipeline = Pipeline::new();
        assert_eq!(pipeline.execute(Some("payload")).unwrap(), "payload");
        assert_eq!(pipeline.execute(None).unwrap(), "");
    }

    #[test]
    fn test_single_filter_dispatch() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        add_filter(appender(), "text", "append", None);
        let mut pipeline = Pipeline::new();
        pipeline.add_command(
            PipelineCommand::new("Text.Append")
                .with_arg(0, "BAR")
                .with_text("Text.Append BAR"),
        );

        assert_eq!(pipeline.execute(Some("FOO")).unwrap(), "FOOBAR");
        assert_eq!(pipeline.log().len(), 1);
        let entry = pipeline.log().last().unwrap();
        assert!(entry.success);
        assert_eq!(entry.command_name, "text.append");
        assert_eq!(entry.command_text, "Text.Append BAR");
    }

    #[test]
    fn test_log_cleared_between_runs() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        add_filter(appender(), "text", "append", None);
        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new("text.append").with_arg(0, "!"));

        pipeline.execute(Some("a")).unwrap();
        pipeline.execute(Some("b")).unwrap();
        assert_eq!(pipeline.log().len(), 1);
    }

    #[test]
    fn test_missing_command_fails() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new("no.such").with_text("No.Such"));

        let err = pipeline.execute(Some("x")).unwrap_err();
        assert!(matches!(err.root(), EngineError::CommandMissing { .. }));
        assert!(err.to_string().contains("No.Such"));
    }

    #[test]
    fn test_unknown_label_fails_by_name() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new("core.label").with_send_to("nowhere"));

        let err = pipeline.execute(None).unwrap_err();
        match err.root() {
            EngineError::UnknownLabel { label } => assert_eq!(label, "nowhere"),
            other => panic!("expected UnknownLabel, got {other:?}"),
        }
    }

    #[test]
    fn test_write_to_and_read_from_route_values() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        add_filter(appender(), "text", "append", None);
        let mut pipeline = Pipeline::new();
        // Stash the input, transform the global slot, then restore the
        // stashed copy.
        pipeline.add_command(PipelineCommand::new("core.writeto").with_arg(0, "stash"));
        pipeline.add_command(PipelineCommand::new("text.append").with_arg(0, "-changed"));
        pipeline.add_command(PipelineCommand::new("core.readfrom").with_arg(0, "stash"));

        assert_eq!(pipeline.execute(Some("original")).unwrap(), "original");
        assert_eq!(
            pipeline.variables().get("stash", false).unwrap(),
            "original"
        );
    }

    #[test]
    fn test_append_to_output_prepends_current_contents() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        add_filter(appender(), "text", "append", None);
        let mut pipeline = Pipeline::new();
        pipeline.add_command(
            PipelineCommand::new("text.append")
                .with_arg(0, "B")
                .with_input("seed")
                .with_output("acc"),
        );
        pipeline.add_command(
            PipelineCommand::new("text.append")
                .with_arg(0, "C")
                .with_input("seed")
                .with_output("acc")
                .with_append(),
        );
        pipeline.variables_mut().set("seed", Some("A".into()), false);

        pipeline.execute(None).unwrap();
        assert_eq!(pipeline.variables().get("acc", false).unwrap(), "ABAC");
    }

    #[test]
    fn test_variable_reference_arguments_resolve_late() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        add_filter(appender(), "text", "append", None);
        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new("text.append").with_arg(0, "$suffix"));

        pipeline
            .variables_mut()
            .set("suffix", Some("-one".into()), false);
        assert_eq!(pipeline.execute(Some("x")).unwrap(), "x-one");

        // Late binding: the same instance re-resolves on the next run.
        pipeline
            .variables_mut()
            .set("suffix", Some("-two".into()), false);
        assert_eq!(pipeline.execute(Some("x")).unwrap(), "x-two");
    }

    #[test]
    fn test_unresolved_variable_reference_fails() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        add_filter(appender(), "text", "append", None);
        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new("text.append").with_arg(0, "$ghost"));

        let err = pipeline.execute(Some("x")).unwrap_err();
        assert!(matches!(err.root(), EngineError::UnknownVariable { .. }));
    }

    #[test]
    fn test_read_only_output_slot_fails() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        add_filter(appender(), "text", "append", None);
        let mut pipeline = Pipeline::new();
        pipeline
            .variables_mut()
            .set("locked", Some("fixed".into()), true);
        pipeline.add_command(
            PipelineCommand::new("text.append")
                .with_arg(0, "!")
                .with_output("locked"),
        );

        let err = pipeline.execute(Some("x")).unwrap_err();
        assert!(err.is_read_only_violation());
        // The failed dispatch is still logged.
        assert_eq!(pipeline.log().len(), 1);
        assert!(!pipeline.log().last().unwrap().success);
    }

    #[test]
    fn test_filter_branching_via_send_to_label() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        add_filter(appender(), "text", "append", None);
        let jump: FilterFn = Arc::new(|input, cmd, _log| {
            // Branch straight to the end, skipping everything between.
            cmd.send_to_label = Some(END_LABEL.to_string());
            Ok(input.to_string())
        });
        add_filter(jump, "flow", "skip", None);

        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new("flow.skip"));
        pipeline.add_command(PipelineCommand::new("text.append").with_arg(0, "-unreachable"));

        assert_eq!(pipeline.execute(Some("x")).unwrap(), "x");
        // Only the jump filter ran.
        assert_eq!(pipeline.log().len(), 1);
        assert_eq!(pipeline.log().last().unwrap().command_name, "flow.skip");
    }

    #[test]
    fn test_label_loop_executes_until_redirect() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        // A counting filter that loops back to "top" twice, then falls
        // through to the end.
        let counter: FilterFn = Arc::new(|input, cmd, log| {
            let next = format!("{input}*");
            if next.len() < 3 {
                cmd.send_to_label = Some("top".to_string());
            } else {
                cmd.send_to_label = Some(END_LABEL.to_string());
                log.note("loop finished");
            }
            Ok(next)
        });
        add_filter(counter, "flow", "grow", None);

        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new("core.label").with_arg(0, "top"));
        pipeline.add_command(PipelineCommand::new("flow.grow"));

        assert_eq!(pipeline.execute(None).unwrap(), "***");
        assert_eq!(pipeline.log().len(), 3);
        assert_eq!(pipeline.log().last().unwrap().notes, vec!["loop finished"]);
    }

    #[test]
    fn test_filter_executing_hook_rewrites_input() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        add_filter(appender(), "text", "append", None);
        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new("text.append").with_arg(0, "!"));
        pipeline.on_filter_executing(|e| {
            *e.input = e.input.to_uppercase();
        });

        assert_eq!(pipeline.execute(Some("shout")).unwrap(), "SHOUT!");
    }

    #[test]
    fn test_filter_executed_hook_rewrites_output() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        add_filter(appender(), "text", "append", None);
        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new("text.append").with_arg(0, "!"));
        pipeline.on_filter_executed(|e| {
            *e.output = format!("[{}]", e.output);
        });

        assert_eq!(pipeline.execute(Some("x")).unwrap(), "[x!]");
    }

    #[test]
    fn test_filter_failure_is_annotated() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        let failing: FilterFn =
            Arc::new(|_, _, _| Err(EngineError::unknown_variable("inner")));
        add_filter(failing, "bad", "filter", None);

        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new("Bad.Filter").with_text("Bad.Filter raw"));

        let err = pipeline.execute(Some("x")).unwrap_err();
        match &err {
            EngineError::FilterFailure { name, text, .. } => {
                assert_eq!(name, "bad.filter");
                assert_eq!(text, "Bad.Filter raw");
            }
            other => panic!("expected FilterFailure, got {other:?}"),
        }
        assert!(matches!(err.root(), EngineError::UnknownVariable { .. }));
    }

    #[test]
    fn test_external_filter_error_propagates_unwrapped() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        let failing: FilterFn = Arc::new(|_, _, _| {
            Err(EngineError::external(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk on fire",
            )))
        });
        add_filter(failing, "bad", "io", None);

        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new("bad.io"));

        let err = pipeline.execute(Some("x")).unwrap_err();
        assert!(matches!(err, EngineError::External(_)));
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn test_expanded_list_is_retained() {
        let _guard = global_guard();
        crate::registry::reset();
        crate::hooks::reset();
        crate::variables::clear_globals();

        add_filter(appender(), "text", "append", None);
        registry::register_factory("macros.shout", |_| {
            vec![
                PipelineCommand::new("text.append").with_arg(0, "!"),
                PipelineCommand::new("text.append").with_arg(0, "!"),
            ]
        });

        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new("Macros.Shout").with_text("Macros.Shout"));

        assert_eq!(pipeline.execute(Some("hey")).unwrap(), "hey!!");
        // The instance now carries the expanded list (plus the terminal
        // sink), and re-running it is stable.
        let names: Vec<String> = pipeline
            .commands()
            .iter()
            .map(|c| c.normalized_name())
            .collect();
        assert_eq!(names, vec!["text.append", "text.append", "core.label"]);
        assert_eq!(
            pipeline.commands()[0].factory_source.as_deref(),
            Some("Macros.Shout")
        );
        assert_eq!(pipeline.execute(Some("hey")).unwrap(), "hey!!");
    }
}
