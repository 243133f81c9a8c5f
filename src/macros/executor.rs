//! Selection and guarded execution of one macro

use super::{BoxedMacro, Macro, MacroArgs, MacroRegistry};
use crate::command::SharedCommand;
use crate::settings::{load_macro_settings, merge_args};
use crate::{MacroError, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

/// Lifecycle position of the executor
///
/// `Completed`, `Stopped` and `Failed` describe the last run and persist
/// until the next `execute`, `select` or `reset`. The selection survives a
/// run, so the same macro can be executed again straight away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Selected,
    Running,
    Completed,
    Stopped,
    Failed,
}

/// How a successful `execute` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// `run` returned normally
    Completed,
    /// `run` was interrupted by a stop request
    Stopped,
}

/// Drives the selected macro through initialize → run → finalize
pub struct MacroExecutor {
    registry: MacroRegistry,
    selected: Option<String>,
    state: ExecutorState,
    static_dir: Option<PathBuf>,
}

impl MacroExecutor {
    pub fn new(registry: MacroRegistry) -> Self {
        Self {
            registry,
            selected: None,
            state: ExecutorState::Idle,
            static_dir: None,
        }
    }

    /// Load persisted per-macro settings from `<dir>/<macro>/settings.toml`
    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }

    pub fn static_dir(&self) -> Option<&Path> {
        self.static_dir.as_deref()
    }

    pub fn registry(&self) -> &MacroRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut MacroRegistry {
        &mut self.registry
    }

    /// Rebuild the discovered macros; the selection is dropped if its macro
    /// disappeared
    pub fn reload(&mut self) -> Result<usize> {
        let count = self.registry.reload()?;
        if let Some(name) = &self.selected {
            if !self.registry.has_macro(name) {
                log::warn!("[MacroExecutor] Selected macro '{}' no longer exists", name);
                self.selected = None;
                self.state = ExecutorState::Idle;
            }
        }
        Ok(count)
    }

    pub fn macro_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Drop the selection and return to `Idle`
    pub fn reset(&mut self) {
        if let Some(name) = self.selected.take() {
            log::debug!("[MacroExecutor] Cleared selection of '{}'", name);
        }
        self.state = ExecutorState::Idle;
    }

    /// Select the macro to execute next
    pub fn select(&mut self, name: &str) -> Result<()> {
        if !self.registry.has_macro(name) {
            return Err(MacroError::MacroNotFound {
                name: name.to_string(),
                available: self.registry.names(),
            });
        }
        self.selected = Some(name.to_string());
        self.state = ExecutorState::Selected;
        log::info!("[MacroExecutor] Selected macro '{}'", name);
        Ok(())
    }

    /// Run the selected macro to completion
    ///
    /// `args` override persisted settings key by key. A stop request ends
    /// the run with `ExecutionOutcome::Stopped` rather than an error.
    /// Once an instance exists, `finalize` is called exactly once.
    pub fn execute(&mut self, cmd: &SharedCommand, args: &MacroArgs) -> Result<ExecutionOutcome> {
        let name = self.selected.clone().ok_or(MacroError::NoMacroSelected)?;

        let mut instance = match self.registry.create(&name) {
            Ok(instance) => instance,
            Err(e) => {
                log::error!("[MacroExecutor] Could not create macro '{}': {}", name, e);
                self.state = ExecutorState::Failed;
                return Err(e);
            }
        };

        self.state = ExecutorState::Running;
        log::info!("[MacroExecutor] Executing macro '{}'", name);
        cmd.set_caller(Some(name.as_str()));

        let static_dir = self.static_dir.clone();
        let run_result = guarded("initialize/run", || {
            let persisted = match &static_dir {
                Some(dir) => load_macro_settings(dir, &name)?,
                None => MacroArgs::new(),
            };
            let merged = merge_args(&persisted, args);
            instance.initialize(cmd, &merged)?;
            instance.run(cmd)
        });
        let finalize_result = finalize(&mut instance, cmd);
        cmd.set_caller(None);

        let outcome = match run_result {
            Ok(()) => {
                log::info!("[MacroExecutor] Macro '{}' completed", name);
                Ok(ExecutionOutcome::Completed)
            }
            Err(e) if e.is_stop() => {
                log::warn!("[MacroExecutor] Macro '{}' stopped", name);
                Ok(ExecutionOutcome::Stopped)
            }
            Err(e) => {
                log::error!("[MacroExecutor] Macro '{}' failed: {}", name, e);
                Err(e)
            }
        };

        let outcome = match (outcome, finalize_result) {
            (Ok(_), Err(e)) => Err(e),
            (outcome, _) => outcome,
        };

        self.state = match &outcome {
            Ok(ExecutionOutcome::Completed) => ExecutorState::Completed,
            Ok(ExecutionOutcome::Stopped) => ExecutorState::Stopped,
            Err(_) => ExecutorState::Failed,
        };
        outcome
    }
}

fn finalize(instance: &mut BoxedMacro, cmd: &SharedCommand) -> Result<()> {
    match guarded("finalize", || instance.finalize(cmd)) {
        // Still latched from the run; cleanup is best effort
        Err(e) if e.is_stop() => {
            log::debug!("[MacroExecutor] finalize interrupted by pending stop");
            Ok(())
        }
        Err(e) => {
            log::error!("[MacroExecutor] finalize failed: {}", e);
            Err(e)
        }
        Ok(()) => Ok(()),
    }
}

/// Run `f`, turning a panic into an `Execution` error
fn guarded<F>(stage: &str, f: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(MacroError::Execution(format!(
            "panic during {}: {}",
            stage,
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
