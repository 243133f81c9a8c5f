//! Macro lifecycle
//!
//! Macros implement the `Macro` trait and are created on demand by a
//! `MacroFactory`. The `MacroRegistry` holds the factories, the
//! `MacroExecutor` drives one selected macro through
//! initialize → run → finalize, and the `MacroRunner` does that on a
//! dedicated thread so the caller stays responsive.

mod executor;
mod registry;
mod runner;
#[cfg(feature = "rhai-scripting")]
pub mod script;

pub use crate::settings::MacroArgs;
pub use executor::{ExecutionOutcome, ExecutorState, MacroExecutor};
pub use registry::{MacroFactory, MacroRegistry};
pub use runner::MacroRunner;
#[cfg(feature = "rhai-scripting")]
pub use script::{ScriptMacro, ScriptMacroFactory, SCRIPT_EXTENSION};

use crate::command::SharedCommand;
use crate::Result;

/// An automation routine
///
/// `finalize` runs exactly once per execution whatever `initialize` and
/// `run` returned, so it is the place to release held buttons.
pub trait Macro: Send {
    /// Prepare the run with the merged persisted and caller arguments
    fn initialize(&mut self, cmd: &SharedCommand, args: &MacroArgs) -> Result<()>;

    /// Main body
    fn run(&mut self, cmd: &SharedCommand) -> Result<()>;

    /// Clean up after `run`, even when it failed or was stopped
    fn finalize(&mut self, cmd: &SharedCommand) -> Result<()>;

    fn description(&self) -> String {
        String::new()
    }

    fn tags(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Boxed macro type
pub type BoxedMacro = Box<dyn Macro>;
