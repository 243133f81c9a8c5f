//! Macro runner
//!
//! Runs the executor on its own thread so the caller (GUI, CLI signal
//! handler) can request a stop while the macro blocks in waits.

use super::{ExecutionOutcome, MacroArgs, MacroExecutor};
use crate::cancel::CancellationToken;
use crate::command::{Command, SharedCommand};
use crate::{MacroError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Owner of the macro-execution thread
pub struct MacroRunner {
    executor: Arc<Mutex<MacroExecutor>>,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Worker thread handle
    worker: Option<JoinHandle<Result<ExecutionOutcome>>>,
    /// Token of the command driving the current run
    token: Option<CancellationToken>,
}

impl MacroRunner {
    pub fn new(executor: MacroExecutor) -> Self {
        Self {
            executor: Arc::new(Mutex::new(executor)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            token: None,
        }
    }

    /// The executor; locked by the worker for the duration of a run
    pub fn executor(&self) -> &Arc<Mutex<MacroExecutor>> {
        &self.executor
    }

    /// Select `name` and execute it on a new thread
    ///
    /// Clears the command's cancellation token first. Fails with
    /// `AlreadyRunning` while a previous run is in progress.
    pub fn start(&mut self, name: &str, cmd: SharedCommand, args: MacroArgs) -> Result<()> {
        if self.is_running() {
            return Err(MacroError::AlreadyRunning);
        }
        if let Some(previous) = self.join() {
            log::debug!("Previous macro run ended with {:?}", previous);
        }

        let token = cmd.cancellation().clone();
        token.clear();
        self.running.store(true, Ordering::SeqCst);

        let executor = self.executor.clone();
        let running = self.running.clone();
        let macro_name = name.to_string();

        let spawned = thread::Builder::new()
            .name(format!("macro-{}", name))
            .spawn(move || {
                let result = {
                    let mut executor = executor.lock();
                    executor
                        .select(&macro_name)
                        .and_then(|_| executor.execute(&cmd, &args))
                };
                running.store(false, Ordering::SeqCst);
                result
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                self.token = Some(token);
                log::info!("Macro runner started '{}'", name);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Request a stop and wait for the run to finish
    pub fn stop(&mut self) -> Option<Result<ExecutionOutcome>> {
        if let Some(token) = &self.token {
            token.request_stop();
        }
        let result = self.join();
        if result.is_some() {
            log::info!("Macro runner stopped");
        }
        result
    }

    /// Wait for the current run; `None` if nothing was started
    pub fn join(&mut self) -> Option<Result<ExecutionOutcome>> {
        let handle = self.worker.take()?;
        self.token = None;
        let result = match handle.join() {
            Ok(result) => result,
            Err(_) => Err(MacroError::Execution("macro thread panicked".to_string())),
        };
        self.running.store(false, Ordering::SeqCst);
        Some(result)
    }

    /// Check if a macro is executing
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for MacroRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
