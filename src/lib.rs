//! NYA Core Macro
//!
//! Controller-emulator macro engine. Macros drive a serial controller
//! emulator (CH552 binary frames or PokeCon text lines) while a background
//! thread keeps the latest frame of a capture source ready for inspection.
//!
//! The layers, bottom-up:
//! - [`input`] and [`protocol`]: keys and their wire encodings
//! - [`hardware`]: serial and capture device registries, static resources
//! - [`command`]: the operation surface macros call
//! - [`macros`]: discovery, the initialize/run/finalize lifecycle and the
//!   execution thread
//!
//! ```no_run
//! use nyacore_macro::{
//!     create_protocol, CancellationToken, DefaultCommand, Hardware, MacroExecutor,
//!     MacroRegistry, SessionConfig, SharedCommand,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> nyacore_macro::Result<()> {
//! let config = SessionConfig::load("session.toml".as_ref())?;
//! let hardware = Hardware::new();
//! hardware.connect(&config)?;
//!
//! let cmd: SharedCommand = Arc::new(DefaultCommand::new(
//!     hardware,
//!     create_protocol(&config.serial_protocol),
//!     CancellationToken::new(),
//! ));
//!
//! let mut registry = MacroRegistry::new();
//! registry.discover(&config.macros_dir)?;
//! let mut executor = MacroExecutor::new(registry);
//! executor.select("DailyFarm")?;
//! executor.execute(&cmd, &Default::default())?;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod command;
mod error;
pub mod hardware;
pub mod input;
pub mod macros;
pub mod notify;
pub mod protocol;
pub mod settings;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use command::{Command, CropRegion, DefaultCommand, SharedCommand};
pub use error::{MacroError, Result};
pub use hardware::{CaptureManager, Hardware, SerialManager, StaticResourceIO};
pub use input::{Button, Hat, Key, StickPosition};
pub use macros::{
    ExecutionOutcome, Macro, MacroArgs, MacroExecutor, MacroFactory, MacroRegistry, MacroRunner,
};
pub use notify::{NotificationHandler, Notifier};
pub use protocol::{create_protocol, ProtocolKind, SerialProtocol};
pub use settings::SessionConfig;
