//! Error types for the macro engine

use std::path::PathBuf;
use thiserror::Error;

/// Result type for macro engine operations
pub type Result<T> = std::result::Result<T, MacroError>;

/// Error type shared by the hardware layer, the command surface and the executor
#[derive(Debug, Error)]
pub enum MacroError {
    /// Registry lookup miss when activating a device
    #[error("device '{0}' is not registered")]
    DeviceNotRegistered(String),

    /// Configured device name could not be resolved at session start
    #[error("device '{name}' not found. Available devices: {}", .available.join(", "))]
    DeviceNotFound { name: String, available: Vec<String> },

    /// Operation on a device that has not been opened
    #[error("{0}: device is not open")]
    NotOpen(String),

    /// Operation that needs an active device when none is selected
    #[error("no active {0} device")]
    NoActiveDevice(&'static str),

    /// The underlying device could not be opened
    #[error("{device}: could not open device: {reason}")]
    DeviceOpen { device: String, reason: String },

    /// Capture read before the first completed poll
    #[error("{0}: no frame available yet")]
    FrameNotReady(String),

    /// The selected protocol variant lacks the requested capability
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Keyboard text contains a character the device cannot type
    #[error("unsupported character for keyboard input: {0:?}")]
    InvalidCharacter(char),

    /// Keyboard text is empty
    #[error("input text is empty")]
    EmptyInput,

    /// Crop rectangle exceeds the canonical frame
    #[error("crop region ({x}, {y}, {width}, {height}) exceeds the {bound_width}x{bound_height} frame")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        bound_width: u32,
        bound_height: u32,
    },

    /// Unknown macro name
    #[error("macro '{name}' not found. Available macros: {}", .available.join(", "))]
    MacroNotFound { name: String, available: Vec<String> },

    /// `execute` called before `select`
    #[error("no macro selected")]
    NoMacroSelected,

    /// A macro run is already in progress
    #[error("a macro is already running")]
    AlreadyRunning,

    /// Cooperative cancellation signal
    #[error("macro execution interrupted")]
    MacroStopped,

    /// Missing resource file or directory
    #[error("resource not found: {0}")]
    ResourceNotFound(PathBuf),

    /// Rejected resource path
    #[error("invalid resource path: {0}")]
    InvalidPath(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("script error: {0}")]
    Script(String),

    /// A value passed to a command is outside the range it accepts
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unclassified failure raised by macro code
    #[error("macro execution failed: {0}")]
    Execution(String),

    #[error("notification '{sink}' failed: {reason}")]
    Notification { sink: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl MacroError {
    /// Whether this error is the cancellation signal rather than a failure
    pub fn is_stop(&self) -> bool {
        matches!(self, MacroError::MacroStopped)
    }

    /// Whether the protocol variant rejected the request
    pub fn is_unsupported(&self) -> bool {
        matches!(self, MacroError::UnsupportedOperation(_))
    }
}

impl From<toml::de::Error> for MacroError {
    fn from(e: toml::de::Error) -> Self {
        MacroError::Config(e.to_string())
    }
}
