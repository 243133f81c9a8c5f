//! Serial wire protocols
//!
//! Each protocol keeps a cumulative "currently held" controller state and
//! returns a snapshot of it on every call, so callers never need
//! protocol-specific logic. Only the byte layout differs:
//!
//! - **CH552**: fixed 11-byte binary frame
//! - **PokeCon**: CRLF-terminated line of space-separated hex tokens
//!
//! # Example
//!
//! ```
//! use nyacore_macro::input::{Button, Key};
//! use nyacore_macro::protocol::create_protocol;
//!
//! let mut protocol = create_protocol("CH552");
//! let frame = protocol.build_press(&[Key::Button(Button::A)]);
//! assert_eq!(frame[1], 0x04);
//! ```

pub mod ch552;
pub mod pokecon;

pub use ch552::{Ch552Protocol, ControllerState};
pub use pokecon::PokeConProtocol;

use crate::input::{Key, KeyboardKey, KeyboardOp};
use crate::Result;
use std::fmt;
use std::str::FromStr;

/// Protocol identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolKind {
    /// Fixed-frame binary format
    #[default]
    Ch552,
    /// Text-line hex format
    PokeCon,
}

impl ProtocolKind {
    /// Every supported protocol
    pub const ALL: [ProtocolKind; 2] = [ProtocolKind::Ch552, ProtocolKind::PokeCon];

    /// Display name, as used in configuration files
    pub fn name(self) -> &'static str {
        match self {
            ProtocolKind::Ch552 => "CH552",
            ProtocolKind::PokeCon => "PokeCon",
        }
    }

    /// Create a fresh encoder with power-on state
    pub fn create(self) -> BoxedProtocol {
        match self {
            ProtocolKind::Ch552 => Box::new(Ch552Protocol::new()),
            ProtocolKind::PokeCon => Box::new(PokeConProtocol::new()),
        }
    }
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ch552" | "ch552serial" => Ok(ProtocolKind::Ch552),
            "pokecon" | "pokeconserial" => Ok(ProtocolKind::PokeCon),
            _ => Err(format!("Unknown protocol: {}", s)),
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Trait that all wire protocols must implement
pub trait SerialProtocol: Send {
    /// Protocol identifier
    fn kind(&self) -> ProtocolKind;

    /// Add `keys` to the held state and return the resulting frame
    fn build_press(&mut self, keys: &[Key]) -> Vec<u8>;

    /// Remove `keys` from the held state and return the resulting frame.
    /// An empty key set resets the whole state to power-on defaults.
    fn build_release(&mut self, keys: &[Key]) -> Vec<u8>;

    /// Frame that types `text` in one go
    ///
    /// Fails with `UnsupportedOperation` when the firmware has no text mode.
    fn build_keyboard_text(&mut self, text: &str) -> Result<Vec<u8>>;

    /// Frame for a single keyboard event
    ///
    /// May return an empty frame when the event needs no transmission.
    fn build_key_event(&mut self, key: KeyboardKey, op: KeyboardOp) -> Result<Vec<u8>>;
}

/// Boxed protocol type
pub type BoxedProtocol = Box<dyn SerialProtocol>;

/// Names of all supported protocols
pub fn protocol_names() -> Vec<&'static str> {
    ProtocolKind::ALL.iter().map(|k| k.name()).collect()
}

/// Create a protocol by name
///
/// Unknown names fall back to CH552 instead of failing.
// TODO: offer a strict lookup for front-ends that want to reject typos
pub fn create_protocol(name: &str) -> BoxedProtocol {
    match name.parse::<ProtocolKind>() {
        Ok(kind) => kind.create(),
        Err(e) => {
            log::warn!("{}; falling back to {}", e, ProtocolKind::Ch552);
            ProtocolKind::Ch552.create()
        }
    }
}
