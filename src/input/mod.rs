//! Controller input model
//!
//! Abstract inputs that the protocol encoders turn into wire frames:
//! - `Button` - one of 14 bit flags packed into a 16-bit field
//! - `Hat` - the direction pad (8 compass directions + center)
//! - `StickPosition` - an analog stick byte pair derived from angle and magnitude
//! - keyboard keys and operations for the keyboard-capable firmwares

mod keyboard;
mod stick;

pub use keyboard::{validate_keyboard_text, KeyCode, KeyboardKey, KeyboardOp, SpecialKey};
pub use stick::{StickPosition, STICK_CENTER};

use std::fmt;
use std::str::FromStr;

// =============================================================================
// BUTTONS
// =============================================================================

/// Controller buttons, each a distinct bit in a 16-bit field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Button {
    Y = 0x0001,
    B = 0x0002,
    A = 0x0004,
    X = 0x0008,
    L = 0x0010,
    R = 0x0020,
    ZL = 0x0040,
    ZR = 0x0080,
    Minus = 0x0100,
    Plus = 0x0200,
    LS = 0x0400,
    RS = 0x0800,
    Home = 0x1000,
    Capture = 0x2000,
}

impl Button {
    /// Every button in bit order
    pub const ALL: [Button; 14] = [
        Button::Y,
        Button::B,
        Button::A,
        Button::X,
        Button::L,
        Button::R,
        Button::ZL,
        Button::ZR,
        Button::Minus,
        Button::Plus,
        Button::LS,
        Button::RS,
        Button::Home,
        Button::Capture,
    ];

    /// The bit flag for this button
    pub fn bits(self) -> u16 {
        self as u16
    }

    /// Canonical upper-case name
    pub fn name(self) -> &'static str {
        match self {
            Button::Y => "Y",
            Button::B => "B",
            Button::A => "A",
            Button::X => "X",
            Button::L => "L",
            Button::R => "R",
            Button::ZL => "ZL",
            Button::ZR => "ZR",
            Button::Minus => "MINUS",
            Button::Plus => "PLUS",
            Button::LS => "LS",
            Button::RS => "RS",
            Button::Home => "HOME",
            Button::Capture => "CAP",
        }
    }
}

impl FromStr for Button {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "Y" => Ok(Button::Y),
            "B" => Ok(Button::B),
            "A" => Ok(Button::A),
            "X" => Ok(Button::X),
            "L" => Ok(Button::L),
            "R" => Ok(Button::R),
            "ZL" => Ok(Button::ZL),
            "ZR" => Ok(Button::ZR),
            "MINUS" | "-" => Ok(Button::Minus),
            "PLUS" | "+" => Ok(Button::Plus),
            "LS" => Ok(Button::LS),
            "RS" => Ok(Button::RS),
            "HOME" => Ok(Button::Home),
            "CAP" | "CAPTURE" => Ok(Button::Capture),
            _ => Err(format!("Unknown button: {}", s)),
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// DIRECTION PAD
// =============================================================================

/// Direction pad state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Hat {
    Up = 0x00,
    UpRight = 0x01,
    Right = 0x02,
    DownRight = 0x03,
    Down = 0x04,
    DownLeft = 0x05,
    Left = 0x06,
    UpLeft = 0x07,
    #[default]
    Center = 0x08,
}

impl Hat {
    /// Wire value of this direction
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Hat::Up => "UP",
            Hat::UpRight => "UPRIGHT",
            Hat::Right => "RIGHT",
            Hat::DownRight => "DOWNRIGHT",
            Hat::Down => "DOWN",
            Hat::DownLeft => "DOWNLEFT",
            Hat::Left => "LEFT",
            Hat::UpLeft => "UPLEFT",
            Hat::Center => "CENTER",
        }
    }
}

impl FromStr for Hat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace(['_', '-'], "").as_str() {
            "UP" => Ok(Hat::Up),
            "UPRIGHT" => Ok(Hat::UpRight),
            "RIGHT" => Ok(Hat::Right),
            "DOWNRIGHT" => Ok(Hat::DownRight),
            "DOWN" => Ok(Hat::Down),
            "DOWNLEFT" => Ok(Hat::DownLeft),
            "LEFT" => Ok(Hat::Left),
            "UPLEFT" => Ok(Hat::UpLeft),
            "CENTER" => Ok(Hat::Center),
            _ => Err(format!("Unknown hat direction: {}", s)),
        }
    }
}

impl fmt::Display for Hat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// KEY
// =============================================================================

/// Any controller input accepted by `press`/`hold`/`release`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Button(Button),
    Hat(Hat),
    LStick(StickPosition),
    RStick(StickPosition),
}

impl From<Button> for Key {
    fn from(button: Button) -> Self {
        Key::Button(button)
    }
}

impl From<Hat> for Key {
    fn from(hat: Hat) -> Self {
        Key::Hat(hat)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Button(b) => write!(f, "Button.{}", b),
            Key::Hat(h) => write!(f, "Hat.{}", h),
            Key::LStick(s) => write!(f, "LStick({:#04X}, {:#04X})", s.x, s.y),
            Key::RStick(s) => write!(f, "RStick({:#04X}, {:#04X})", s.x, s.y),
        }
    }
}

/// Render a key set for log messages
pub fn describe_keys(keys: &[Key]) -> String {
    if keys.is_empty() {
        return "(all)".to_string();
    }
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
