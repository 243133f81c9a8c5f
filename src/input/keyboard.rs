//! Keyboard keys and operations

use crate::{MacroError, Result};
use std::fmt;
use std::str::FromStr;

/// Kind of keyboard event sent to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyboardOp {
    Press = 1,
    Release = 2,
    SpecialPress = 3,
    SpecialRelease = 4,
    AllRelease = 5,
    Push = 6,
    SpecialPush = 7,
}

impl KeyboardOp {
    /// Wire value of this operation
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A single ASCII character key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(u8);

impl KeyCode {
    /// Placeholder key used for AllRelease events
    pub const NUL: KeyCode = KeyCode(0);

    /// Build from a character; only ASCII is accepted
    pub fn from_char(c: char) -> Result<Self> {
        if c.is_ascii() {
            Ok(KeyCode(c as u8))
        } else {
            Err(MacroError::InvalidCharacter(c))
        }
    }

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn as_char(self) -> char {
        self.0 as char
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Keys that have no printable character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SpecialKey {
    Enter = 0x28,
    Escape = 0x29,
    Backspace = 0x2A,
    Tab = 0x2B,
    Space = 0x22,
    // JIS keyboard
    HanZen = 0x35,
    Backslash = 0x87,
    Hiragana = 0x88,
    Yen = 0x89,
    Henkan = 0x8A,
    Muhenkan = 0x8B,
    ArrowRight = 0x4F,
    ArrowLeft = 0x50,
    ArrowDown = 0x51,
    ArrowUp = 0x52,
}

impl SpecialKey {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl FromStr for SpecialKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().replace(['_', '-'], "").as_str() {
            "ENTER" => Ok(SpecialKey::Enter),
            "ESCAPE" | "ESC" => Ok(SpecialKey::Escape),
            "BACKSPACE" => Ok(SpecialKey::Backspace),
            "TAB" => Ok(SpecialKey::Tab),
            "SPACE" => Ok(SpecialKey::Space),
            "HANZEN" => Ok(SpecialKey::HanZen),
            "BACKSLASH" => Ok(SpecialKey::Backslash),
            "HIRAGANA" => Ok(SpecialKey::Hiragana),
            "YEN" => Ok(SpecialKey::Yen),
            "HENKAN" => Ok(SpecialKey::Henkan),
            "MUHENKAN" => Ok(SpecialKey::Muhenkan),
            "ARROWRIGHT" | "RIGHT" => Ok(SpecialKey::ArrowRight),
            "ARROWLEFT" | "LEFT" => Ok(SpecialKey::ArrowLeft),
            "ARROWDOWN" | "DOWN" => Ok(SpecialKey::ArrowDown),
            "ARROWUP" | "UP" => Ok(SpecialKey::ArrowUp),
            _ => Err(format!("Unknown special key: {}", s)),
        }
    }
}

/// Either a character key or a special key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyboardKey {
    Char(KeyCode),
    Special(SpecialKey),
}

impl KeyboardKey {
    /// Placeholder key used for AllRelease events
    pub const NUL: KeyboardKey = KeyboardKey::Char(KeyCode::NUL);

    /// Build a character key
    pub fn char(c: char) -> Result<Self> {
        KeyCode::from_char(c).map(KeyboardKey::Char)
    }

    /// Wire code of the key
    pub fn code(self) -> u8 {
        match self {
            KeyboardKey::Char(k) => k.code(),
            KeyboardKey::Special(k) => k.code(),
        }
    }

    pub fn is_special(self) -> bool {
        matches!(self, KeyboardKey::Special(_))
    }
}

impl From<SpecialKey> for KeyboardKey {
    fn from(key: SpecialKey) -> Self {
        KeyboardKey::Special(key)
    }
}

impl From<KeyCode> for KeyboardKey {
    fn from(key: KeyCode) -> Self {
        KeyboardKey::Char(key)
    }
}

impl fmt::Display for KeyboardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyboardKey::Char(k) => write!(f, "{:?}", k.as_char()),
            KeyboardKey::Special(k) => write!(f, "{:?}", k),
        }
    }
}

/// Check that text only contains characters a keyboard device can type:
/// printable ASCII plus newline and tab
pub fn validate_keyboard_text(text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(MacroError::EmptyInput);
    }
    match text
        .chars()
        .find(|&c| !(('\x20'..'\x7f').contains(&c) || c == '\n' || c == '\t'))
    {
        Some(bad) => Err(MacroError::InvalidCharacter(bad)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_code_ascii_only() {
        assert_eq!(KeyCode::from_char('A').map(|k| k.code()).ok(), Some(0x41));
        assert!(matches!(
            KeyCode::from_char('あ'),
            Err(MacroError::InvalidCharacter('あ'))
        ));
        assert_eq!(KeyboardKey::NUL.code(), 0);
    }

    #[test]
    fn test_special_key_codes() {
        assert_eq!(SpecialKey::Enter.code(), 0x28);
        assert_eq!(SpecialKey::ArrowUp.code(), 0x52);
        assert_eq!("arrow_up".parse::<SpecialKey>(), Ok(SpecialKey::ArrowUp));
    }

    #[test]
    fn test_validate_keyboard_text() {
        assert!(validate_keyboard_text("Hello, world!\n\t~").is_ok());
        assert!(matches!(validate_keyboard_text(""), Err(MacroError::EmptyInput)));
        assert!(matches!(
            validate_keyboard_text("test\x07"),
            Err(MacroError::InvalidCharacter('\x07'))
        ));
        assert!(matches!(
            validate_keyboard_text("del\x7f"),
            Err(MacroError::InvalidCharacter('\x7f'))
        ));
    }
}
