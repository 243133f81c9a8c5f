//! PokeCon text-line protocol
//!
//! Each frame is one line: `0X<btns> <hat> <lx> <ly> <rx> <ry>\r\n`, all
//! fields in upper-case hexadecimal. Buttons are shifted left by two bits;
//! the two low bits are reserved and set in the power-on state.

use super::{ProtocolKind, SerialProtocol};
use crate::input::{Hat, Key, KeyboardKey, KeyboardOp, StickPosition};
use crate::{MacroError, Result};

/// Reserved low bits of the button field
const RESERVED_BITS: u16 = 0x0003;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PokeConState {
    buttons: u16,
    hat: Hat,
    left: StickPosition,
    right: StickPosition,
}

impl Default for PokeConState {
    fn default() -> Self {
        Self {
            buttons: RESERVED_BITS,
            hat: Hat::Center,
            left: StickPosition::CENTER,
            right: StickPosition::CENTER,
        }
    }
}

impl PokeConState {
    fn line(&self) -> Vec<u8> {
        format!(
            "0X{:X} {:X} {:X} {:X} {:X} {:X}\r\n",
            self.buttons,
            self.hat.value(),
            self.left.x,
            self.left.y,
            self.right.x,
            self.right.y
        )
        .into_bytes()
    }
}

/// PokeCon serial protocol encoder
pub struct PokeConProtocol {
    state: PokeConState,
}

impl PokeConProtocol {
    pub fn new() -> Self {
        Self {
            state: PokeConState::default(),
        }
    }
}

impl Default for PokeConProtocol {
    fn default() -> Self {
        Self::new()
    }
}

fn shifted(bits: u16) -> u16 {
    bits << 2
}

fn crlf_line(body: String) -> Vec<u8> {
    let mut bytes = body.into_bytes();
    bytes.extend_from_slice(b"\r\n");
    bytes
}

impl SerialProtocol for PokeConProtocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::PokeCon
    }

    fn build_press(&mut self, keys: &[Key]) -> Vec<u8> {
        for key in keys {
            match key {
                Key::Button(b) => self.state.buttons |= shifted(b.bits()),
                Key::Hat(h) => self.state.hat = *h,
                Key::LStick(pos) => self.state.left = *pos,
                Key::RStick(pos) => self.state.right = *pos,
            }
        }
        self.state.line()
    }

    fn build_release(&mut self, keys: &[Key]) -> Vec<u8> {
        if keys.is_empty() {
            self.state = PokeConState::default();
        }
        for key in keys {
            match key {
                Key::Button(b) => self.state.buttons &= !shifted(b.bits()),
                Key::Hat(_) => self.state.hat = Hat::Center,
                Key::LStick(_) => self.state.left = StickPosition::CENTER,
                Key::RStick(_) => self.state.right = StickPosition::CENTER,
            }
        }
        self.state.line()
    }

    fn build_keyboard_text(&mut self, text: &str) -> Result<Vec<u8>> {
        Ok(crlf_line(format!("\"{}\"", text)))
    }

    fn build_key_event(&mut self, key: KeyboardKey, op: KeyboardOp) -> Result<Vec<u8>> {
        match op {
            KeyboardOp::SpecialPush => Ok(crlf_line(format!("KEY {}", key.code()))),
            KeyboardOp::SpecialPress => Ok(crlf_line(format!("PRESS {}", key.code()))),
            KeyboardOp::SpecialRelease => Ok(crlf_line(format!("RELEASE {}", key.code()))),
            // Plain keys are typed as one-character text
            KeyboardOp::Push | KeyboardOp::Press => {
                Ok(crlf_line(format!("\"{}\"", key.code() as char)))
            }
            // Text keys are released by the firmware itself
            KeyboardOp::Release => Ok(Vec::new()),
            KeyboardOp::AllRelease => Err(MacroError::UnsupportedOperation(
                "PokeCon protocol does not support releasing all keys".to_string(),
            )),
        }
    }
}
