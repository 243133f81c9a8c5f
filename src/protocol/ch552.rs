//! CH552 fixed-frame protocol
//!
//! Frame layout (11 bytes):
//!
//! | offset | field    | default |
//! |--------|----------|---------|
//! | 0      | header   | 0xAB    |
//! | 1      | btn_lo   | 0x00    |
//! | 2      | btn_hi   | 0x00    |
//! | 3      | hat      | 0x08    |
//! | 4..=7  | lx ly rx ry | 0x80 |
//! | 8      | kbd_op   | 0x00    |
//! | 9      | kbd_key  | 0x00    |
//! | 10     | reserved | 0x00    |

use super::{ProtocolKind, SerialProtocol};
use crate::input::{Hat, Key, KeyboardKey, KeyboardOp, StickPosition, STICK_CENTER};
use crate::{MacroError, Result};

/// Frame header byte
pub const HEADER: u8 = 0xAB;
/// Frame length in bytes
pub const FRAME_LEN: usize = 11;

const BTN_LO: usize = 1;
const BTN_HI: usize = 2;
const HAT: usize = 3;
const LX: usize = 4;
const LY: usize = 5;
const RX: usize = 6;
const RY: usize = 7;
const KBD_OP: usize = 8;
const KBD_KEY: usize = 9;

/// The "currently held" register mirrored by the CH552 frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerState([u8; FRAME_LEN]);

impl ControllerState {
    /// Power-on frame
    pub const DEFAULT: ControllerState = ControllerState([
        HEADER,
        0x00,
        0x00,
        Hat::Center as u8,
        STICK_CENTER,
        STICK_CENTER,
        STICK_CENTER,
        STICK_CENTER,
        0x00,
        0x00,
        0x00,
    ]);

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// Held buttons as a 16-bit mask
    pub fn buttons(&self) -> u16 {
        u16::from_le_bytes([self.0[BTN_LO], self.0[BTN_HI]])
    }

    fn set_buttons(&mut self, bits: u16) {
        let [lo, hi] = bits.to_le_bytes();
        self.0[BTN_LO] = lo;
        self.0[BTN_HI] = hi;
    }

    fn set_left(&mut self, pos: StickPosition) {
        self.0[LX] = pos.x;
        self.0[LY] = pos.y;
    }

    fn set_right(&mut self, pos: StickPosition) {
        self.0[RX] = pos.x;
        self.0[RY] = pos.y;
    }

    fn press(&mut self, key: &Key) {
        match key {
            Key::Button(b) => self.set_buttons(self.buttons() | b.bits()),
            Key::Hat(h) => self.0[HAT] = h.value(),
            Key::LStick(pos) => self.set_left(*pos),
            Key::RStick(pos) => self.set_right(*pos),
        }
    }

    fn release(&mut self, key: &Key) {
        match key {
            Key::Button(b) => self.set_buttons(self.buttons() & !b.bits()),
            Key::Hat(_) => self.0[HAT] = Hat::Center.value(),
            Key::LStick(_) => self.set_left(StickPosition::CENTER),
            Key::RStick(_) => self.set_right(StickPosition::CENTER),
        }
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// CH552 serial protocol encoder
pub struct Ch552Protocol {
    state: ControllerState,
}

impl Ch552Protocol {
    pub fn new() -> Self {
        Self {
            state: ControllerState::DEFAULT,
        }
    }

    /// Current held state
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    fn snapshot(&self) -> Vec<u8> {
        self.state.as_bytes().to_vec()
    }
}

impl Default for Ch552Protocol {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialProtocol for Ch552Protocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Ch552
    }

    fn build_press(&mut self, keys: &[Key]) -> Vec<u8> {
        for key in keys {
            self.state.press(key);
        }
        self.snapshot()
    }

    fn build_release(&mut self, keys: &[Key]) -> Vec<u8> {
        if keys.is_empty() {
            self.state = ControllerState::DEFAULT;
        } else {
            for key in keys {
                self.state.release(key);
            }
        }
        self.snapshot()
    }

    fn build_keyboard_text(&mut self, _text: &str) -> Result<Vec<u8>> {
        Err(MacroError::UnsupportedOperation(
            "CH552 protocol has no text mode keyboard input; use key events instead".to_string(),
        ))
    }

    fn build_key_event(&mut self, key: KeyboardKey, op: KeyboardOp) -> Result<Vec<u8>> {
        self.state.0[KBD_OP] = op.code();
        self.state.0[KBD_KEY] = match op {
            KeyboardOp::AllRelease => 0x00,
            _ => key.code(),
        };
        Ok(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Button, SpecialKey};

    const DEFAULT: [u8; 11] = [0xAB, 0x00, 0x00, 0x08, 0x80, 0x80, 0x80, 0x80, 0x00, 0x00, 0x00];

    #[test]
    fn test_press_a_then_release() {
        let mut p = Ch552Protocol::new();
        let pressed = p.build_press(&[Button::A.into()]);
        assert_eq!(
            pressed,
            vec![0xAB, 0x04, 0x00, 0x08, 0x80, 0x80, 0x80, 0x80, 0x00, 0x00, 0x00]
        );
        let released = p.build_release(&[Button::A.into()]);
        assert_eq!(released, DEFAULT.to_vec());
    }

    #[test]
    fn test_state_is_cumulative() {
        let mut p = Ch552Protocol::new();
        p.build_press(&[Button::A.into()]);
        let frame = p.build_press(&[Button::Home.into(), Hat::Left.into()]);
        assert_eq!(frame[1], 0x04);
        assert_eq!(frame[2], 0x10);
        assert_eq!(frame[3], 0x06);

        let frame = p.build_release(&[Button::A.into()]);
        assert_eq!(frame[1], 0x00);
        assert_eq!(frame[2], 0x10);
        assert_eq!(frame[3], 0x06);
    }

    #[test]
    fn test_sticks() {
        let mut p = Ch552Protocol::new();
        let frame = p.build_press(&[
            Key::LStick(StickPosition::right()),
            Key::RStick(StickPosition::down()),
        ]);
        assert_eq!(&frame[4..8], &[255, 127, 128, 255]);

        let frame = p.build_release(&[Key::LStick(StickPosition::CENTER)]);
        assert_eq!(&frame[4..8], &[0x80, 0x80, 128, 255]);
    }

    #[test]
    fn test_empty_release_resets_everything() {
        let mut p = Ch552Protocol::new();
        p.build_press(&[
            Button::ZL.into(),
            Button::Capture.into(),
            Hat::UpRight.into(),
            Key::LStick(StickPosition::up()),
        ]);
        p.build_key_event(KeyboardKey::Special(SpecialKey::Enter), KeyboardOp::SpecialPress)
            .unwrap();
        assert_eq!(p.build_release(&[]), DEFAULT.to_vec());
    }

    #[test]
    fn test_key_events() {
        let mut p = Ch552Protocol::new();
        let frame = p
            .build_key_event(KeyboardKey::char('h').unwrap(), KeyboardOp::Press)
            .unwrap();
        assert_eq!(frame[8], 1);
        assert_eq!(frame[9], b'h');

        let frame = p
            .build_key_event(KeyboardKey::char('h').unwrap(), KeyboardOp::AllRelease)
            .unwrap();
        assert_eq!(frame[8], 5);
        assert_eq!(frame[9], 0);
        assert_eq!(frame.len(), FRAME_LEN);
    }

    #[test]
    fn test_text_mode_unsupported() {
        let mut p = Ch552Protocol::new();
        assert!(p.build_keyboard_text("hi").unwrap_err().is_unsupported());
    }
}
