//! The operation surface macros drive
//!
//! `DefaultCommand` ties one protocol encoder to the shared hardware, the
//! cancellation token, resource storage and notification sinks. Every
//! operation checks the token first, so a latched stop surfaces as
//! `MacroStopped` at the macro's next call.

use crate::cancel::CancellationToken;
use crate::hardware::resource::ResourceIo;
use crate::hardware::Hardware;
use crate::input::{describe_keys, validate_keyboard_text, Key, KeyboardKey, KeyboardOp};
use crate::notify::NotificationHandler;
use crate::protocol::{BoxedProtocol, ProtocolKind};
use crate::{MacroError, Result};
use image::imageops::{self, FilterType};
use image::DynamicImage;
use log::Level;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub use crate::hardware::capture::{CANONICAL_HEIGHT, CANONICAL_WIDTH};

/// Default hold time of `press`
pub const DEFAULT_PRESS_DURATION: Duration = Duration::from_millis(100);
/// Default pause after `press`
pub const DEFAULT_PRESS_WAIT: Duration = Duration::from_millis(100);

/// Rectangle within the canonical 1280x720 frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the region lies inside a `bound_width` x `bound_height` frame
    pub fn fits(&self, bound_width: u32, bound_height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(bound_width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(bound_height)
    }

    fn check(&self, bound_width: u32, bound_height: u32) -> Result<()> {
        if self.fits(bound_width, bound_height) {
            Ok(())
        } else {
            Err(MacroError::OutOfBounds {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                bound_width,
                bound_height,
            })
        }
    }
}

/// Operations available to macros
///
/// Methods take `&self` so one command can be shared between the macro
/// thread and script bindings.
pub trait Command: Send + Sync {
    /// Press `keys`, hold for `dur`, release them, then pause for `wait`
    fn press(&self, keys: &[Key], dur: Duration, wait: Duration) -> Result<()>;

    /// Press `keys` and keep them held
    fn hold(&self, keys: &[Key]) -> Result<()>;

    /// Release `keys`; an empty slice releases everything
    fn release(&self, keys: &[Key]) -> Result<()>;

    /// Block the macro thread
    fn wait(&self, duration: Duration) -> Result<()>;

    /// Latest frame rescaled to 1280x720, optionally cropped and grayscaled
    fn capture(&self, crop: Option<CropRegion>, grayscale: bool) -> Result<DynamicImage>;

    /// Type printable ASCII text (plus newline and tab)
    fn keyboard(&self, text: &str) -> Result<()>;

    /// Press and release a single keyboard key
    fn type_key(&self, key: KeyboardKey) -> Result<()>;

    /// Store an image under the static resource root
    fn save_img(&self, name: &str, image: &DynamicImage) -> Result<()>;

    /// Read an image from the static resource root
    fn load_img(&self, name: &str, grayscale: bool) -> Result<DynamicImage>;

    /// Send a notification to every configured sink
    fn notify(&self, text: &str, image: Option<&DynamicImage>) -> Result<()>;

    /// Log tagged with the running macro's name, or the component name
    /// outside a run
    fn log(&self, level: Level, message: &str);

    /// Name `log` tags messages with; `None` restores the component name
    fn set_caller(&self, _caller: Option<&str>) {}

    /// Latch the cancellation token; always returns `MacroStopped`
    fn stop(&self) -> Result<()>;

    /// The token this command checks before every operation
    fn cancellation(&self) -> &CancellationToken;
}

/// Command handle shared with macros and script bindings
pub type SharedCommand = Arc<dyn Command>;

/// Standard `Command` over the shared hardware
pub struct DefaultCommand {
    hardware: Hardware,
    protocol: Mutex<BoxedProtocol>,
    token: CancellationToken,
    resources: Option<Arc<dyn ResourceIo>>,
    notifications: NotificationHandler,
    component: String,
    caller: RwLock<Option<String>>,
}

impl DefaultCommand {
    pub fn new(hardware: Hardware, protocol: BoxedProtocol, token: CancellationToken) -> Self {
        Self {
            hardware,
            protocol: Mutex::new(protocol),
            token,
            resources: None,
            notifications: NotificationHandler::new(),
            component: "Command".to_string(),
            caller: RwLock::new(None),
        }
    }

    /// Storage used by `save_img`/`load_img`
    pub fn with_resources(mut self, resources: Arc<dyn ResourceIo>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationHandler) -> Self {
        self.notifications = notifications;
        self
    }

    /// Component name prefixed to every log line
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Tag of macro log lines: the caller if one is set
    pub fn log_tag(&self) -> String {
        self.caller
            .read()
            .clone()
            .unwrap_or_else(|| self.component.clone())
    }

    pub fn protocol_kind(&self) -> ProtocolKind {
        self.protocol.lock().kind()
    }

    pub fn hardware(&self) -> &Hardware {
        &self.hardware
    }

    fn trace(&self, message: impl AsRef<str>) {
        log::debug!("[{}] {}", self.component, message.as_ref());
    }

    fn guard(&self) -> Result<()> {
        self.token.check()
    }

    fn send_frame(&self, frame: &[u8]) -> Result<()> {
        if frame.is_empty() {
            return Ok(());
        }
        self.hardware.send(frame)
    }

    fn send_press(&self, keys: &[Key]) -> Result<()> {
        let frame = self.protocol.lock().build_press(keys);
        self.send_frame(&frame)
    }

    fn send_release(&self, keys: &[Key]) -> Result<()> {
        let frame = self.protocol.lock().build_release(keys);
        self.send_frame(&frame)
    }

    fn key_event(&self, key: KeyboardKey, op: KeyboardOp) -> Result<()> {
        let frame = self.protocol.lock().build_key_event(key, op)?;
        self.send_frame(&frame)
    }

    fn resources(&self) -> Result<&dyn ResourceIo> {
        self.resources
            .as_deref()
            .ok_or_else(|| MacroError::Config("no static resource directory configured".to_string()))
    }
}

impl Command for DefaultCommand {
    fn press(&self, keys: &[Key], dur: Duration, wait: Duration) -> Result<()> {
        self.guard()?;
        let described = describe_keys(keys);
        self.trace(format!("Pressing keys: {}", described));
        self.send_press(keys)?;
        thread::sleep(dur);

        self.trace(format!("Releasing keys: {}", described));
        self.send_release(keys)?;
        thread::sleep(wait);
        Ok(())
    }

    fn hold(&self, keys: &[Key]) -> Result<()> {
        self.guard()?;
        self.trace(format!("Holding keys: {}", describe_keys(keys)));
        self.send_press(keys)
    }

    fn release(&self, keys: &[Key]) -> Result<()> {
        self.guard()?;
        self.trace(format!("Releasing keys: {}", describe_keys(keys)));
        self.send_release(keys)
    }

    fn wait(&self, duration: Duration) -> Result<()> {
        self.guard()?;
        self.trace(format!("Waiting for {:.3} seconds", duration.as_secs_f64()));
        thread::sleep(duration);
        Ok(())
    }

    fn capture(&self, crop: Option<CropRegion>, grayscale: bool) -> Result<DynamicImage> {
        self.guard()?;
        self.trace("Capturing screen...");

        let mut frame = self.hardware.get_frame()?.into_image();
        if frame.dimensions() != (CANONICAL_WIDTH, CANONICAL_HEIGHT) {
            frame = imageops::resize(&frame, CANONICAL_WIDTH, CANONICAL_HEIGHT, FilterType::Triangle);
        }

        if let Some(region) = crop {
            region.check(CANONICAL_WIDTH, CANONICAL_HEIGHT)?;
            frame = imageops::crop_imm(&frame, region.x, region.y, region.width, region.height)
                .to_image();
        }

        let image = DynamicImage::ImageRgb8(frame);
        Ok(if grayscale {
            DynamicImage::ImageLuma8(image.to_luma8())
        } else {
            image
        })
    }

    fn keyboard(&self, text: &str) -> Result<()> {
        self.guard()?;
        validate_keyboard_text(text)?;
        self.trace(format!("Sending keyboard input: {:?}", text));

        let text_frame = self.protocol.lock().build_keyboard_text(text);
        match text_frame {
            Ok(frame) => return self.send_frame(&frame),
            Err(e) if e.is_unsupported() => {}
            Err(e) => return Err(e),
        }

        // No text mode: type character by character
        for c in text.chars() {
            let key = KeyboardKey::char(c)?;
            self.key_event(key, KeyboardOp::Press)?;
            self.key_event(key, KeyboardOp::Release)?;
        }
        match self.key_event(KeyboardKey::NUL, KeyboardOp::AllRelease) {
            Err(e) if e.is_unsupported() => {
                self.trace("All-release not supported by protocol, skipped");
                Ok(())
            }
            other => other,
        }
    }

    fn type_key(&self, key: KeyboardKey) -> Result<()> {
        self.guard()?;
        self.trace(format!("Typing key: {}", key));
        let (press, release) = if key.is_special() {
            (KeyboardOp::SpecialPress, KeyboardOp::SpecialRelease)
        } else {
            (KeyboardOp::Press, KeyboardOp::Release)
        };
        self.key_event(key, press)?;
        self.key_event(key, release)
    }

    fn save_img(&self, name: &str, image: &DynamicImage) -> Result<()> {
        self.guard()?;
        self.trace(format!("Saving image: {}", name));
        self.resources()?.save_image(name, image)
    }

    fn load_img(&self, name: &str, grayscale: bool) -> Result<DynamicImage> {
        self.guard()?;
        self.trace(format!("Loading image: {}", name));
        self.resources()?.load_image(name, grayscale)
    }

    fn notify(&self, text: &str, image: Option<&DynamicImage>) -> Result<()> {
        self.guard()?;
        self.trace(format!("Notifying: {}", text));
        self.notifications.notify(text, image);
        Ok(())
    }

    fn log(&self, level: Level, message: &str) {
        log::log!(level, "[{}] {}", self.log_tag(), message);
    }

    fn set_caller(&self, caller: Option<&str>) {
        *self.caller.write() = caller.map(str::to_string);
    }

    fn stop(&self) -> Result<()> {
        self.token.request_stop();
        log::info!("[{}] Stop requested", self.component);
        Err(MacroError::MacroStopped)
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::capture::{CaptureDevice, CaptureFrame, CaptureSettings};
    use crate::hardware::serial::SerialDevice;
    use crate::input::{Button, Hat, SpecialKey};
    use crate::protocol::{Ch552Protocol, PokeConProtocol, SerialProtocol};
    use image::{Rgb, RgbImage};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Wire {
        frames: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl SerialDevice for Wire {
        fn open(&mut self, _baud: u32) -> Result<()> {
            Ok(())
        }

        fn send(&mut self, data: &[u8]) -> Result<()> {
            self.frames.lock().push(data.to_vec());
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    /// Protocol double with no text mode that records every call
    struct Recording {
        calls: Log,
    }

    impl SerialProtocol for Recording {
        fn kind(&self) -> ProtocolKind {
            ProtocolKind::Ch552
        }

        fn build_press(&mut self, keys: &[Key]) -> Vec<u8> {
            self.calls.lock().push(format!("press {}", describe_keys(keys)));
            b"press".to_vec()
        }

        fn build_release(&mut self, keys: &[Key]) -> Vec<u8> {
            self.calls.lock().push(format!("release {}", describe_keys(keys)));
            b"release".to_vec()
        }

        fn build_keyboard_text(&mut self, _text: &str) -> Result<Vec<u8>> {
            Err(MacroError::UnsupportedOperation("text".to_string()))
        }

        fn build_key_event(&mut self, key: KeyboardKey, op: KeyboardOp) -> Result<Vec<u8>> {
            self.calls.lock().push(format!("{:?} {:?}", op, key.code() as char));
            Ok(vec![op.code(), key.code()])
        }
    }

    struct FixedCapture(RgbImage);

    impl CaptureDevice for FixedCapture {
        fn name(&self) -> &str {
            "fixed"
        }

        fn initialize(&mut self, _settings: &CaptureSettings) -> Result<()> {
            Ok(())
        }

        fn get_frame(&self) -> Result<CaptureFrame> {
            Ok(CaptureFrame::new(self.0.clone(), 1))
        }

        fn release(&mut self) {}
    }

    fn wired(protocol: BoxedProtocol) -> (DefaultCommand, Arc<Mutex<Vec<Vec<u8>>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let hardware = Hardware::new();
        {
            let mut serial = hardware.serial().lock();
            serial.register_device("wire", Box::new(Wire { frames: frames.clone() }));
            serial.set_active("wire", 9600).unwrap();
        }
        let cmd = DefaultCommand::new(hardware, protocol, CancellationToken::new());
        (cmd, frames)
    }

    fn recording() -> (DefaultCommand, Log, Arc<Mutex<Vec<Vec<u8>>>>) {
        let calls = Log::default();
        let (cmd, frames) = wired(Box::new(Recording {
            calls: calls.clone(),
        }));
        (cmd, calls, frames)
    }

    #[test]
    fn test_press_sends_press_then_release() {
        let (cmd, frames) = wired(Box::new(Ch552Protocol::new()));
        cmd.press(&[Button::A.into()], Duration::ZERO, Duration::ZERO)
            .unwrap();
        let frames = frames.lock();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][1], 0x04);
        assert_eq!(frames[1][1], 0x00);
    }

    #[test]
    fn test_hold_and_release_are_single_frames() {
        let (cmd, calls, frames) = recording();
        cmd.hold(&[Button::X.into(), Hat::Up.into()]).unwrap();
        cmd.release(&[]).unwrap();
        assert_eq!(frames.lock().len(), 2);
        assert!(calls.lock()[0].starts_with("press"));
        assert_eq!(calls.lock()[1], "release (all)");
    }

    #[test]
    fn test_keyboard_fallback_call_sequence() {
        let (cmd, calls, frames) = recording();
        cmd.keyboard("Hello").unwrap();

        let calls = calls.lock();
        assert_eq!(calls.len(), 11);
        assert_eq!(calls[0], "Press 'H'");
        assert_eq!(calls[1], "Release 'H'");
        assert_eq!(calls[9], "Release 'o'");
        assert_eq!(calls[10], "AllRelease '\\0'");
        assert_eq!(frames.lock().len(), 11);
    }

    #[test]
    fn test_keyboard_validation_happens_first() {
        let (cmd, calls, _) = recording();
        assert!(matches!(cmd.keyboard(""), Err(MacroError::EmptyInput)));
        assert!(matches!(
            cmd.keyboard("test\x07"),
            Err(MacroError::InvalidCharacter('\x07'))
        ));
        assert!(calls.lock().is_empty());

        cmd.keyboard("\n\t").unwrap();
        assert_eq!(calls.lock()[0], "Press '\\n'");
        assert_eq!(calls.lock()[2], "Press '\\t'");
    }

    #[test]
    fn test_keyboard_text_mode_sends_one_frame() {
        let (cmd, frames) = wired(Box::new(PokeConProtocol::new()));
        cmd.keyboard("abc").unwrap();
        assert_eq!(*frames.lock(), vec![b"\"abc\"\r\n".to_vec()]);
    }

    #[test]
    fn test_type_key_skips_empty_frames() {
        let (cmd, frames) = wired(Box::new(PokeConProtocol::new()));
        // Plain release produces no PokeCon frame
        cmd.type_key(KeyboardKey::char('z').unwrap()).unwrap();
        cmd.type_key(SpecialKey::Enter.into()).unwrap();
        assert_eq!(
            *frames.lock(),
            vec![
                b"\"z\"\r\n".to_vec(),
                b"PRESS 40\r\n".to_vec(),
                b"RELEASE 40\r\n".to_vec()
            ]
        );
    }

    #[test]
    fn test_stop_latches_and_blocks_later_calls() {
        let (cmd, calls, frames) = recording();
        assert!(cmd.stop().unwrap_err().is_stop());
        assert!(cmd.cancellation().stop_requested());

        assert!(cmd.hold(&[Button::B.into()]).unwrap_err().is_stop());
        assert!(cmd.wait(Duration::ZERO).unwrap_err().is_stop());
        assert!(cmd.capture(None, false).unwrap_err().is_stop());
        assert!(cmd.keyboard("a").unwrap_err().is_stop());
        assert!(calls.lock().is_empty());
        assert!(frames.lock().is_empty());
    }

    #[test]
    fn test_capture_rescales_crops_and_grays() {
        let (cmd, _) = wired(Box::new(Ch552Protocol::new()));
        {
            let mut capture = cmd.hardware().capture().lock();
            capture.register_device(
                "fixed",
                Box::new(FixedCapture(RgbImage::from_pixel(640, 360, Rgb([0, 255, 0])))),
            );
            capture.set_active("fixed").unwrap();
        }

        let full = cmd.capture(None, false).unwrap();
        assert_eq!((full.width(), full.height()), (CANONICAL_WIDTH, CANONICAL_HEIGHT));

        let cropped = cmd.capture(Some(CropRegion::new(100, 50, 200, 100)), true).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (200, 100));
        assert!(matches!(cropped, DynamicImage::ImageLuma8(_)));

        let err = cmd
            .capture(Some(CropRegion::new(1200, 700, 200, 200)), false)
            .unwrap_err();
        assert!(matches!(err, MacroError::OutOfBounds { x: 1200, y: 700, .. }));
    }

    #[test]
    fn test_images_need_resource_root() {
        let (cmd, _) = wired(Box::new(Ch552Protocol::new()));
        let image = DynamicImage::new_rgb8(1, 1);
        assert!(matches!(cmd.save_img("a.png", &image), Err(MacroError::Config(_))));

        let dir = tempfile::tempdir().unwrap();
        let io = crate::hardware::StaticResourceIO::new(dir.path()).unwrap();
        let cmd = cmd.with_resources(Arc::new(io));
        cmd.save_img("shots/a.png", &image).unwrap();
        assert_eq!(cmd.load_img("shots/a.png", true).unwrap().width(), 1);
    }

    #[test]
    fn test_log_tag_follows_caller() {
        let (cmd, _) = wired(Box::new(Ch552Protocol::new()));
        let cmd = cmd.with_component("Session");
        assert_eq!(cmd.log_tag(), "Session");

        cmd.set_caller(Some("DailyFarm"));
        assert_eq!(cmd.log_tag(), "DailyFarm");
        cmd.log(Level::Info, "tagged with the macro");

        cmd.set_caller(None);
        assert_eq!(cmd.log_tag(), "Session");
    }

    #[test]
    fn test_crop_bounds() {
        assert!(CropRegion::new(0, 0, 1280, 720).fits(1280, 720));
        assert!(!CropRegion::new(1, 0, 1280, 720).fits(1280, 720));
        assert!(!CropRegion::new(u32::MAX, 0, 1, 1).fits(1280, 720));
    }
}
