//! Video capture
//!
//! Capture devices poll a `VideoSource` on their own thread and keep the
//! latest frame cached. `CaptureManager` holds the named devices and at most
//! one active one.

pub mod camera;
mod device;
pub mod source;

#[cfg(feature = "camera")]
pub use camera::CameraSource;
pub use device::{
    AsyncCaptureDevice, BoxedCaptureDevice, CaptureDevice, CaptureState, DummyCaptureDevice,
    FrameCache, SourceOpener,
};
pub use source::{BoxedVideoSource, FrameSequenceSource, StillImageSource, VideoSource};

use crate::{MacroError, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Width every capture is rescaled to
pub const CANONICAL_WIDTH: u32 = 1280;
/// Height every capture is rescaled to
pub const CANONICAL_HEIGHT: u32 = 720;

/// Lowest polling rate, in frames per second
const MIN_POLL_FPS: f64 = 10.0;

/// One sampled image plus its position in the poll order
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    image: RgbImage,
    sequence: u64,
}

impl CaptureFrame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Poll counter of the device that produced the frame, starting at 1
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Requested capture format, applied to a source when its device is
/// activated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Frame size requested from cameras; file sources are scaled to it
    pub width: u32,
    pub height: u32,
    /// Polling rate, also requested from cameras
    pub fps: f64,
    /// Frames pulled from a camera per poll; only the newest is kept
    pub buffer_size: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: CANONICAL_WIDTH,
            height: CANONICAL_HEIGHT,
            fps: 60.0,
            buffer_size: 1,
        }
    }
}

impl CaptureSettings {
    /// Time between polls, never longer than 1/10 s
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(MIN_POLL_FPS))
    }

    pub fn frames_per_poll(&self) -> u32 {
        self.buffer_size.max(1)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Registry of named capture devices with at most one active device
pub struct CaptureManager {
    devices: HashMap<String, BoxedCaptureDevice>,
    active: Option<String>,
    dummy: DummyCaptureDevice,
    settings: CaptureSettings,
}

impl CaptureManager {
    pub fn new() -> Self {
        Self::with_settings(CaptureSettings::default())
    }

    /// Registry that activates devices with `settings`
    pub fn with_settings(settings: CaptureSettings) -> Self {
        Self {
            devices: HashMap::new(),
            active: None,
            dummy: DummyCaptureDevice::new(),
            settings,
        }
    }

    /// Register file-backed devices found under `root`
    ///
    /// Every sub-directory becomes a looping frame sequence named after the
    /// directory; every image file becomes a still device named after the
    /// file. Returns the number of devices registered.
    pub fn discover(&mut self, root: &Path) -> Result<usize> {
        if !root.is_dir() {
            return Err(MacroError::ResourceNotFound(root.to_path_buf()));
        }

        let mut count = 0;
        for entry in std::fs::read_dir(root)?.filter_map(|e| e.ok()) {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            let device = if path.is_dir() {
                AsyncCaptureDevice::new(name.clone(), move || {
                    Ok(Box::new(FrameSequenceSource::from_directory(&path, true)?)
                        as BoxedVideoSource)
                })
            } else if source::is_image_file(&path) {
                AsyncCaptureDevice::new(name.clone(), move || {
                    Ok(Box::new(StillImageSource::open(&path)?) as BoxedVideoSource)
                })
            } else {
                continue;
            };

            self.register_device(name, Box::new(device));
            count += 1;
        }

        log::info!("Discovered {} capture devices under {:?}", count, root);
        Ok(count)
    }

    /// Register one device per camera found on the system
    ///
    /// Releases the active device first. Returns the number of cameras found.
    #[cfg(feature = "camera")]
    pub fn auto_register_devices(&mut self) -> Result<usize> {
        self.release_active();
        let cameras = camera::list_cameras()?;
        for (index, human_name) in &cameras {
            let index = *index;
            let name = camera::device_name(index, human_name);
            let device = AsyncCaptureDevice::new(name.clone(), move || {
                Ok(Box::new(CameraSource::open(index)?) as BoxedVideoSource)
            });
            self.register_device(name, Box::new(device));
        }
        log::info!("Registered {} cameras", cameras.len());
        Ok(cameras.len())
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Replace the settings used by the next `set_active`
    pub fn set_settings(&mut self, settings: CaptureSettings) {
        self.settings = settings;
    }

    /// Register (or replace) a device under `name`
    pub fn register_device(&mut self, name: impl Into<String>, device: BoxedCaptureDevice) {
        let name = name.into();
        if self.active.as_deref() == Some(name.as_str()) {
            self.release_active();
        }
        self.devices.insert(name, device);
    }

    /// Registered device names, sorted
    pub fn list_devices(&self) -> Vec<String> {
        let mut names: Vec<String> = self.devices.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_device(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    /// Make `name` the active device
    ///
    /// The previous device is released before the new one is initialized.
    /// If initialization fails no device is active.
    pub fn set_active(&mut self, name: &str) -> Result<()> {
        if !self.devices.contains_key(name) {
            return Err(MacroError::DeviceNotRegistered(name.to_string()));
        }
        self.release_active();

        let device = self
            .devices
            .get_mut(name)
            .ok_or_else(|| MacroError::DeviceNotRegistered(name.to_string()))?;
        device.initialize(&self.settings)?;
        self.active = Some(name.to_string());
        log::info!("Capture device '{}' active", name);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// The active device, or the dummy device when none is active
    pub fn active_device(&self) -> &dyn CaptureDevice {
        match self.active.as_ref().and_then(|n| self.devices.get(n)) {
            Some(device) => &**device,
            None => &self.dummy,
        }
    }

    /// The active device without the dummy fallback
    pub fn try_active_device(&self) -> Result<&dyn CaptureDevice> {
        self.active
            .as_ref()
            .and_then(|n| self.devices.get(n))
            .map(|d| &**d as &dyn CaptureDevice)
            .ok_or(MacroError::NoActiveDevice("capture"))
    }

    /// Latest frame of the active device
    pub fn get_frame(&self) -> Result<CaptureFrame> {
        self.active_device().get_frame()
    }

    /// Release and deactivate the active device
    pub fn release_active(&mut self) {
        if let Some(name) = self.active.take() {
            if let Some(device) = self.devices.get_mut(&name) {
                device.release();
            }
            log::debug!("Capture device '{}' released", name);
        }
    }
}

impl Default for CaptureManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        self.release_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records lifecycle calls and serves a fixed frame once initialized
    struct ScriptedDevice {
        name: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
        ready: bool,
    }

    impl ScriptedDevice {
        fn boxed(name: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> BoxedCaptureDevice {
            Box::new(Self {
                name,
                journal: journal.clone(),
                ready: false,
            })
        }
    }

    impl CaptureDevice for ScriptedDevice {
        fn name(&self) -> &str {
            self.name
        }

        fn initialize(&mut self, settings: &CaptureSettings) -> Result<()> {
            self.ready = true;
            self.journal
                .lock()
                .push(format!("init {} {}x{}", self.name, settings.width, settings.height));
            Ok(())
        }

        fn get_frame(&self) -> Result<CaptureFrame> {
            if !self.ready {
                return Err(MacroError::FrameNotReady(self.name.to_string()));
            }
            Ok(CaptureFrame::new(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])), 1))
        }

        fn release(&mut self) {
            if self.ready {
                self.ready = false;
                self.journal.lock().push(format!("release {}", self.name));
            }
        }
    }

    #[test]
    fn test_poll_interval_floor() {
        let fast = CaptureSettings::default();
        assert!(fast.poll_interval() < Duration::from_millis(20));

        let slow = CaptureSettings {
            fps: 2.0,
            ..CaptureSettings::default()
        };
        assert_eq!(slow.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_dummy_is_total() {
        let manager = CaptureManager::new();
        let frame = manager.get_frame().unwrap();
        assert_eq!(frame.width(), CANONICAL_WIDTH);
        assert!(matches!(
            manager.try_active_device(),
            Err(MacroError::NoActiveDevice("capture"))
        ));
    }

    #[test]
    fn test_switch_releases_previous_first() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut manager = CaptureManager::new();
        manager.register_device("cam0", ScriptedDevice::boxed("cam0", &journal));
        manager.register_device("cam1", ScriptedDevice::boxed("cam1", &journal));

        manager.set_active("cam0").unwrap();
        assert_eq!(manager.get_frame().unwrap().image().get_pixel(0, 0), &Rgb([1, 2, 3]));
        manager.set_active("cam1").unwrap();
        assert!(manager.set_active("cam9").is_err());
        assert_eq!(manager.active_name(), Some("cam1"));

        drop(manager);
        assert_eq!(
            *journal.lock(),
            vec![
                "init cam0 1280x720",
                "release cam0",
                "init cam1 1280x720",
                "release cam1"
            ]
        );
    }

    #[test]
    fn test_activation_uses_current_settings() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut manager = CaptureManager::with_settings(CaptureSettings {
            width: 640,
            height: 360,
            ..CaptureSettings::default()
        });
        manager.register_device("cam0", ScriptedDevice::boxed("cam0", &journal));
        manager.set_active("cam0").unwrap();

        manager.set_settings(CaptureSettings {
            width: 1920,
            height: 1080,
            ..CaptureSettings::default()
        });
        assert_eq!(manager.settings().width, 1920);
        manager.set_active("cam0").unwrap();

        assert_eq!(
            *journal.lock(),
            vec!["init cam0 640x360", "release cam0", "init cam0 1920x1080"]
        );
    }

    #[test]
    fn test_discovered_still_is_scaled_to_settings() {
        let root = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(8, 8, Rgb([9, 9, 9]))
            .save(root.path().join("title.png"))
            .unwrap();

        let mut manager = CaptureManager::with_settings(CaptureSettings {
            width: 32,
            height: 18,
            ..CaptureSettings::default()
        });
        manager.discover(root.path()).unwrap();
        manager.set_active("title.png").unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let frame = loop {
            if let Ok(frame) = manager.get_frame() {
                break frame;
            }
            assert!(std::time::Instant::now() < deadline, "no frame within 5s");
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!((frame.width(), frame.height()), (32, 18));
        assert_eq!(frame.image().get_pixel(16, 9), &Rgb([9, 9, 9]));
    }

    #[test]
    fn test_frames_per_poll_is_at_least_one() {
        let unbuffered = CaptureSettings {
            buffer_size: 0,
            ..CaptureSettings::default()
        };
        assert_eq!(unbuffered.frames_per_poll(), 1);
        assert_eq!(
            CaptureSettings {
                buffer_size: 4,
                ..CaptureSettings::default()
            }
            .frames_per_poll(),
            4
        );
    }

    #[test]
    fn test_discover_registers_sequences_and_stills() {
        let root = tempfile::tempdir().unwrap();
        let seq = root.path().join("recording");
        std::fs::create_dir(&seq).unwrap();
        RgbImage::new(4, 4).save(seq.join("0001.png")).unwrap();
        RgbImage::new(4, 4).save(root.path().join("title.png")).unwrap();
        std::fs::write(root.path().join("readme.txt"), "skip").unwrap();

        let mut manager = CaptureManager::new();
        assert_eq!(manager.discover(root.path()).unwrap(), 2);
        assert_eq!(manager.list_devices(), vec!["recording", "title.png"]);
    }
}
