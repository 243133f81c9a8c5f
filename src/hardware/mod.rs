//! Hardware layer: serial link, video capture and static resources
//!
//! `Hardware` bundles the two device registries behind shared locks so a
//! command on the macro thread and a front-end on another thread see the
//! same active devices.

pub mod capture;
pub mod resource;
pub mod serial;

pub use capture::{CaptureFrame, CaptureManager, CaptureSettings};
pub use resource::{ResourceIo, StaticResourceIO};
pub use serial::{SerialDevice, SerialManager};

use crate::settings::SessionConfig;
use crate::{MacroError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared handles to the serial and capture registries
#[derive(Clone)]
pub struct Hardware {
    serial: Arc<Mutex<SerialManager>>,
    capture: Arc<Mutex<CaptureManager>>,
}

impl Hardware {
    /// Empty registries; both fall back to their dummy devices
    pub fn new() -> Self {
        Self::from_managers(SerialManager::new(), CaptureManager::new())
    }

    pub fn from_managers(serial: SerialManager, capture: CaptureManager) -> Self {
        Self {
            serial: Arc::new(Mutex::new(serial)),
            capture: Arc::new(Mutex::new(capture)),
        }
    }

    pub fn serial(&self) -> &Arc<Mutex<SerialManager>> {
        &self.serial
    }

    pub fn capture(&self) -> &Arc<Mutex<CaptureManager>> {
        &self.capture
    }

    /// Activate the devices named in `config`
    ///
    /// Empty names leave the dummy devices in place. Both names are checked
    /// before either device is switched, so an unknown name fails with
    /// `DeviceNotFound` and leaves the previous devices active. The capture
    /// settings of `config` apply to this and later activations.
    pub fn connect(&self, config: &SessionConfig) -> Result<()> {
        let mut serial = self.serial.lock();
        let mut capture = self.capture.lock();

        if !config.serial_device.is_empty() && !serial.has_device(&config.serial_device) {
            return Err(MacroError::DeviceNotFound {
                name: config.serial_device.clone(),
                available: serial.list_devices(),
            });
        }
        if !config.capture_device.is_empty() && !capture.has_device(&config.capture_device) {
            return Err(MacroError::DeviceNotFound {
                name: config.capture_device.clone(),
                available: capture.list_devices(),
            });
        }

        capture.set_settings(config.capture.clone());
        if !config.serial_device.is_empty() {
            serial.set_active(&config.serial_device, config.serial_baud)?;
        }
        if !config.capture_device.is_empty() {
            capture.set_active(&config.capture_device)?;
        }

        log::info!(
            "Hardware connected (serial: {}, capture: {})",
            serial.active_name().unwrap_or("dummy"),
            capture.active_name().unwrap_or("dummy")
        );
        Ok(())
    }

    /// Write one frame to the active serial device
    pub fn send(&self, data: &[u8]) -> Result<()> {
        self.serial.lock().send(data)
    }

    /// Copy of the latest frame from the active capture device
    pub fn get_frame(&self) -> Result<CaptureFrame> {
        self.capture.lock().get_frame()
    }

    /// Deactivate both devices
    pub fn release(&self) -> Result<()> {
        self.capture.lock().release_active();
        self.serial.lock().close_active()
    }
}

impl Default for Hardware {
    fn default() -> Self {
        Self::new()
    }
}
