//! Serial devices and the serial device registry

use crate::{MacroError, Result};
use serialport::SerialPort;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

/// Default baud rate for controller emulators
pub const DEFAULT_BAUD: u32 = 9600;

/// Write timeout for real ports
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// A serial connection to a controller emulator
pub trait SerialDevice: Send {
    /// Open the connection at `baud`
    fn open(&mut self, baud: u32) -> Result<()>;

    /// Write one frame; fails with `NotOpen` before `open`
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Close the connection; closing a closed device is a no-op
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;
}

/// Boxed serial device type
pub type BoxedSerialDevice = Box<dyn SerialDevice>;

// =============================================================================
// REAL PORT
// =============================================================================

/// A device backed by an OS serial port
pub struct SerialPortDevice {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortDevice {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            port: None,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl SerialDevice for SerialPortDevice {
    fn open(&mut self, baud: u32) -> Result<()> {
        if self.port.is_some() {
            self.close()?;
        }
        let port = serialport::new(&self.port_name, baud)
            .timeout(WRITE_TIMEOUT)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| MacroError::DeviceOpen {
                device: self.port_name.clone(),
                reason: e.to_string(),
            })?;
        log::info!("Opened serial port {} at {} baud", self.port_name, baud);
        self.port = Some(port);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| MacroError::NotOpen(self.port_name.clone()))?;
        log::trace!("{} <- {:02X?}", self.port_name, data);
        port.write_all(data)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            port.flush()?;
            log::info!("Closed serial port {}", self.port_name);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

// =============================================================================
// DUMMY
// =============================================================================

/// Device that accepts and discards everything
#[derive(Debug, Default)]
pub struct DummySerialDevice;

impl SerialDevice for DummySerialDevice {
    fn open(&mut self, _baud: u32) -> Result<()> {
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        log::trace!("dummy serial <- {:02X?}", data);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Registry of named serial devices with at most one active connection
pub struct SerialManager {
    devices: HashMap<String, BoxedSerialDevice>,
    active: Option<String>,
    dummy: DummySerialDevice,
}

impl SerialManager {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            active: None,
            dummy: DummySerialDevice,
        }
    }

    /// Register one device per serial port found on the system
    ///
    /// Closes the active device first. Returns the number of ports found.
    pub fn auto_register_devices(&mut self) -> Result<usize> {
        self.close_active()?;
        let ports = serialport::available_ports()?;
        for info in &ports {
            self.register_device(
                info.port_name.clone(),
                Box::new(SerialPortDevice::new(info.port_name.clone())),
            );
        }
        log::info!("Registered {} serial ports", ports.len());
        Ok(ports.len())
    }

    /// Register (or replace) a device under `name`
    pub fn register_device(&mut self, name: impl Into<String>, device: BoxedSerialDevice) {
        let name = name.into();
        if self.active.as_deref() == Some(name.as_str()) {
            if let Err(e) = self.close_active() {
                log::warn!("Failed to close replaced serial device '{}': {}", name, e);
            }
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

    /// Make `name` the active device, opening it at `baud`
    ///
    /// The previously active device is closed first.
    pub fn set_active(&mut self, name: &str, baud: u32) -> Result<()> {
        if !self.devices.contains_key(name) {
            return Err(MacroError::DeviceNotRegistered(name.to_string()));
        }
        self.close_active()?;

        let device = self
            .devices
            .get_mut(name)
            .ok_or_else(|| MacroError::DeviceNotRegistered(name.to_string()))?;
        device.open(baud)?;
        self.active = Some(name.to_string());
        log::info!("Serial device '{}' active at {} baud", name, baud);
        Ok(())
    }

    /// Whether a registered device is active (the dummy does not count)
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// The active device, or the dummy device when none is active
    pub fn active_device(&mut self) -> &mut dyn SerialDevice {
        match self.active.as_ref().and_then(|n| self.devices.get_mut(n)) {
            Some(device) => &mut **device,
            None => &mut self.dummy,
        }
    }

    /// The active device without the dummy fallback
    pub fn try_active_device(&mut self) -> Result<&mut dyn SerialDevice> {
        match self.active.as_ref().and_then(|n| self.devices.get_mut(n)) {
            Some(device) => Ok(&mut **device),
            None => Err(MacroError::NoActiveDevice("serial")),
        }
    }

    /// Send a frame through the active device
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        self.active_device().send(data)
    }

    /// Close and deactivate the active device
    pub fn close_active(&mut self) -> Result<()> {
        if let Some(name) = self.active.take() {
            if let Some(device) = self.devices.get_mut(&name) {
                device.close()?;
            }
            log::debug!("Serial device '{}' released", name);
        }
        Ok(())
    }
}

impl Default for SerialManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SerialManager {
    fn drop(&mut self) {
        if let Err(e) = self.close_active() {
            log::warn!("Failed to close serial device on shutdown: {}", e);
        }
    }
}
