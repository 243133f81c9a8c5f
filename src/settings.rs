//! Session configuration and macro arguments
//!
//! Both are TOML: the session file selects devices and directories, and
//! each macro may keep persisted arguments in `<static>/<macro>/settings.toml`.

use crate::hardware::capture::CaptureSettings;
use crate::hardware::serial::DEFAULT_BAUD;
use crate::protocol::ProtocolKind;
use crate::{MacroError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Arguments handed to a macro's `initialize`
pub type MacroArgs = toml::Table;

/// File name of persisted per-macro settings
pub const MACRO_SETTINGS_FILE: &str = "settings.toml";

/// Device selection and directories for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capture device name; empty keeps the blank dummy device
    pub capture_device: String,
    /// Serial device name; empty keeps the no-op dummy device
    pub serial_device: String,
    pub serial_baud: u32,
    /// "CH552" or "PokeCon"
    pub serial_protocol: String,
    /// Root for saved images and per-macro settings
    pub static_dir: PathBuf,
    /// Directory scanned for macro scripts
    pub macros_dir: PathBuf,
    pub capture: CaptureSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture_device: String::new(),
            serial_device: String::new(),
            serial_baud: DEFAULT_BAUD,
            serial_protocol: ProtocolKind::default().name().to_string(),
            static_dir: PathBuf::from("static"),
            macros_dir: PathBuf::from("macros"),
            capture: CaptureSettings::default(),
        }
    }
}

impl SessionConfig {
    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No session config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Path of the persisted settings for `macro_name`
pub fn macro_settings_path(static_dir: &Path, macro_name: &str) -> PathBuf {
    static_dir.join(macro_name).join(MACRO_SETTINGS_FILE)
}

/// Load persisted arguments for `macro_name`; empty when none are stored
pub fn load_macro_settings(static_dir: &Path, macro_name: &str) -> Result<MacroArgs> {
    let path = macro_settings_path(static_dir, macro_name);
    if !path.is_file() {
        return Ok(MacroArgs::new());
    }
    let text = std::fs::read_to_string(&path)?;
    let args: MacroArgs = toml::from_str(&text)?;
    log::debug!("Loaded {} settings for macro '{}'", args.len(), macro_name);
    Ok(args)
}

/// Shallow merge; keys in `overrides` win
pub fn merge_args(persisted: &MacroArgs, overrides: &MacroArgs) -> MacroArgs {
    let mut merged = persisted.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Parse `key=value` defines into nested arguments
///
/// Values use TOML syntax (`3`, `true`, `[1, 2]`, `"text"`); anything that
/// is not a valid TOML value is kept as a plain string. Dotted keys
/// (`a.b=1`) create nested tables.
pub fn parse_define_args<S: AsRef<str>>(defines: &[S]) -> Result<MacroArgs> {
    let mut args = MacroArgs::new();
    for define in defines {
        let define = define.as_ref();
        let (key, raw) = define
            .split_once('=')
            .ok_or_else(|| MacroError::Config(format!("define '{}' is not key=value", define)))?;

        let path: Vec<&str> = key.trim().split('.').map(str::trim).collect();
        if path.iter().any(|p| p.is_empty()) {
            return Err(MacroError::Config(format!("define '{}' has an empty key", define)));
        }
        insert_nested(&mut args, &path, parse_value(raw.trim()), define)?;
    }
    Ok(args)
}

fn parse_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("value = {}", raw))
        .ok()
        .and_then(|mut t| t.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

fn insert_nested(
    table: &mut MacroArgs,
    path: &[&str],
    value: toml::Value,
    define: &str,
) -> Result<()> {
    match path {
        [] => Ok(()),
        [last] => {
            table.insert(last.to_string(), value);
            Ok(())
        }
        [head, rest @ ..] => {
            let entry = table
                .entry(head.to_string())
                .or_insert_with(|| toml::Value::Table(MacroArgs::new()));
            match entry {
                toml::Value::Table(inner) => insert_nested(inner, rest, value, define),
                _ => Err(MacroError::Config(format!(
                    "define '{}' conflicts with an existing value for '{}'",
                    define, head
                ))),
            }
        }
    }
}
