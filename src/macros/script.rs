//! Rhai script macros
//!
//! Every `*.rhai` file in the macro directory becomes a macro named after
//! the file stem. Scripts call into the command surface through the
//! functions below.
//!
//! # Script API
//!
//! ## Required Functions
//! - `run()` - Macro body
//!
//! ## Optional Functions
//! - `initialize(args)` or `initialize()` - Called before `run`; `args` is a map
//! - `finalize()` - Called once after `run`, even when it failed
//! - `description()` - Returns a description string
//! - `tags()` - Returns an array of tag strings
//!
//! ## Keys
//! - `button(name)` - e.g. `button("A")`, `button("ZR")`
//! - `hat(name)` - e.g. `hat("UP_LEFT")`
//! - `lstick(degrees, magnitude)` / `rstick(degrees, magnitude)`
//!
//! ## Controller
//! - `press(keys)`, `press(keys, dur)`, `press(keys, dur, wait)` - `keys` is
//!   a key or an array of keys, times in seconds
//! - `hold(keys)`, `release(keys)`, `release()`
//! - `wait(seconds)`
//!
//! ## Keyboard
//! - `keyboard(text)` - Type text
//! - `type_key(name)` - A single character or a special key name ("ENTER")
//!
//! ## Capture
//! - `capture()`, `capture(x, y, w, h)`, `capture(x, y, w, h, grayscale)`
//! - `capture_size()` - `[width, height]` of a capture
//! - `img.width`, `img.height`, `pixel(img, x, y)` - `[r, g, b]` or `[luma]`
//! - `save_capture(name)`, `save_img(name, img)`, `load_img(name)`
//!
//! ## Misc
//! - `notify(text)`, `notify(text, img)`
//! - `log(message)`, `log(level, message)`
//! - `stop()` - End the macro as stopped
//! - `get_var(name)` / `set_var(name, value)` - Values kept for the run

use super::{BoxedMacro, Macro, MacroArgs, MacroFactory};
use crate::command::{Command, CropRegion, SharedCommand, DEFAULT_PRESS_DURATION, DEFAULT_PRESS_WAIT};
use crate::input::{Button, Hat, Key, KeyboardKey, SpecialKey, StickPosition};
use crate::{MacroError, Result};
use image::{DynamicImage, GenericImageView};
use parking_lot::{Mutex, RwLock};
use rhai::{Array, Dynamic, Engine as RhaiVM, EvalAltResult, Map, Scope, AST};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// File extension of macro scripts
pub const SCRIPT_EXTENSION: &str = "rhai";

type ScriptResult<T> = std::result::Result<T, Box<EvalAltResult>>;

/// Error raised by a bound command function, kept so it can be returned
/// unchanged once the script unwinds
type FailureSlot = Arc<Mutex<Option<MacroError>>>;

fn new_vm() -> RhaiVM {
    let mut vm = RhaiVM::new();

    // Macros loop for hours; only bound nesting and sizes
    vm.set_max_expr_depths(64, 64);
    vm.set_max_call_levels(32);
    vm.set_max_string_size(100_000);
    vm.set_max_array_size(100_000);
    vm.set_max_map_size(10_000);

    vm.register_type_with_name::<Key>("Key");
    vm.register_type_with_name::<DynamicImage>("Image");
    vm
}

fn compile(vm: &RhaiVM, source: &str) -> Result<AST> {
    vm.compile(source)
        .map_err(|e| MacroError::Script(format!("Compilation error: {}", e)))
}

fn has_function(ast: &AST, name: &str) -> bool {
    ast.iter_functions().any(|f| f.name == name)
}

fn function_arity(ast: &AST, name: &str) -> Option<usize> {
    ast.iter_functions()
        .find(|f| f.name == name)
        .map(|f| f.params.len())
}

// =============================================================================
// FACTORY
// =============================================================================

/// Factory for one script file
pub struct ScriptMacroFactory {
    name: String,
    path: PathBuf,
    source: Arc<str>,
    description: String,
    tags: Vec<String>,
}

impl ScriptMacroFactory {
    /// Read and compile `path`; the macro is named after the file stem
    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| MacroError::InvalidPath(path.display().to_string()))?
            .to_string();
        let source = std::fs::read_to_string(path)?;
        Self::from_source(name, path.to_path_buf(), source)
    }

    /// Compile `source` and read its metadata functions
    pub fn from_source(name: impl Into<String>, path: PathBuf, source: String) -> Result<Self> {
        let name = name.into();
        let vm = new_vm();
        let ast = compile(&vm, &source)?;

        if !has_function(&ast, "run") {
            return Err(MacroError::Script(format!("{}: missing run() function", name)));
        }

        let description = if has_function(&ast, "description") {
            vm.call_fn::<Dynamic>(&mut Scope::new(), &ast, "description", ())
                .ok()
                .and_then(|d| d.into_string().ok())
                .unwrap_or_default()
        } else {
            String::new()
        };

        let tags = if has_function(&ast, "tags") {
            vm.call_fn::<Dynamic>(&mut Scope::new(), &ast, "tags", ())
                .ok()
                .and_then(|d| d.try_cast::<Array>())
                .map(|items| items.into_iter().filter_map(|t| t.into_string().ok()).collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        log::debug!("Loaded script macro '{}' from {:?}", name, path);
        Ok(Self {
            name,
            path,
            source: source.into(),
            description,
            tags,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MacroFactory for ScriptMacroFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn tags(&self) -> Vec<String> {
        self.tags.clone()
    }

    fn create(&self) -> Result<BoxedMacro> {
        Ok(Box::new(ScriptMacro::new(
            self.name.clone(),
            &self.source,
            self.description.clone(),
            self.tags.clone(),
        )?))
    }
}

// =============================================================================
// MACRO
// =============================================================================

/// One execution of a Rhai script
pub struct ScriptMacro {
    name: String,
    description: String,
    tags: Vec<String>,
    ast: AST,
    /// Built on first use, once the command is known
    vm: Option<RhaiVM>,
    variables: Arc<RwLock<HashMap<String, Dynamic>>>,
    failure: FailureSlot,
}

impl ScriptMacro {
    pub fn new(
        name: String,
        source: &str,
        description: String,
        tags: Vec<String>,
    ) -> Result<Self> {
        let ast = compile(&new_vm(), source)?;
        Ok(Self {
            name,
            description,
            tags,
            ast,
            vm: None,
            variables: Arc::new(RwLock::new(HashMap::new())),
            failure: Arc::new(Mutex::new(None)),
        })
    }

    fn vm(&mut self, cmd: &SharedCommand) -> &RhaiVM {
        let variables = self.variables.clone();
        let failure = self.failure.clone();
        self.vm
            .get_or_insert_with(|| build_vm(cmd.clone(), variables, failure))
    }

    /// Call a script function, recovering the command error that aborted it
    fn call(&mut self, cmd: &SharedCommand, fn_name: &str, args: Vec<Dynamic>) -> Result<()> {
        self.failure.lock().take();
        let ast = self.ast.clone();
        let result = self
            .vm(cmd)
            .call_fn::<Dynamic>(&mut Scope::new(), &ast, fn_name, args);

        let cause = self.failure.lock().take();
        match result {
            Ok(_) => Ok(()),
            Err(err) => match cause {
                Some(cause) if aborted_by(&err, &cause) => Err(cause),
                _ => Err(MacroError::Script(format!("{}.{}: {}", self.name, fn_name, err))),
            },
        }
    }
}

/// Whether `err` is the unwinding of `cause`, rather than a later failure
/// raised after the script caught `cause`
fn aborted_by(err: &EvalAltResult, cause: &MacroError) -> bool {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => aborted_by(inner, cause),
        EvalAltResult::ErrorTerminated(..) => true,
        EvalAltResult::ErrorRuntime(value, _) => {
            value.is_string() && value.to_string() == cause.to_string()
        }
        _ => false,
    }
}

impl Macro for ScriptMacro {
    fn initialize(&mut self, cmd: &SharedCommand, args: &MacroArgs) -> Result<()> {
        match function_arity(&self.ast, "initialize") {
            Some(0) => self.call(cmd, "initialize", Vec::new()),
            Some(_) => self.call(cmd, "initialize", vec![Dynamic::from_map(args_to_map(args))]),
            None => Ok(()),
        }
    }

    fn run(&mut self, cmd: &SharedCommand) -> Result<()> {
        self.call(cmd, "run", Vec::new())
    }

    fn finalize(&mut self, cmd: &SharedCommand) -> Result<()> {
        if has_function(&self.ast, "finalize") {
            self.call(cmd, "finalize", Vec::new())
        } else {
            Ok(())
        }
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn tags(&self) -> Vec<String> {
        self.tags.clone()
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

fn args_to_map(args: &MacroArgs) -> Map {
    args.iter()
        .map(|(k, v)| (k.as_str().into(), toml_to_dynamic(v)))
        .collect()
}

fn toml_to_dynamic(value: &toml::Value) -> Dynamic {
    match value {
        toml::Value::String(s) => Dynamic::from(s.clone()),
        toml::Value::Integer(i) => Dynamic::from(*i),
        toml::Value::Float(f) => Dynamic::from(*f),
        toml::Value::Boolean(b) => Dynamic::from(*b),
        toml::Value::Datetime(d) => Dynamic::from(d.to_string()),
        toml::Value::Array(items) => {
            Dynamic::from_array(items.iter().map(toml_to_dynamic).collect())
        }
        toml::Value::Table(table) => Dynamic::from_map(args_to_map(table)),
    }
}

fn number(value: &Dynamic) -> Option<f64> {
    value
        .as_float()
        .ok()
        .or_else(|| value.as_int().ok().map(|i| i as f64))
}

fn seconds(value: &Dynamic) -> Result<Duration> {
    number(value)
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or_else(|| {
            MacroError::InvalidArgument(format!(
                "expected a non-negative number of seconds, got {}",
                value
            ))
        })
}

fn keys_of(value: Dynamic) -> ScriptResult<Vec<Key>> {
    if value.is::<Key>() {
        return Ok(vec![value.cast::<Key>()]);
    }
    match value.try_cast::<Array>() {
        Some(items) => items
            .into_iter()
            .map(|item| {
                item.try_cast::<Key>()
                    .ok_or_else(|| "key arrays may only contain keys".into())
            })
            .collect(),
        None => Err("expected a key or an array of keys".into()),
    }
}

fn stick(degrees: &Dynamic, magnitude: &Dynamic) -> ScriptResult<StickPosition> {
    match (number(degrees), number(magnitude)) {
        (Some(d), Some(m)) => Ok(StickPosition::from_degrees(d, m)),
        _ => Err("stick angle and magnitude must be numbers".into()),
    }
}

fn keyboard_key(name: &str) -> ScriptResult<KeyboardKey> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return KeyboardKey::char(c).map_err(|e| e.to_string().into());
    }
    SpecialKey::from_str(name)
        .map(KeyboardKey::from)
        .map_err(|e| e.into())
}

fn crop(x: i64, y: i64, w: i64, h: i64) -> Result<CropRegion> {
    let part = |v: i64| {
        u32::try_from(v).map_err(|_| MacroError::InvalidArgument(format!("crop value {}", v)))
    };
    Ok(CropRegion::new(part(x)?, part(y)?, part(w)?, part(h)?))
}

fn pixel(img: &DynamicImage, x: i64, y: i64) -> ScriptResult<Array> {
    let (px, py) = match (u32::try_from(x), u32::try_from(y)) {
        (Ok(px), Ok(py)) if px < img.width() && py < img.height() => (px, py),
        _ => return Err(format!("pixel ({}, {}) outside the image", x, y).into()),
    };
    let channels = match img {
        DynamicImage::ImageLuma8(gray) => vec![gray.get_pixel(px, py)[0]],
        _ => img.get_pixel(px, py).0[..3].to_vec(),
    };
    Ok(channels.into_iter().map(|c| Dynamic::from(c as i64)).collect())
}

// =============================================================================
// BINDINGS
// =============================================================================

/// Store a command error and turn it into a script error
fn bridge<T>(failure: &FailureSlot, result: Result<T>) -> ScriptResult<T> {
    result.map_err(|e| {
        let message = e.to_string();
        *failure.lock() = Some(e);
        message.into()
    })
}

fn build_vm(
    cmd: SharedCommand,
    variables: Arc<RwLock<HashMap<String, Dynamic>>>,
    failure: FailureSlot,
) -> RhaiVM {
    let mut vm = new_vm();

    // Terminate pure compute loops once a stop is requested
    let token = cmd.cancellation().clone();
    let f = failure.clone();
    vm.on_progress(move |_ops| {
        if token.stop_requested() {
            *f.lock() = Some(MacroError::MacroStopped);
            Some(Dynamic::UNIT)
        } else {
            None
        }
    });

    register_key_functions(&mut vm);
    register_controller_functions(&mut vm, &cmd, &failure);
    register_capture_functions(&mut vm, &cmd, &failure);
    register_misc_functions(&mut vm, &cmd, &failure, variables);
    vm
}

fn register_key_functions(vm: &mut RhaiVM) {
    vm.register_fn("button", |name: &str| -> ScriptResult<Key> {
        Button::from_str(name).map(Key::Button).map_err(|e| e.into())
    });
    vm.register_fn("hat", |name: &str| -> ScriptResult<Key> {
        Hat::from_str(name).map(Key::Hat).map_err(|e| e.into())
    });
    vm.register_fn("lstick", |deg: Dynamic, mag: Dynamic| -> ScriptResult<Key> {
        stick(&deg, &mag).map(Key::LStick)
    });
    vm.register_fn("rstick", |deg: Dynamic, mag: Dynamic| -> ScriptResult<Key> {
        stick(&deg, &mag).map(Key::RStick)
    });
    vm.register_fn("to_string", |key: &mut Key| key.to_string());
}

fn register_controller_functions(vm: &mut RhaiVM, cmd: &SharedCommand, failure: &FailureSlot) {
    // press(keys), press(keys, dur), press(keys, dur, wait)
    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("press", move |keys: Dynamic| -> ScriptResult<()> {
        let keys = keys_of(keys)?;
        bridge(&f, c.press(&keys, DEFAULT_PRESS_DURATION, DEFAULT_PRESS_WAIT))
    });
    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("press", move |keys: Dynamic, dur: Dynamic| -> ScriptResult<()> {
        let keys = keys_of(keys)?;
        let dur = bridge(&f, seconds(&dur))?;
        bridge(&f, c.press(&keys, dur, DEFAULT_PRESS_WAIT))
    });
    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn(
        "press",
        move |keys: Dynamic, dur: Dynamic, wait: Dynamic| -> ScriptResult<()> {
            let keys = keys_of(keys)?;
            let (dur, wait) = (bridge(&f, seconds(&dur))?, bridge(&f, seconds(&wait))?);
            bridge(&f, c.press(&keys, dur, wait))
        },
    );

    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("hold", move |keys: Dynamic| -> ScriptResult<()> {
        let keys = keys_of(keys)?;
        bridge(&f, c.hold(&keys))
    });

    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("release", move |keys: Dynamic| -> ScriptResult<()> {
        let keys = keys_of(keys)?;
        bridge(&f, c.release(&keys))
    });
    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("release", move || -> ScriptResult<()> { bridge(&f, c.release(&[])) });

    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("wait", move |secs: Dynamic| -> ScriptResult<()> {
        let duration = bridge(&f, seconds(&secs))?;
        bridge(&f, c.wait(duration))
    });

    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("keyboard", move |text: &str| -> ScriptResult<()> {
        bridge(&f, c.keyboard(text))
    });

    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("type_key", move |name: &str| -> ScriptResult<()> {
        let key = keyboard_key(name)?;
        bridge(&f, c.type_key(key))
    });
}

fn register_capture_functions(vm: &mut RhaiVM, cmd: &SharedCommand, failure: &FailureSlot) {
    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("capture", move || -> ScriptResult<DynamicImage> {
        bridge(&f, c.capture(None, false))
    });
    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn(
        "capture",
        move |x: i64, y: i64, w: i64, h: i64| -> ScriptResult<DynamicImage> {
            let region = bridge(&f, crop(x, y, w, h))?;
            bridge(&f, c.capture(Some(region), false))
        },
    );
    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn(
        "capture",
        move |x: i64, y: i64, w: i64, h: i64, grayscale: bool| -> ScriptResult<DynamicImage> {
            let region = bridge(&f, crop(x, y, w, h))?;
            bridge(&f, c.capture(Some(region), grayscale))
        },
    );
    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("capture_size", move || -> ScriptResult<Array> {
        let img = bridge(&f, c.capture(None, false))?;
        Ok(vec![
            Dynamic::from(img.width() as i64),
            Dynamic::from(img.height() as i64),
        ])
    });

    vm.register_get("width", |img: &mut DynamicImage| img.width() as i64);
    vm.register_get("height", |img: &mut DynamicImage| img.height() as i64);
    vm.register_fn("pixel", |img: &mut DynamicImage, x: i64, y: i64| {
        pixel(img, x, y)
    });

    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("save_capture", move |name: &str| -> ScriptResult<()> {
        let img = bridge(&f, c.capture(None, false))?;
        bridge(&f, c.save_img(name, &img))
    });
    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn(
        "save_img",
        move |name: &str, img: DynamicImage| -> ScriptResult<()> { bridge(&f, c.save_img(name, &img)) },
    );
    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("load_img", move |name: &str| -> ScriptResult<DynamicImage> {
        bridge(&f, c.load_img(name, false))
    });
}

fn register_misc_functions(
    vm: &mut RhaiVM,
    cmd: &SharedCommand,
    failure: &FailureSlot,
    variables: Arc<RwLock<HashMap<String, Dynamic>>>,
) {
    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("notify", move |text: &str| -> ScriptResult<()> {
        bridge(&f, c.notify(text, None))
    });
    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn(
        "notify",
        move |text: &str, img: DynamicImage| -> ScriptResult<()> {
            bridge(&f, c.notify(text, Some(&img)))
        },
    );

    let (c, f) = (cmd.clone(), failure.clone());
    vm.register_fn("stop", move || -> ScriptResult<()> { bridge(&f, c.stop()) });

    let c = cmd.clone();
    vm.register_fn("log", move |message: &str| {
        c.log(log::Level::Info, message);
    });
    let c = cmd.clone();
    vm.register_fn("log", move |level: &str, message: &str| {
        let level = log::Level::from_str(level).unwrap_or(log::Level::Info);
        c.log(level, message);
    });

    // get_var(name) -> Dynamic
    let v = variables.clone();
    vm.register_fn("get_var", move |name: &str| -> Dynamic {
        v.read().get(name).cloned().unwrap_or(Dynamic::UNIT)
    });

    // set_var(name, value)
    let v = variables;
    vm.register_fn("set_var", move |name: &str, value: Dynamic| {
        v.write().insert(name.to_string(), value);
    });
}
