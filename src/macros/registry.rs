//! Macro registry for discovering and creating macros

use super::BoxedMacro;
use crate::{MacroError, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Factory for creating macro instances
pub trait MacroFactory: Send + Sync {
    /// Unique name the macro is selected by
    fn name(&self) -> &str;

    fn description(&self) -> String {
        String::new()
    }

    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Create a fresh instance for one execution
    fn create(&self) -> Result<BoxedMacro>;
}

/// Registry of macro factories
///
/// Factories registered in code are kept across re-discovery; discovered
/// ones are rebuilt from the macro directory on every `discover`/`reload`.
pub struct MacroRegistry {
    builtin: HashMap<String, Arc<dyn MacroFactory>>,
    discovered: HashMap<String, Arc<dyn MacroFactory>>,
    macros_dir: Option<PathBuf>,
}

impl MacroRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            builtin: HashMap::new(),
            discovered: HashMap::new(),
            macros_dir: None,
        }
    }

    /// Register a factory that survives re-discovery
    pub fn register(&mut self, factory: Box<dyn MacroFactory>) {
        let name = factory.name().to_string();
        if self.builtin.insert(name.clone(), Arc::from(factory)).is_some() {
            log::warn!("Macro '{}' registered twice, keeping the latest", name);
        }
    }

    /// Scan `dir` for macro scripts, replacing earlier discoveries
    ///
    /// A missing directory registers nothing. Scripts that fail to load are
    /// logged and skipped. Returns the number of discovered macros.
    pub fn discover(&mut self, dir: &Path) -> Result<usize> {
        self.macros_dir = Some(dir.to_path_buf());
        self.discovered.clear();

        if !dir.is_dir() {
            log::warn!("Macro directory {:?} does not exist", dir);
            return Ok(0);
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        entries.sort();

        for path in entries {
            if let Some(factory) = load_factory(&path) {
                let name = factory.name().to_string();
                if self.builtin.contains_key(&name) {
                    log::warn!("Script {:?} shadows built-in macro '{}', skipped", path, name);
                    continue;
                }
                self.discovered.insert(name, factory);
            }
        }

        log::info!(
            "Discovered {} macros in {:?} ({} built-in)",
            self.discovered.len(),
            dir,
            self.builtin.len()
        );
        Ok(self.discovered.len())
    }

    /// Re-run discovery on the last scanned directory
    pub fn reload(&mut self) -> Result<usize> {
        match self.macros_dir.clone() {
            Some(dir) => self.discover(&dir),
            None => Ok(0),
        }
    }

    fn factory(&self, name: &str) -> Option<&Arc<dyn MacroFactory>> {
        self.builtin.get(name).or_else(|| self.discovered.get(name))
    }

    /// Check if a macro is registered
    pub fn has_macro(&self, name: &str) -> bool {
        self.factory(name).is_some()
    }

    /// All registered macro names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .builtin
            .keys()
            .chain(self.discovered.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.builtin.is_empty() && self.discovered.is_empty()
    }

    /// Sorted set of tags across all macros
    pub fn tags(&self) -> Vec<String> {
        let tags: BTreeSet<String> = self
            .builtin
            .values()
            .chain(self.discovered.values())
            .flat_map(|f| f.tags())
            .collect();
        tags.into_iter().collect()
    }

    /// Names of macros carrying `tag`, sorted
    pub fn names_with_tag(&self, tag: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .names()
            .into_iter()
            .filter(|n| {
                self.factory(n)
                    .map(|f| f.tags().iter().any(|t| t == tag))
                    .unwrap_or(false)
            })
            .collect();
        names.sort();
        names
    }

    pub fn description(&self, name: &str) -> Option<String> {
        self.factory(name).map(|f| f.description())
    }

    /// Create a macro instance by name
    pub fn create(&self, name: &str) -> Result<BoxedMacro> {
        match self.factory(name) {
            Some(factory) => factory.create(),
            None => Err(MacroError::MacroNotFound {
                name: name.to_string(),
                available: self.names(),
            }),
        }
    }
}

impl Default for MacroRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "rhai-scripting")]
fn load_factory(path: &Path) -> Option<Arc<dyn MacroFactory>> {
    use super::script::{ScriptMacroFactory, SCRIPT_EXTENSION};

    let is_script = path.is_file()
        && path
            .extension()
            .map(|e| e.eq_ignore_ascii_case(SCRIPT_EXTENSION))
            .unwrap_or(false);
    if !is_script {
        return None;
    }

    match ScriptMacroFactory::load(path) {
        Ok(factory) => Some(Arc::new(factory)),
        Err(e) => {
            log::error!("Failed to load macro script {:?}: {}", path, e);
            None
        }
    }
}

#[cfg(not(feature = "rhai-scripting"))]
fn load_factory(path: &Path) -> Option<Arc<dyn MacroFactory>> {
    log::trace!("Scripting disabled, ignoring {:?}", path);
    None
}
