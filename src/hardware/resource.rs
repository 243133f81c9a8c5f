//! Image files under the static resource root

use crate::{MacroError, Result};
use image::DynamicImage;
use std::path::{Component, Path, PathBuf};

/// Storage for images saved and loaded by macros
pub trait ResourceIo: Send + Sync {
    /// Write `image` to `name`; the format follows the file extension
    fn save_image(&self, name: &str, image: &DynamicImage) -> Result<()>;

    /// Read `name`, as 8-bit luma when `grayscale` is set
    fn load_image(&self, name: &str, grayscale: bool) -> Result<DynamicImage>;
}

/// `ResourceIo` rooted at a directory on disk
#[derive(Debug, Clone)]
pub struct StaticResourceIO {
    root: PathBuf,
}

impl StaticResourceIO {
    /// Use `root`, which must be an existing directory
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(MacroError::ResourceNotFound(root));
        }
        if !root.is_dir() {
            return Err(MacroError::InvalidPath(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `name` under the root, rejecting anything that could escape it
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.trim().is_empty() {
            return Err(MacroError::InvalidPath("empty resource name".to_string()));
        }
        let relative = Path::new(name);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(MacroError::InvalidPath(name.to_string())),
            }
        }
        Ok(self.root.join(relative))
    }
}

impl ResourceIo for StaticResourceIO {
    fn save_image(&self, name: &str, image: &DynamicImage) -> Result<()> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        image.save(&path)?;
        log::debug!("Saved image {:?}", path);
        Ok(())
    }

    fn load_image(&self, name: &str, grayscale: bool) -> Result<DynamicImage> {
        let path = self.resolve(name)?;
        if !path.is_file() {
            return Err(MacroError::ResourceNotFound(path));
        }
        let image = image::open(&path)?;
        Ok(if grayscale {
            DynamicImage::ImageLuma8(image.to_luma8())
        } else {
            image
        })
    }
}
