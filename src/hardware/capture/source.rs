//! Video sources feeding the capture polling loop

use super::CaptureSettings;
use crate::{MacroError, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Image file extensions understood by the file-backed sources
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// A raw frame producer, polled from the capture thread
pub trait VideoSource: Send {
    /// Apply frame size, buffering and rate hints before the first read
    fn configure(&mut self, _settings: &CaptureSettings) -> Result<()> {
        Ok(())
    }

    /// Read the next frame; `Ok(None)` when no new frame is available
    fn read(&mut self) -> Result<Option<RgbImage>>;

    /// Free the underlying source
    fn release(&mut self) {}
}

/// Boxed video source type
pub type BoxedVideoSource = Box<dyn VideoSource>;

/// Whether `path` has one of the supported image extensions
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Scale `frame` to `width`x`height` unless it already has that size
pub fn fit_frame(frame: RgbImage, width: u32, height: u32) -> RgbImage {
    if frame.dimensions() == (width, height) || width == 0 || height == 0 {
        frame
    } else {
        imageops::resize(&frame, width, height, FilterType::Triangle)
    }
}

// =============================================================================
// FRAME SEQUENCE
// =============================================================================

/// Plays a directory of image files in file-name order
pub struct FrameSequenceSource {
    frames: Vec<PathBuf>,
    index: usize,
    loop_playback: bool,
    size: Option<(u32, u32)>,
}

impl FrameSequenceSource {
    /// Collect the image files of `dir`
    pub fn from_directory(dir: &Path, loop_playback: bool) -> Result<Self> {
        if !dir.is_dir() {
            return Err(MacroError::ResourceNotFound(dir.to_path_buf()));
        }

        let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_image_file(p))
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(MacroError::DeviceOpen {
                device: dir.display().to_string(),
                reason: "directory contains no image files".to_string(),
            });
        }

        log::debug!("Frame sequence {:?}: {} frames", dir, frames.len());
        Ok(Self {
            frames,
            index: 0,
            loop_playback,
            size: None,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl VideoSource for FrameSequenceSource {
    fn configure(&mut self, settings: &CaptureSettings) -> Result<()> {
        self.size = Some((settings.width, settings.height));
        Ok(())
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        if self.index >= self.frames.len() {
            if !self.loop_playback {
                return Ok(None);
            }
            self.index = 0;
        }
        let path = &self.frames[self.index];
        self.index += 1;
        let frame = image::open(path)?.to_rgb8();
        Ok(Some(match self.size {
            Some((width, height)) => fit_frame(frame, width, height),
            None => frame,
        }))
    }
}

// =============================================================================
// STILL IMAGE
// =============================================================================

/// Repeats a single image file
pub struct StillImageSource {
    frame: RgbImage,
}

impl StillImageSource {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(MacroError::ResourceNotFound(path.to_path_buf()));
        }
        Ok(Self {
            frame: image::open(path)?.to_rgb8(),
        })
    }

    pub fn from_image(frame: RgbImage) -> Self {
        Self { frame }
    }
}

impl VideoSource for StillImageSource {
    fn configure(&mut self, settings: &CaptureSettings) -> Result<()> {
        let frame = std::mem::take(&mut self.frame);
        self.frame = fit_frame(frame, settings.width, settings.height);
        Ok(())
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        Ok(Some(self.frame.clone()))
    }
}
