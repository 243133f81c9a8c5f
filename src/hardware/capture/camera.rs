//! Camera-backed video sources
//!
//! Cameras are registered as `"<index>: <name>"`, so two capture cards with
//! the same model name stay distinct. The native backend is only built with
//! the `camera` feature.

/// Registry name of the camera at `index`
pub fn device_name(index: u32, human_name: &str) -> String {
    format!("{}: {}", index, human_name)
}

#[cfg(feature = "camera")]
pub use native::{list_cameras, CameraSource};

#[cfg(feature = "camera")]
mod native {
    use super::super::source::VideoSource;
    use super::super::CaptureSettings;
    use crate::{MacroError, Result};
    use image::RgbImage;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
    use nokhwa::{Camera, NokhwaError};

    fn open_error(index: u32, e: NokhwaError) -> MacroError {
        MacroError::DeviceOpen {
            device: format!("camera {}", index),
            reason: e.to_string(),
        }
    }

    /// Index and human-readable name of every camera the OS reports
    pub fn list_cameras() -> Result<Vec<(u32, String)>> {
        let cameras = nokhwa::query(ApiBackend::Auto).map_err(|e| MacroError::DeviceOpen {
            device: "cameras".to_string(),
            reason: e.to_string(),
        })?;

        Ok(cameras
            .iter()
            .filter_map(|info| match info.index().as_index() {
                Ok(index) => Some((index, info.human_name())),
                Err(e) => {
                    log::debug!("Skipping camera '{}': {}", info.human_name(), e);
                    None
                }
            })
            .collect())
    }

    /// A camera or capture card opened through the native backend
    pub struct CameraSource {
        index: u32,
        camera: Camera,
        frames_per_poll: u32,
    }

    impl CameraSource {
        pub fn open(index: u32) -> Result<Self> {
            let format =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
            let camera = Camera::new(CameraIndex::Index(index), format)
                .map_err(|e| open_error(index, e))?;
            log::debug!("Camera {} opened: {}", index, camera.info().human_name());
            Ok(Self {
                index,
                camera,
                frames_per_poll: 1,
            })
        }

        pub fn index(&self) -> u32 {
            self.index
        }
    }

    impl VideoSource for CameraSource {
        fn configure(&mut self, settings: &CaptureSettings) -> Result<()> {
            self.frames_per_poll = settings.frames_per_poll();

            let requested = Resolution::new(settings.width, settings.height);
            if let Err(e) = self.camera.set_resolution(requested) {
                log::warn!(
                    "Camera {}: {}x{} not accepted: {}",
                    self.index,
                    settings.width,
                    settings.height,
                    e
                );
            }
            let fps = settings.fps.round().max(1.0) as u32;
            if let Err(e) = self.camera.set_frame_rate(fps) {
                log::warn!("Camera {}: {} fps not accepted: {}", self.index, fps, e);
            }

            log::info!(
                "Camera {} streaming {} at {} fps",
                self.index,
                self.camera.resolution(),
                self.camera.frame_rate()
            );
            Ok(())
        }

        fn read(&mut self) -> Result<Option<RgbImage>> {
            if !self.camera.is_stream_open() {
                self.camera
                    .open_stream()
                    .map_err(|e| open_error(self.index, e))?;
            }

            // Drain queued frames so the cache holds the newest one
            let mut buffer = None;
            for _ in 0..self.frames_per_poll {
                buffer = Some(self.camera.frame().map_err(|e| open_error(self.index, e))?);
            }
            let Some(buffer) = buffer else {
                return Ok(None);
            };

            let decoded = buffer
                .decode_image::<RgbFormat>()
                .map_err(|e| open_error(self.index, e))?;
            let (width, height) = (decoded.width(), decoded.height());
            Ok(RgbImage::from_raw(width, height, decoded.into_raw()))
        }

        fn release(&mut self) {
            if self.camera.is_stream_open() {
                if let Err(e) = self.camera.stop_stream() {
                    log::warn!("Camera {}: failed to stop stream: {}", self.index, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_names_keep_index() {
        assert_eq!(device_name(0, "USB Video"), "0: USB Video");
        assert_ne!(device_name(0, "USB Video"), device_name(1, "USB Video"));
    }
}
