//! Capture devices
//!
//! `AsyncCaptureDevice` owns one polling thread that publishes into a
//! `FrameCache`; readers always get an independent copy of the newest frame.

use super::source::BoxedVideoSource;
use super::{CaptureFrame, CaptureSettings, CANONICAL_HEIGHT, CANONICAL_WIDTH};
use crate::{MacroError, Result};
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A named source of capture frames
pub trait CaptureDevice: Send {
    fn name(&self) -> &str;

    /// Open the source with `settings` and start producing frames
    fn initialize(&mut self, settings: &CaptureSettings) -> Result<()>;

    /// Copy of the most recent frame
    fn get_frame(&self) -> Result<CaptureFrame>;

    /// Stop producing frames and free the source; idempotent
    fn release(&mut self);
}

/// Boxed capture device type
pub type BoxedCaptureDevice = Box<dyn CaptureDevice>;

/// Lifecycle of an `AsyncCaptureDevice`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Uninitialized,
    Polling,
    Released,
}

/// Opens a fresh video source for each initialization
pub type SourceOpener = Box<dyn FnMut() -> Result<BoxedVideoSource> + Send>;

/// Latest published frame, shared between the polling thread and readers
#[derive(Clone, Default)]
pub struct FrameCache {
    latest: Arc<Mutex<Option<CaptureFrame>>>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached frame
    pub fn publish(&self, frame: CaptureFrame) {
        *self.latest.lock() = Some(frame);
    }

    /// Copy of the cached frame
    pub fn latest(&self) -> Option<CaptureFrame> {
        self.latest.lock().clone()
    }
}

/// Capture device with a dedicated polling thread
pub struct AsyncCaptureDevice {
    name: String,
    opener: SourceOpener,
    settings: CaptureSettings,
    state: CaptureState,
    cache: FrameCache,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncCaptureDevice {
    /// Create a device that opens its source through `opener`
    pub fn new<F>(name: impl Into<String>, opener: F) -> Self
    where
        F: FnMut() -> Result<BoxedVideoSource> + Send + 'static,
    {
        Self {
            name: name.into(),
            opener: Box::new(opener),
            settings: CaptureSettings::default(),
            state: CaptureState::Uninitialized,
            cache: FrameCache::new(),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Settings of the most recent initialization
    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Handle to the cache the current polling thread publishes into
    pub fn cache(&self) -> FrameCache {
        self.cache.clone()
    }
}

impl CaptureDevice for AsyncCaptureDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, settings: &CaptureSettings) -> Result<()> {
        if self.state == CaptureState::Polling {
            if *settings == self.settings {
                log::debug!("Capture device '{}' already polling", self.name);
                return Ok(());
            }
            self.release();
        }

        let mut source = (self.opener)()?;
        if let Err(e) = source.configure(settings) {
            log::warn!("Capture device '{}': configuration ignored: {}", self.name, e);
        }

        // Fresh cache and flag per initialization so a released loop can
        // never publish into the new one
        let cache = FrameCache::new();
        let running = Arc::new(AtomicBool::new(true));
        let interval = settings.poll_interval();

        let loop_name = self.name.clone();
        let loop_cache = cache.clone();
        let loop_running = running.clone();
        let handle = thread::Builder::new()
            .name(format!("capture-{}", self.name))
            .spawn(move || poll_loop(loop_name, source, loop_cache, loop_running, interval))?;

        self.settings = settings.clone();
        self.cache = cache;
        self.running = running;
        self.worker = Some(handle);
        self.state = CaptureState::Polling;

        log::info!(
            "Capture device '{}' polling every {:.1} ms",
            self.name,
            interval.as_secs_f64() * 1000.0
        );
        Ok(())
    }

    fn get_frame(&self) -> Result<CaptureFrame> {
        self.cache
            .latest()
            .ok_or_else(|| MacroError::FrameNotReady(self.name.clone()))
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("Capture thread for '{}' panicked", self.name);
            }
            log::info!("Capture device '{}' released", self.name);
        }
        if self.state != CaptureState::Uninitialized {
            self.state = CaptureState::Released;
        }
    }
}

impl Drop for AsyncCaptureDevice {
    fn drop(&mut self) {
        self.release();
    }
}

fn poll_loop(
    name: String,
    mut source: BoxedVideoSource,
    cache: FrameCache,
    running: Arc<AtomicBool>,
    interval: Duration,
) {
    let mut sequence: u64 = 0;
    let mut failures: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();

        match source.read() {
            Ok(Some(image)) => {
                sequence += 1;
                cache.publish(CaptureFrame::new(image, sequence));
                failures = 0;
            }
            Ok(None) => {}
            Err(e) => {
                failures += 1;
                if failures == 1 || failures % 100 == 0 {
                    log::warn!("Capture device '{}': read failed ({}x): {}", name, failures, e);
                }
            }
        }

        let elapsed = started.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }

    source.release();
    log::debug!("Capture loop for '{}' stopped after {} frames", name, sequence);
}

// =============================================================================
// DUMMY
// =============================================================================

/// Always-present device returning a fixed blank frame
pub struct DummyCaptureDevice {
    frame: CaptureFrame,
}

impl DummyCaptureDevice {
    pub const NAME: &'static str = "dummy";

    pub fn new() -> Self {
        Self {
            frame: CaptureFrame::new(RgbImage::new(CANONICAL_WIDTH, CANONICAL_HEIGHT), 0),
        }
    }
}

impl Default for DummyCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for DummyCaptureDevice {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn initialize(&mut self, _settings: &CaptureSettings) -> Result<()> {
        Ok(())
    }

    fn get_frame(&self) -> Result<CaptureFrame> {
        Ok(self.frame.clone())
    }

    fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::super::source::VideoSource;
    use super::*;
    use image::Rgb;
    use std::sync::atomic::AtomicU32;

    /// Produces solid frames whose shade counts the reads
    struct CountingSource {
        reads: Arc<AtomicU32>,
        released: Arc<AtomicBool>,
    }

    impl VideoSource for CountingSource {
        fn read(&mut self) -> Result<Option<RgbImage>> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            let shade = (n % 256) as u8;
            Ok(Some(RgbImage::from_pixel(64, 36, Rgb([shade, shade, shade]))))
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn at_fps(fps: f64) -> CaptureSettings {
        CaptureSettings {
            fps,
            ..CaptureSettings::default()
        }
    }

    fn counting_device() -> (AsyncCaptureDevice, Arc<AtomicU32>, Arc<AtomicBool>) {
        let reads = Arc::new(AtomicU32::new(0));
        let released = Arc::new(AtomicBool::new(false));
        let (r, rel) = (reads.clone(), released.clone());
        let device = AsyncCaptureDevice::new("counting", move || {
            Ok(Box::new(CountingSource {
                reads: r.clone(),
                released: rel.clone(),
            }) as BoxedVideoSource)
        });
        (device, reads, released)
    }

    fn wait_for_frame(device: &AsyncCaptureDevice) -> CaptureFrame {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(frame) = device.get_frame() {
                return frame;
            }
            assert!(Instant::now() < deadline, "no frame within 5s");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_frame_not_ready_before_initialize() {
        let (device, _, _) = counting_device();
        assert!(matches!(device.get_frame(), Err(MacroError::FrameNotReady(_))));
        assert_eq!(device.state(), CaptureState::Uninitialized);
    }

    #[test]
    fn test_polling_publishes_frames() {
        let (mut device, reads, released) = counting_device();
        device.initialize(&at_fps(100.0)).unwrap();
        assert_eq!(device.state(), CaptureState::Polling);

        let frame = wait_for_frame(&device);
        assert!(frame.sequence() >= 1);
        assert_eq!(frame.width(), 64);
        assert!(reads.load(Ordering::SeqCst) >= 1);

        device.release();
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(device.state(), CaptureState::Released);

        // Idempotent
        device.release();
        assert_eq!(device.state(), CaptureState::Released);
    }

    #[test]
    fn test_frames_are_stable_between_polls() {
        // 10 Hz floor leaves ~100 ms between polls
        let (mut device, _, _) = counting_device();
        device.initialize(&at_fps(1.0)).unwrap();
        let first = wait_for_frame(&device);
        let second = device.get_frame().unwrap();
        if first.sequence() == second.sequence() {
            assert_eq!(first.image().as_raw(), second.image().as_raw());
        }
        device.release();
    }

    #[test]
    fn test_concurrent_reads_never_tear() {
        let (mut device, _, _) = counting_device();
        device.initialize(&at_fps(200.0)).unwrap();
        wait_for_frame(&device);

        // Readers share the cache directly while the poll thread publishes
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = device.cache();
                thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..200 {
                        let frame = cache.latest().unwrap();
                        let first = frame.image().as_raw()[0];
                        assert!(frame.image().as_raw().iter().all(|&p| p == first));
                        assert!(frame.sequence() >= last);
                        last = frame.sequence();
                        thread::yield_now();
                    }
                    last
                })
            })
            .collect();
        for reader in readers {
            assert!(reader.join().unwrap() >= 1);
        }
        device.release();
    }

    #[test]
    fn test_initialize_applies_settings_to_source() {
        let configured = Arc::new(Mutex::new(None));
        let seen = configured.clone();
        struct Recording(Arc<Mutex<Option<CaptureSettings>>>);
        impl VideoSource for Recording {
            fn configure(&mut self, settings: &CaptureSettings) -> Result<()> {
                *self.0.lock() = Some(settings.clone());
                Ok(())
            }
            fn read(&mut self) -> Result<Option<RgbImage>> {
                Ok(None)
            }
        }
        let mut device = AsyncCaptureDevice::new("recording", move || {
            Ok(Box::new(Recording(seen.clone())) as BoxedVideoSource)
        });

        let settings = CaptureSettings {
            width: 640,
            height: 480,
            fps: 30.0,
            buffer_size: 3,
        };
        device.initialize(&settings).unwrap();
        assert_eq!(configured.lock().as_ref(), Some(&settings));
        assert_eq!(device.settings(), &settings);

        // New settings reopen the source while polling
        let faster = at_fps(120.0);
        device.initialize(&faster).unwrap();
        assert_eq!(configured.lock().as_ref(), Some(&faster));
        assert_eq!(device.state(), CaptureState::Polling);
        device.release();
    }

    #[test]
    fn test_reinitialize_after_release() {
        let (mut device, _, _) = counting_device();
        device.initialize(&at_fps(100.0)).unwrap();
        wait_for_frame(&device);
        device.release();

        device.initialize(&at_fps(100.0)).unwrap();
        assert_eq!(device.state(), CaptureState::Polling);
        assert!(wait_for_frame(&device).sequence() >= 1);
        device.release();
    }

    #[test]
    fn test_open_failure_propagates() {
        let mut device = AsyncCaptureDevice::new("broken", || {
            Err(MacroError::DeviceOpen {
                device: "broken".to_string(),
                reason: "unplugged".to_string(),
            })
        });
        assert!(matches!(device.initialize(&CaptureSettings::default()), Err(MacroError::DeviceOpen { .. })));
        assert_eq!(device.state(), CaptureState::Uninitialized);
    }

    #[test]
    fn test_dummy_returns_blank_canonical_frame() {
        let dummy = DummyCaptureDevice::new();
        let frame = dummy.get_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (CANONICAL_WIDTH, CANONICAL_HEIGHT));
        assert!(frame.image().as_raw().iter().all(|&p| p == 0));
    }
}
