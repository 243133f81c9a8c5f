//! Notification sinks
//!
//! Macros report progress through `Command::notify`, which fans out to every
//! registered `Notifier`. A failing sink is logged and skipped.

use crate::Result;
use image::DynamicImage;

/// A destination for macro notifications (chat webhook, desktop toast, ...)
pub trait Notifier: Send + Sync {
    /// Short name used in log messages
    fn name(&self) -> &str;

    /// Deliver `text`, with an optional screenshot attached
    fn notify(&self, text: &str, image: Option<&DynamicImage>) -> Result<()>;
}

/// Boxed notifier type
pub type BoxedNotifier = Box<dyn Notifier>;

/// Fan-out over zero or more notifiers
pub struct NotificationHandler {
    notifiers: Vec<BoxedNotifier>,
}

impl NotificationHandler {
    pub fn new() -> Self {
        Self {
            notifiers: Vec::new(),
        }
    }

    /// Add a notifier
    pub fn add(&mut self, notifier: BoxedNotifier) {
        self.notifiers.push(notifier);
    }

    /// Builder form of `add`
    pub fn with(mut self, notifier: BoxedNotifier) -> Self {
        self.add(notifier);
        self
    }

    pub fn has_notifiers(&self) -> bool {
        !self.notifiers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Send to every notifier; returns how many succeeded
    pub fn notify(&self, text: &str, image: Option<&DynamicImage>) -> usize {
        let mut delivered = 0;
        for notifier in &self.notifiers {
            match notifier.notify(text, image) {
                Ok(()) => delivered += 1,
                Err(e) => log::error!("Notification via {} failed: {}", notifier.name(), e),
            }
        }
        delivered
    }
}

impl Default for NotificationHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes notifications to the log at INFO
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, text: &str, image: Option<&DynamicImage>) -> Result<()> {
        match image {
            Some(img) => log::info!("[notify] {} ({}x{} image)", text, img.width(), img.height()),
            None => log::info!("[notify] {}", text),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MacroError;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Notifier for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn notify(&self, text: &str, image: Option<&DynamicImage>) -> Result<()> {
            self.seen.lock().push(format!("{} {}", text, image.is_some()));
            Ok(())
        }
    }

    struct Broken;

    impl Notifier for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn notify(&self, _text: &str, _image: Option<&DynamicImage>) -> Result<()> {
            Err(MacroError::Notification {
                sink: "broken".to_string(),
                reason: "webhook returned 500".to_string(),
            })
        }
    }

    #[test]
    fn test_failure_does_not_block_other_sinks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = NotificationHandler::new()
            .with(Box::new(Broken))
            .with(Box::new(Recorder { seen: seen.clone() }))
            .with(Box::new(LogNotifier));

        assert_eq!(handler.len(), 3);
        assert_eq!(handler.notify("done", None), 2);
        let image = DynamicImage::new_rgb8(2, 2);
        assert_eq!(handler.notify("shot", Some(&image)), 2);
        assert_eq!(*seen.lock(), vec!["done false", "shot true"]);
    }

    #[test]
    fn test_empty_handler() {
        let handler = NotificationHandler::default();
        assert!(!handler.has_notifiers());
        assert_eq!(handler.notify("nobody listens", None), 0);
    }
}
