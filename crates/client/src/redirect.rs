#![forbid(unsafe_code)]

use std::sync::Mutex;
use tracing::info;

/// Opens a partner download page outside the app. Called synchronously, before the matching
/// backend request is sent.
pub trait Redirector: Send + Sync {
    fn open(&self, url: &str);
}

/// Headless default: records the hand-off in the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRedirector;

impl Redirector for LogRedirector {
    fn open(&self, url: &str) {
        info!(url, "opening partner page");
    }
}

/// Keeps every opened url; used by front ends that render links themselves.
#[derive(Debug, Default)]
pub struct RecordingRedirector {
    opened: Mutex<Vec<String>>,
}

impl RecordingRedirector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened
            .lock()
            .map(|urls| urls.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl Redirector for RecordingRedirector {
    fn open(&self, url: &str) {
        let mut urls = self
            .opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        urls.push(url.to_string());
    }
}
