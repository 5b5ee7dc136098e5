//! Listener that records every callback it receives.

use std::cell::RefCell;

use tessera_core::{Channel, LoadError, LoadListener};

#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    Progress {
        source: String,
        fraction: f32,
    },
    SourceLoaded {
        source: String,
        files: Vec<String>,
    },
    SourceFailed {
        source: String,
        error: LoadError,
    },
    FileLoaded {
        source: String,
        file: String,
        channel: Option<Channel>,
    },
    FileFailed {
        source: String,
        file: String,
        channel: Option<Channel>,
        error: LoadError,
    },
}

#[derive(Debug, Default)]
pub struct RecordingListener {
    events: RefCell<Vec<Recorded>>,
}

impl RecordingListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<Recorded> {
        self.events.borrow().clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// Events other than progress reports.
    #[must_use]
    pub fn outcomes(&self) -> Vec<Recorded> {
        self.events
            .borrow()
            .iter()
            .filter(|e| !matches!(e, Recorded::Progress { .. }))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn progress(&self, source: &str) -> Vec<f32> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Recorded::Progress { source: s, fraction } if s == source => Some(*fraction),
                _ => None,
            })
            .collect()
    }

    /// File names from every success callback for `source`.
    #[must_use]
    pub fn source_successes(&self, source: &str) -> Vec<Vec<String>> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Recorded::SourceLoaded { source: s, files } if s == source => Some(files.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn source_errors(&self, source: &str) -> Vec<LoadError> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Recorded::SourceFailed { source: s, error } if s == source => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(file, channel)` for every file success, in delivery order.
    #[must_use]
    pub fn file_successes(&self) -> Vec<(String, Option<Channel>)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Recorded::FileLoaded { file, channel, .. } => Some((file.clone(), *channel)),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn file_errors(&self) -> Vec<(String, LoadError)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Recorded::FileFailed { file, error, .. } => Some((file.clone(), error.clone())),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Recorded) {
        self.events.borrow_mut().push(event);
    }
}

impl LoadListener for RecordingListener {
    fn on_source_load_progress(&self, source: &str, fraction: f32) {
        self.push(Recorded::Progress {
            source: source.to_string(),
            fraction,
        });
    }

    fn on_source_load_success(&self, source: &str, files: &[String]) {
        self.push(Recorded::SourceLoaded {
            source: source.to_string(),
            files: files.to_vec(),
        });
    }

    fn on_source_load_error(&self, source: &str, error: &LoadError) {
        self.push(Recorded::SourceFailed {
            source: source.to_string(),
            error: error.clone(),
        });
    }

    fn on_file_load_success(&self, source: &str, file: &str, channel: Option<Channel>) {
        self.push(Recorded::FileLoaded {
            source: source.to_string(),
            file: file.to_string(),
            channel,
        });
    }

    fn on_file_load_error(
        &self,
        source: &str,
        file: &str,
        channel: Option<Channel>,
        error: &LoadError,
    ) {
        self.push(Recorded::FileFailed {
            source: source.to_string(),
            file: file.to_string(),
            channel,
            error: error.clone(),
        });
    }
}
