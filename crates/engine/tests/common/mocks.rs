use adchain_core::Link;
use adchain_engine::{AnnounceError, Announcer};
use async_trait::async_trait;
use std::sync::Mutex;

/// Announcer remembering every head it was given.
#[derive(Default)]
pub struct RecordingAnnouncer {
    heads: Mutex<Vec<Link>>,
    closed: Mutex<bool>,
}

#[allow(dead_code)]
impl RecordingAnnouncer {
    pub fn heads(&self) -> Vec<Link> {
        self.heads.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl Announcer for RecordingAnnouncer {
    async fn update_root(&self, head: Link) -> Result<(), AnnounceError> {
        if *self.closed.lock().unwrap() {
            return Err(AnnounceError::Closed);
        }
        self.heads.lock().unwrap().push(head);
        Ok(())
    }

    async fn close(&self) -> Result<(), AnnounceError> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "recording"
    }
}

/// Announcer whose every operation fails.
pub struct FailingAnnouncer;

#[async_trait]
impl Announcer for FailingAnnouncer {
    async fn update_root(&self, _head: Link) -> Result<(), AnnounceError> {
        Err(AnnounceError::Server("announce backend unavailable".to_string()))
    }

    async fn close(&self) -> Result<(), AnnounceError> {
        Err(AnnounceError::Server("close failed".to_string()))
    }

    fn kind(&self) -> &'static str {
        "failing"
    }
}

/// Announcer failing its first `failures` announcements, then recording.
#[allow(dead_code)]
pub struct FlakyAnnouncer {
    failures: Mutex<usize>,
    pub recorder: RecordingAnnouncer,
}

#[allow(dead_code)]
impl FlakyAnnouncer {
    pub fn new(failures: usize) -> Self {
        Self {
            failures: Mutex::new(failures),
            recorder: RecordingAnnouncer::default(),
        }
    }
}

#[async_trait]
impl Announcer for FlakyAnnouncer {
    async fn update_root(&self, head: Link) -> Result<(), AnnounceError> {
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(AnnounceError::Server("temporarily unavailable".to_string()));
            }
        }
        self.recorder.update_root(head).await
    }

    async fn close(&self) -> Result<(), AnnounceError> {
        self.recorder.close().await
    }

    fn kind(&self) -> &'static str {
        "flaky"
    }
}
