//! Test doubles for [`ConnectionInterface`].
//!
//! ```rust,ignore
//! use reticulum_core::testing::RecordingInterface;
//!
//! let iface = RecordingInterface::new(1, "test0");
//! link.send(b"hello")?;
//! assert_eq!(iface.sent().len(), 1);
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::SendError;
use crate::interface::{ConnectionInterface, InterfaceMode};
use crate::types::InterfaceId;

/// An in-memory interface that records every frame handed to it.
#[derive(Debug)]
pub struct RecordingInterface {
    id: InterfaceId,
    name: String,
    mode: InterfaceMode,
    online: AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl RecordingInterface {
    pub fn new(id: u64, name: &str) -> Self {
        Self::with_mode(id, name, InterfaceMode::Full)
    }

    pub fn with_mode(id: u64, name: &str, mode: InterfaceMode) -> Self {
        Self {
            id: InterfaceId(id),
            name: name.to_string(),
            mode,
            online: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Frames sent so far, oldest first.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Take the frames sent so far, leaving the record empty.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }

    /// Make subsequent sends fail with [`SendError::Offline`].
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ConnectionInterface for RecordingInterface {
    fn id(&self) -> InterfaceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> InterfaceMode {
        self.mode
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn send(&self, frame: &[u8]) -> Result<(), SendError> {
        if !self.is_online() {
            return Err(SendError::Offline(self.name.clone()));
        }
        self.sent
            .lock()
            .map_err(|_| SendError::Io("recorder poisoned".into()))?
            .push(frame.to_vec());
        Ok(())
    }
}
