//! Operator abort signal

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::ProtocolError;

/// Shared flag raised when the operator aborts the command in flight.
///
/// The command channel checks it between chunk writes and between prompt
/// polls. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the lowered state
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the abort signal
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the abort signal is raised
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Lower the signal, returning whether it was raised
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    /// Raise this token whenever the process receives Ctrl-C.
    ///
    /// Only one handler can be installed per process.
    pub fn install_ctrlc_handler(&self) -> Result<(), ProtocolError> {
        let flag = Arc::clone(&self.flag);
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .map_err(|e| ProtocolError::Config(format!("failed to set Ctrl-C handler: {}", e)))
    }
}
