//! Output Sinks
//!
//! Where finished reports go. `write` is the durable channel (e.g. the
//! system clipboard) and `display` is the preview channel; the engine
//! calls both on success and only `display` on a failure path that
//! still produced partial text.

use std::sync::Mutex;

use crate::utils::error::AppResult;

/// Destination for formatted engine output.
pub trait OutputSink: Send + Sync {
    /// Durable write of the final report.
    fn write(&self, text: &str) -> AppResult<()>;

    /// Show the text to the user without persisting it.
    fn display(&self, text: &str);
}

/// In-memory sink; the default for embedding and tests.
#[derive(Default)]
pub struct BufferSink {
    written: Mutex<Option<String>>,
    displayed: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last durably written report, if any.
    pub fn written(&self) -> Option<String> {
        self.written.lock().expect("sink lock poisoned").clone()
    }

    /// Everything displayed so far, oldest first.
    pub fn displayed(&self) -> Vec<String> {
        self.displayed.lock().expect("sink lock poisoned").clone()
    }
}

impl OutputSink for BufferSink {
    fn write(&self, text: &str) -> AppResult<()> {
        *self.written.lock().expect("sink lock poisoned") = Some(text.to_string());
        Ok(())
    }

    fn display(&self, text: &str) {
        self.displayed
            .lock()
            .expect("sink lock poisoned")
            .push(text.to_string());
    }
}

/// Clipboard-backed sink. Display events are logged since there is no
/// attached preview surface.
#[cfg(feature = "clipboard")]
pub struct ClipboardSink;

#[cfg(feature = "clipboard")]
impl OutputSink for ClipboardSink {
    fn write(&self, text: &str) -> AppResult<()> {
        use crate::utils::error::AppError;
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|e| AppError::internal(format!("Failed to open clipboard: {}", e)))?;
        clipboard
            .set_text(text.to_string())
            .map_err(|e| AppError::internal(format!("Failed to write clipboard: {}", e)))
    }

    fn display(&self, text: &str) {
        tracing::info!("[Sink] {}", text);
    }
}
