//! Typing reveal for complete (non-streamed) answers.
//!
//! A reveal is a cancellable task keyed by the response id. Starting a new one
//! aborts the old task, and frames of a stale id are never published.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Progress of one reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealFrame {
    pub id: u64,
    text: Arc<str>,
    shown_len: usize,
    pub done: bool,
}

impl Default for RevealFrame {
    fn default() -> Self {
        Self {
            id: 0,
            text: Arc::from(""),
            shown_len: 0,
            done: true,
        }
    }
}

impl RevealFrame {
    /// The revealed prefix; always ends on a character boundary.
    pub fn shown(&self) -> &str {
        &self.text[..self.shown_len]
    }

    pub fn full_text(&self) -> &str {
        &self.text
    }
}

pub struct Revealer {
    per_char_delay: Duration,
    frames: Arc<watch::Sender<RevealFrame>>,
    task: Option<JoinHandle<()>>,
}

impl Revealer {
    pub fn new(per_char_delay: Duration) -> Self {
        let (frames, _) = watch::channel(RevealFrame::default());
        Self {
            per_char_delay,
            frames: Arc::new(frames),
            task: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RevealFrame> {
        self.frames.subscribe()
    }

    pub fn current(&self) -> RevealFrame {
        self.frames.borrow().clone()
    }

    /// Reveal `text` one character per delay, replacing any running reveal.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, id: u64, text: &str) {
        self.cancel();
        let text: Arc<str> = Arc::from(text);
        let instant = self.per_char_delay.is_zero() || text.is_empty();
        self.frames.send_replace(RevealFrame {
            id,
            text: text.clone(),
            shown_len: if instant { text.len() } else { 0 },
            done: instant,
        });
        if instant {
            return;
        }

        let frames = self.frames.clone();
        let delay = self.per_char_delay;
        self.task = Some(tokio::spawn(async move {
            for (offset, ch) in text.char_indices() {
                tokio::time::sleep(delay).await;
                let shown_len = offset + ch.len_utf8();
                let last = shown_len == text.len();
                let current = frames.send_if_modified(|frame| {
                    if frame.id != id {
                        return false;
                    }
                    frame.shown_len = shown_len;
                    frame.done = last;
                    true
                });
                if !current {
                    return;
                }
            }
        }));
    }

    /// Stop the running reveal where it is.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Jump to the end of the running reveal.
    pub fn finish(&mut self) {
        self.cancel();
        self.frames.send_if_modified(|frame| {
            if frame.done {
                return false;
            }
            frame.shown_len = frame.text.len();
            frame.done = true;
            true
        });
    }
}

impl Drop for Revealer {
    fn drop(&mut self) {
        self.cancel();
    }
}
