// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Callback surface for streaming `InitWorkspace` lifecycle lines back
//! to subscribers (spec.md §4.1).

use tokio::sync::mpsc::UnboundedSender;
use ws_core::{InitStream, StreamEvent};

/// Receives lifecycle lines as `InitWorkspace` runs. Implementations
/// must not block the caller for long — they forward onto a channel.
pub trait InitLogger: Send + Sync {
    fn log_step(&self, message: &str);
    fn log_stdout(&self, line: &str);
    fn log_stderr(&self, line: &str);
    /// Called exactly once, whether the hook succeeded, failed, or no
    /// hook existed (spec.md §4.1.2).
    fn log_complete(&self, exit_code: Option<i32>);
}

/// Discards every line. Used where no subscriber is listening.
pub struct NoopInitLogger;

impl InitLogger for NoopInitLogger {
    fn log_step(&self, _message: &str) {}
    fn log_stdout(&self, _line: &str) {}
    fn log_stderr(&self, _line: &str) {}
    fn log_complete(&self, _exit_code: Option<i32>) {}
}

/// Forwards each callback as a [`StreamEvent`] onto a channel, for the
/// daemon to fan out through the `SubscriptionHub`.
pub struct ChannelInitLogger {
    tx: UnboundedSender<StreamEvent>,
}

impl ChannelInitLogger {
    pub fn new(tx: UnboundedSender<StreamEvent>) -> Self {
        Self { tx }
    }
}

impl InitLogger for ChannelInitLogger {
    fn log_step(&self, message: &str) {
        let _ = self.tx.send(StreamEvent::Status { message: message.to_string() });
    }

    fn log_stdout(&self, line: &str) {
        let _ = self.tx.send(StreamEvent::InitOutput {
            stream: InitStream::Stdout,
            line: line.to_string(),
        });
    }

    fn log_stderr(&self, line: &str) {
        let _ = self.tx.send(StreamEvent::InitOutput {
            stream: InitStream::Stderr,
            line: line.to_string(),
        });
    }

    fn log_complete(&self, exit_code: Option<i32>) {
        let _ = self.tx.send(StreamEvent::InitEnd { exit_code });
    }
}

/// Accumulates lines into an [`ws_core::InitState`] for tests.
#[cfg(any(test, feature = "test-support"))]
pub struct CollectingInitLogger {
    pub state: parking_lot::Mutex<ws_core::InitState>,
}

#[cfg(any(test, feature = "test-support"))]
impl CollectingInitLogger {
    pub fn new() -> Self {
        Self { state: parking_lot::Mutex::new(ws_core::InitState::running(None)) }
    }

    pub fn snapshot(&self) -> ws_core::InitState {
        self.state.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for CollectingInitLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl InitLogger for CollectingInitLogger {
    fn log_step(&self, _message: &str) {}

    fn log_stdout(&self, line: &str) {
        self.state.lock().push_line(line);
    }

    fn log_stderr(&self, line: &str) {
        self.state.lock().push_line(line);
    }

    fn log_complete(&self, exit_code: Option<i32>) {
        self.state.lock().finish(exit_code);
    }
}
