// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process execution contract shared by every `Runtime` implementation
//! (spec.md §4.1).

use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

/// Reserved exit-code sentinel meaning the process was killed because
/// `cancelToken` was signalled before close.
pub const EXIT_ABORTED: i32 = -1000;

/// Reserved exit-code sentinel meaning the deadline fired before close.
pub const EXIT_TIMED_OUT: i32 = -1001;

/// Outcome of a completed `exec`. Exactly one of these holds
/// (spec.md §8, property 5): a natural code, `Aborted` iff cancel was
/// signalled first, `TimedOut` iff the deadline fired first, or
/// `Signalled` (negative, process-killed-without-code) otherwise.
/// Priority when more than one condition raced: cancel > timeout >
/// signal/code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Code(i32),
    Aborted,
    TimedOut,
    /// Killed by a signal with no exit code; carries the signal number.
    Signalled(i32),
}

impl ExitOutcome {
    /// Flatten to the sentinel-or-code integer shape described in
    /// spec.md §4.1, for callers that just want a single number.
    pub fn as_code(&self) -> i32 {
        match self {
            ExitOutcome::Code(c) => *c,
            ExitOutcome::Aborted => EXIT_ABORTED,
            ExitOutcome::TimedOut => EXIT_TIMED_OUT,
            ExitOutcome::Signalled(sig) => -(*sig),
        }
    }
}

/// Options for a single `exec` call.
#[derive(Debug, Clone, Default)]
pub struct ExecOpts {
    pub cwd: String,
    pub env: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
    pub niceness: Option<i32>,
    pub cancel: Option<CancellationToken>,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;
pub type ByteSink = Pin<Box<dyn AsyncWrite + Send>>;

/// A running (or just-completed) process. All four streams and the
/// two futures are independent: a caller may drop `stdin` without
/// affecting `stdout`, and may await `exit_code` before or after
/// draining `stdout`/`stderr`.
pub struct ExecStream {
    pub stdout: ByteStream,
    pub stderr: ByteStream,
    pub stdin: Option<ByteSink>,
    pub exit_code: BoxFuture<'static, ExitOutcome>,
    /// Wall time from the `exec` call to process close.
    pub duration: BoxFuture<'static, Duration>,
}

/// Non-interactive environment mask applied to every local and SSH
/// exec: forces tools that probe for a TTY into scriptable behavior
/// (spec.md §4.1.1).
pub fn non_interactive_env_mask() -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("CI".to_string(), "true".to_string());
    env.insert("TERM".to_string(), "dumb".to_string());
    env.insert("NO_COLOR".to_string(), "1".to_string());
    env.insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());
    env.insert("GIT_PAGER".to_string(), "cat".to_string());
    env.insert("PAGER".to_string(), "cat".to_string());
    env.insert("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string());
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_code_maps_sentinels() {
        assert_eq!(ExitOutcome::Code(0).as_code(), 0);
        assert_eq!(ExitOutcome::Code(2).as_code(), 2);
        assert_eq!(ExitOutcome::Aborted.as_code(), EXIT_ABORTED);
        assert_eq!(ExitOutcome::TimedOut.as_code(), EXIT_TIMED_OUT);
        assert_eq!(ExitOutcome::Signalled(9).as_code(), -9);
    }
}
