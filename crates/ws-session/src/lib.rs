// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ws-session: the chat streaming plane — `AgentSession`'s turn
//! lifecycle, the `EventExpander` presentation reducer, and the
//! `SubscriptionHub` fan-out used by the transport layer (spec.md
//! §4.5-4.7).

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod error;
pub mod expander;
pub mod hub;
pub mod model;
pub mod session;

pub use error::SendMessageError;
pub use expander::{project_message, EventExpander};
pub use hub::{MetadataEvent, RecvOutcome, SubscriptionHub};
pub use model::{ModelError, ModelErrorKind, ModelStream, ModelStreamFactory, StreamOpts};
pub use session::{AgentSession, SendOptions};
