// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ws-core: domain types for the workspace orchestrator — identifiers,
//! projects, workspaces, chat messages, stream events, and the
//! expander's displayed-message output. Pure data + validation, no
//! I/O: runtime, storage, and session behavior live in sibling crates.

pub mod macros;

pub mod breadcrumb;
pub mod clock;
pub mod displayed;
pub mod error;
pub mod id;
pub mod init_state;
pub mod message;
pub mod project;
pub mod stream_event;
pub mod validation;
pub mod workspace;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use breadcrumb::Breadcrumb;
pub use clock::{Clock, FakeClock, SystemClock};
pub use displayed::DisplayedMessage;
pub use error::{ErrorKind, HasErrorKind, RuntimeErrorKind};
pub use id::{MessageId, ToolCallId, WorkspaceId};
pub use init_state::{InitState, InitStatus, INIT_HISTORY_SEQUENCE};
pub use message::{Message, MessageMetadata, Part, Role, ToolCallState};
pub use project::{workspace_path, Project, Secret};
pub use stream_event::{InitStream, StreamEvent};
pub use validation::{
    validate_command, validate_message_text, validate_trunk, validate_workspace_name,
    ValidationError,
};
pub use workspace::{RuntimeConfig, Workspace};
