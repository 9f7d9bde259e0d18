// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Egress: streaming sessions and the request dispatcher.
//!
//! Transports (HTTP, WebSocket, MQTT) stay outside the core; they speak to
//! [`RequestDispatcher`] for one-shot queries and receive
//! [`SessionFrame`]s over a channel for long-lived subscriptions.

mod dispatcher;
mod error;
mod path_filter;
mod session;

pub use dispatcher::{DocFormat, QueryScope, RequestDispatcher, Response};
pub use error::{ErrorCode, RequestError};
pub use path_filter::resolve_path;
pub use session::{
    ChunkFormatter, ChunkInfo, SessionFrame, SessionHandle, SessionParams, SessionState,
    StreamSession,
};
