//! Fire-and-forget notifications raised while routing calls.
//!
//! Tasks are queued on a bounded [`NotificationPool`] and handled by a fixed
//! set of workers. A full queue drops the task. Handler failures are logged
//! and counted, never returned to the caller that queued the task.

mod first_call;
mod pool;

pub use first_call::{FirstCallNotifier, LogMailer, Mailer, Notice};
pub use pool::{NotificationHandler, NotificationPool};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// An outbound call that was just placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundCall {
    pub workspace_id: String,
    pub from: String,
    pub to: String,
    /// Destination country calling code.
    pub dest_code: String,
    /// Where notices about this workspace go.
    pub notify_email: Option<String>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to send notice to {recipient}: {reason}")]
    Mail { recipient: String, reason: String },
}
