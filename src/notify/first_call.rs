//! Notice sent the first time a workspace calls a destination country.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::pool::NotificationHandler;
use super::{NotifyError, OutboundCall};
use crate::store::CallHistory;
use crate::telemetry::counters;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Outgoing notice transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError>;
}

/// Writes notices to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        info!(
            recipient = %notice.recipient,
            subject = %notice.subject,
            body = %notice.body,
            "notice"
        );
        Ok(())
    }
}

pub struct FirstCallNotifier {
    history: Arc<dyn CallHistory>,
    mailer: Arc<dyn Mailer>,
}

impl FirstCallNotifier {
    pub fn new(history: Arc<dyn CallHistory>, mailer: Arc<dyn Mailer>) -> Self {
        Self { history, mailer }
    }

    fn notice(call: &OutboundCall, recipient: &str) -> Notice {
        Notice {
            recipient: recipient.to_string(),
            subject: "First call to destination country".to_string(),
            body: format!(
                "A call was made to {} (country code +{}) for the first time on your account.",
                call.to, call.dest_code
            ),
        }
    }
}

#[async_trait]
impl NotificationHandler for FirstCallNotifier {
    async fn handle(&self, call: OutboundCall) -> Result<(), NotifyError> {
        let prior = self
            .history
            .prior_outbound_calls(&call.workspace_id, &call.dest_code)
            .await?;
        if prior > 0 {
            debug!(workspace = %call.workspace_id, dest_code = %call.dest_code, prior, "not a first call");
            counters::notification("skipped");
            return Ok(());
        }

        let Some(recipient) = call.notify_email.as_deref() else {
            debug!(workspace = %call.workspace_id, "no notice recipient configured");
            counters::notification("skipped");
            return Ok(());
        };

        self.mailer.send(&Self::notice(&call, recipient)).await?;
        counters::notification("sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "first_call"
    }
}
