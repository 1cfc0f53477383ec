use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, Context, EditMessage, MessageId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::tasks::Task;

use super::approvals::ApprovalRegistry;

/// Drops pending approvals that outlived the configured TTL and disarms
/// the buttons on their moderation notices. Only registered when a TTL is
/// configured.
#[derive(Debug)]
pub struct ApprovalSweepTask {
    approvals: Arc<ApprovalRegistry>,
    ttl: Duration,
}

impl ApprovalSweepTask {
    pub fn new(approvals: Arc<ApprovalRegistry>, ttl: Duration) -> Self {
        Self { approvals, ttl }
    }
}

#[async_trait]
impl Task for ApprovalSweepTask {
    fn name(&self) -> &str {
        "ApprovalSweep"
    }

    fn schedule(&self) -> Option<Duration> {
        Some(Duration::from_secs(60))
    }

    async fn execute(
        &mut self,
        ctx: &Context,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let expired = self.approvals.expire_older_than(self.ttl);
        if !expired.is_empty() {
            info!(
                "Swept {} expired approval request(s), {} still pending",
                expired.len(),
                self.approvals.len()
            );
        }

        for (request_id, entry) in expired {
            info!(
                "Expiring approval request {} for {}",
                request_id, entry.candidate.file_name
            );

            if let Some((channel_id, message_id)) = entry.notice {
                let edit = EditMessage::new()
                    .content(format!(
                        "⌛ Review request for `{}` expired without a decision.",
                        entry.candidate.file_name
                    ))
                    .components(vec![]);

                if let Err(e) = ChannelId::new(channel_id)
                    .edit_message(&ctx.http, MessageId::new(message_id), edit)
                    .await
                {
                    warn!("Failed to disarm expired approval notice: {}", e);
                }
            }
        }
        Ok(())
    }
}
