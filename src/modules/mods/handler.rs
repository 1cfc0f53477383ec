use async_trait::async_trait;
use poise::serenity_prelude::{
    ChannelId, ComponentInteraction, Context, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateMessage, FullEvent, Interaction, Permissions,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::events::EventHandler;

use super::approvals::{ApprovalRegistry, Decision, PendingApproval};
use super::gatekeeper::Gatekeeper;

/// Resolves the approve/reject buttons posted to the moderation channel.
#[derive(Debug)]
pub struct ApprovalHandler {
    gatekeeper: Arc<Gatekeeper>,
    approvals: Arc<ApprovalRegistry>,
}

impl ApprovalHandler {
    pub fn new(gatekeeper: Arc<Gatekeeper>, approvals: Arc<ApprovalRegistry>) -> Self {
        Self {
            gatekeeper,
            approvals,
        }
    }

    fn parse_custom_id(custom_id: &str) -> Option<(Decision, u64)> {
        let (action, id) = custom_id.split_once(':')?;
        let decision = match action {
            "mod_approve" => Decision::Approve,
            "mod_reject" => Decision::Reject,
            _ => return None,
        };
        Some((decision, id.parse().ok()?))
    }

    /// Replace the notice content and strip the buttons.
    async fn close_notice(
        &self,
        ctx: &Context,
        component: &ComponentInteraction,
        content: &str,
    ) -> Result<(), poise::serenity_prelude::Error> {
        component
            .create_response(
                &ctx.http,
                CreateInteractionResponse::UpdateMessage(
                    CreateInteractionResponseMessage::new()
                        .content(content)
                        .components(vec![]),
                ),
            )
            .await
    }

    async fn notify_origin(&self, ctx: &Context, entry: &PendingApproval, content: String) {
        let channel = ChannelId::new(entry.origin_channel_id);
        if let Err(e) = channel
            .send_message(&ctx.http, CreateMessage::new().content(content))
            .await
        {
            warn!("Failed to notify requester channel: {}", e);
        }
    }

    async fn handle_component(
        &self,
        ctx: &Context,
        component: &ComponentInteraction,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Some((decision, request_id)) = Self::parse_custom_id(&component.data.custom_id) else {
            return Ok(());
        };

        let allowed = component
            .member
            .as_ref()
            .and_then(|m| m.permissions)
            .map(|p| p.contains(Permissions::MANAGE_GUILD))
            .unwrap_or(false);
        if !allowed {
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ You need Manage Server permission to review mods.")
                            .ephemeral(true),
                    ),
                )
                .await?;
            return Ok(());
        }

        // Atomic take: a second click or a racing moderator lands here with None.
        let Some(entry) = self.approvals.resolve(request_id) else {
            self.close_notice(ctx, component, "⚠️ This request was already handled or has expired.")
                .await?;
            return Ok(());
        };

        match decision {
            Decision::Approve => match self.gatekeeper.upload(&entry.candidate).await {
                Ok(report) => {
                    info!(
                        "Request {} approved by {}: {}",
                        request_id, component.user.name, report.file_name
                    );
                    self.close_notice(
                        ctx,
                        component,
                        &format!(
                            "✅ **{}** approved by {} and uploaded.",
                            report.file_name, component.user.name
                        ),
                    )
                    .await?;
                    self.notify_origin(
                        ctx,
                        &entry,
                        format!(
                            "✅ <@{}> your mod **{}** was approved and uploaded!",
                            entry.candidate.requester_id, report.file_name
                        ),
                    )
                    .await;
                }
                Err(e) => {
                    self.close_notice(
                        ctx,
                        component,
                        &format!("❌ Approved, but the upload failed: {}", e),
                    )
                    .await?;
                    self.notify_origin(
                        ctx,
                        &entry,
                        format!(
                            "❌ <@{}> your mod **{}** was approved but the upload failed: {}",
                            entry.candidate.requester_id, entry.candidate.file_name, e
                        ),
                    )
                    .await;
                }
            },
            Decision::Reject => {
                info!(
                    "Request {} rejected by {}: {}",
                    request_id, component.user.name, entry.candidate.file_name
                );
                self.close_notice(
                    ctx,
                    component,
                    &format!(
                        "🚫 **{}** rejected by {}.",
                        entry.candidate.file_name, component.user.name
                    ),
                )
                .await?;
                self.notify_origin(
                    ctx,
                    &entry,
                    format!(
                        "🚫 <@{}> your mod **{}** was declined by a moderator.",
                        entry.candidate.requester_id, entry.candidate.file_name
                    ),
                )
                .await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for ApprovalHandler {
    fn name(&self) -> &str {
        "ModApproval"
    }

    async fn handle(
        &self,
        ctx: &Context,
        event: &FullEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let FullEvent::InteractionCreate {
            interaction: Interaction::Component(component),
        } = event
        {
            self.handle_component(ctx, component).await?;
        }
        Ok(())
    }
}
