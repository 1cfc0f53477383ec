use crate::storage::sanitize_file_name;
use crate::{Context, Error};
use poise::command;
use poise::serenity_prelude::{
    self as serenity, ButtonStyle, ChannelId, CreateActionRow, CreateAttachment, CreateButton,
    CreateMessage,
};
use poise::CreateReply;
use tracing::error;

use super::database::HistoryAction;
use super::gatekeeper::{Disposition, GateError, UploadCandidate};

/// List the mods currently installed on the server
#[command(slash_command, guild_only)]
pub async fn listmods(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let names = match ctx.data().gatekeeper.storage().list().await {
        Ok(names) => names,
        Err(e) => {
            ctx.say(format!("❌ Failed to list mods: {}", e)).await?;
            return Ok(());
        }
    };

    if names.is_empty() {
        ctx.say("📦 No mods installed yet.").await?;
        return Ok(());
    }

    let listing = names.join("\n");
    if listing.len() > 1900 {
        // Too long for a message; attach the listing instead.
        let reply = CreateReply::default()
            .content(format!("📦 {} mods installed:", names.len()))
            .attachment(CreateAttachment::bytes(
                listing.into_bytes(),
                "mods-list.txt",
            ));
        ctx.send(reply).await?;
    } else {
        ctx.say(format!(
            "📦 {} mods installed:\n```\n{}\n```",
            names.len(),
            listing
        ))
        .await?;
    }
    Ok(())
}

/// Upload a mod .jar (curated, with cooldown)
#[command(slash_command, guild_only)]
pub async fn uploadmod(
    ctx: Context<'_>,
    #[description = "The mod .jar file"] file: serenity::Attachment,
) -> Result<(), Error> {
    let candidate = UploadCandidate {
        file_name: file.filename.clone(),
        source_url: file.url.clone(),
        requester_id: ctx.author().id.get(),
        requester_name: ctx.author().name.clone(),
    };

    match ctx.data().gatekeeper.check(&candidate) {
        Ok(Disposition::Upload) => {
            ctx.defer().await?;
            match ctx.data().gatekeeper.upload(&candidate).await {
                Ok(report) => {
                    let restart_note = if report.restarted {
                        "\n🔄 Server restarting."
                    } else {
                        ""
                    };
                    ctx.say(format!(
                        "✅ Mod **{}** uploaded!{}",
                        report.file_name, restart_note
                    ))
                    .await?;
                }
                Err(e) => {
                    ctx.say(format!("❌ Upload failed: {}", e)).await?;
                }
            }
        }
        Ok(Disposition::NeedsApproval) => {
            request_approval(&ctx, candidate).await?;
        }
        Err(GateError::InvalidFileType) => {
            ctx.say("❌ Only `.jar` files are accepted.").await?;
        }
        Err(GateError::CooldownActive(secs)) => {
            ctx.say(format!(
                "⏳ Upload cooldown active, try again in {}s.",
                secs
            ))
            .await?;
        }
        Err(e) => {
            ctx.say(format!("❌ {}", e)).await?;
        }
    }
    Ok(())
}

/// Park the candidate in the registry and post the review notice with
/// approve/reject buttons to the moderation channel.
async fn request_approval(ctx: &Context<'_>, candidate: UploadCandidate) -> Result<(), Error> {
    let request_id = ctx.id();
    let origin_channel = ctx.channel_id().get();
    ctx.data()
        .approvals
        .create_pending(request_id, candidate.clone(), origin_channel);

    let buttons = CreateActionRow::Buttons(vec![
        CreateButton::new(format!("mod_approve:{}", request_id))
            .style(ButtonStyle::Success)
            .label("Approve"),
        CreateButton::new(format!("mod_reject:{}", request_id))
            .style(ButtonStyle::Danger)
            .label("Reject"),
    ]);
    let notice = CreateMessage::new()
        .content(format!(
            "🛃 **Mod review requested**\n> File: `{}`\n> From: {} (<@{}>)",
            candidate.file_name, candidate.requester_name, candidate.requester_id
        ))
        .components(vec![buttons]);

    let channel = ChannelId::new(ctx.data().config.mod_channel_id);
    match channel.send_message(ctx.http(), notice).await {
        Ok(message) => {
            ctx.data()
                .approvals
                .set_notice(request_id, channel.get(), message.id.get());
            ctx.say("⏳ This mod isn't on the allow list; a moderator has been asked to review it.")
                .await?;
        }
        Err(e) => {
            // Without a notice nobody can ever resolve the request.
            ctx.data().approvals.resolve(request_id);
            ctx.say(format!("❌ Could not reach the moderation channel: {}", e))
                .await?;
        }
    }
    Ok(())
}

async fn autocomplete_mod_name(ctx: Context<'_>, partial: &str) -> impl Iterator<Item = String> {
    let names = ctx
        .data()
        .gatekeeper
        .storage()
        .list()
        .await
        .unwrap_or_default();
    let partial = partial.to_lowercase();

    names
        .into_iter()
        .filter(move |name| name.to_lowercase().contains(&partial))
        .take(25)
}

/// Remove a mod by its exact file name
#[command(slash_command, guild_only)]
pub async fn removemod(
    ctx: Context<'_>,
    #[description = "Exact mod file name (e.g. mod.jar)"]
    #[autocomplete = "autocomplete_mod_name"]
    name: String,
) -> Result<(), Error> {
    ctx.defer().await?;

    let file_name = sanitize_file_name(&name);
    let data = ctx.data();

    match data.gatekeeper.storage().delete(&file_name).await {
        Ok(()) => {
            if let Err(e) = data
                .gatekeeper
                .history()
                .record(
                    HistoryAction::Remove,
                    &file_name,
                    ctx.author().id.get(),
                    &ctx.author().name,
                )
                .await
            {
                error!("Failed to record removal history: {}", e);
            }

            let restarted = data
                .gatekeeper
                .announce_and_restart(&format!("Mod removed: {}", file_name))
                .await;
            let restart_note = if restarted { "\n🔄 Server restarting." } else { "" };
            ctx.say(format!("✅ Mod **{}** removed!{}", file_name, restart_note))
                .await?;
        }
        Err(e) => {
            ctx.say(format!("❌ Failed to remove mod: {}", e)).await?;
        }
    }
    Ok(())
}

/// Show the latest mod uploads and removals
#[command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    ephemeral
)]
pub async fn history(ctx: Context<'_>) -> Result<(), Error> {
    let records = ctx.data().gatekeeper.history().recent(15).await;

    if records.is_empty() {
        ctx.say("📜 No mod changes recorded yet.").await?;
        return Ok(());
    }

    let mut response = String::from("📜 **Latest mod changes:**\n");
    for record in records {
        response.push_str(&format!(
            "• `{}` {} by {} (<t:{}:R>)\n",
            record.file_name,
            record.action,
            record.username,
            record.timestamp.timestamp()
        ));
    }
    ctx.say(response).await?;
    Ok(())
}

/// Get the modpack download link
#[command(slash_command)]
pub async fn modpack(ctx: Context<'_>) -> Result<(), Error> {
    match &ctx.data().config.modpack_url {
        Some(url) => ctx.say(format!("📦 Modpack download: {}", url)).await?,
        None => ctx.say("❌ No modpack link configured.").await?,
    };
    Ok(())
}
