use crate::{Context, Error};
use poise::command;
use poise::serenity_prelude::{ButtonStyle, CreateActionRow, CreateButton};
use poise::CreateReply;
use std::time::Duration;
use tracing::warn;

use super::panel::{PanelClient, ServerStatus};

const PANEL_TIMEOUT: Duration = Duration::from_secs(120);

/// Check that the bot is alive
#[command(slash_command)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("🏓 Pong!").await?;
    Ok(())
}

fn format_status(status: &ServerStatus) -> String {
    let light = if status.online { "🟢" } else { "🔴" };
    format!(
        "{} **Server {}**\n> CPU: {:.1}%\n> Memory: {:.0} MB\n> Disk: {:.0} MB",
        light,
        status.state,
        status.cpu_percent,
        status.memory_bytes as f64 / (1024.0 * 1024.0),
        status.disk_bytes as f64 / (1024.0 * 1024.0),
    )
}

async fn status_text(panel: &PanelClient) -> String {
    match panel.status().await {
        Ok(status) => format_status(&status),
        Err(e) => format!("❌ Status unavailable: {}", e),
    }
}

/// Show server status, resource usage and online players
#[command(slash_command, guild_only)]
pub async fn info(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    let data = ctx.data();

    let mut response = match &data.panel {
        Some(panel) => status_text(panel).await,
        None => "❌ No panel configured.".to_string(),
    };

    if let Some(rcon) = &data.rcon {
        match rcon.players().await {
            Ok(players) => response.push_str(&format!("\n👥 {}", players)),
            Err(e) => warn!("RCON player list failed: {}", e),
        }
    }

    ctx.say(response).await?;
    Ok(())
}

/// Restart the Minecraft server
#[command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn restart(ctx: Context<'_>) -> Result<(), Error> {
    let Some(panel) = ctx.data().panel.clone() else {
        ctx.say("❌ No panel configured.").await?;
        return Ok(());
    };

    ctx.defer().await?;
    match panel.restart().await {
        Ok(()) => ctx.say("✅ Server restarting!").await?,
        Err(e) => ctx.say(format!("❌ Failed to restart: {}", e)).await?,
    };
    Ok(())
}

/// Interactive server panel with status and restart controls
#[command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    ephemeral
)]
pub async fn panel(ctx: Context<'_>) -> Result<(), Error> {
    let Some(panel) = ctx.data().panel.clone() else {
        ctx.say("❌ No panel configured.").await?;
        return Ok(());
    };

    let controls = CreateActionRow::Buttons(vec![
        CreateButton::new("panel_refresh")
            .style(ButtonStyle::Primary)
            .label("Refresh"),
        CreateButton::new("panel_restart")
            .style(ButtonStyle::Danger)
            .label("Restart"),
    ]);

    let content = status_text(&panel).await;
    let msg = ctx
        .send(
            CreateReply::default()
                .content(content)
                .components(vec![controls.clone()]),
        )
        .await?;

    loop {
        let interaction = msg
            .message()
            .await?
            .await_component_interaction(ctx.serenity_context())
            .timeout(PANEL_TIMEOUT)
            .await;

        let Some(interaction) = interaction else {
            msg.edit(
                ctx,
                CreateReply::default()
                    .content("⌛ Panel closed.")
                    .components(vec![]),
            )
            .await?;
            return Ok(());
        };
        interaction.defer(ctx.serenity_context()).await?;

        let mut note = String::new();
        if interaction.data.custom_id == "panel_restart" {
            note = match panel.restart().await {
                Ok(()) => "\n✅ Restart signal sent.".to_string(),
                Err(e) => format!("\n❌ Failed to restart: {}", e),
            };
        }

        let content = format!("{}{}", status_text(&panel).await, note);
        msg.edit(
            ctx,
            CreateReply::default()
                .content(content)
                .components(vec![controls.clone()]),
        )
        .await?;
    }
}
