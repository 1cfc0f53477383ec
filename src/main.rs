use databases::Databases;
use poise::serenity_prelude::{self as serenity, CreateAllowedMentions};
use std::sync::Arc;
use tasks::TaskManager;
use tracing::{error, info, trace};

mod config;
mod database;
mod databases;
mod events;
mod modules;
mod storage;
mod tasks;

use crate::config::Config;
use crate::events::EventManager;
use crate::modules::mods::approvals::ApprovalRegistry;
use crate::modules::mods::gatekeeper::{GatePolicy, Gatekeeper};
use crate::modules::mods::handler::ApprovalHandler;
use crate::modules::mods::task::ApprovalSweepTask;
use crate::modules::server::panel::PanelClient;
use crate::modules::server::rcon::RconClient;
use crate::modules::system::events::ReadyHandler;

#[derive(Clone, Debug)]
pub struct Data {
    pub config: Arc<Config>,
    pub dbs: Arc<Databases>,
    pub gatekeeper: Arc<Gatekeeper>,
    pub approvals: Arc<ApprovalRegistry>,
    pub panel: Option<Arc<PanelClient>>,
    pub rcon: Option<Arc<RconClient>>,
    pub task_manager: Arc<TaskManager>,
    pub event_manager: Arc<EventManager>,
}

impl Data {
    pub async fn init_tasks(&self, ctx: &serenity::Context) {
        if let Some(ttl) = self.config.approval_ttl {
            self.task_manager
                .add_task(ApprovalSweepTask::new(self.approvals.clone(), ttl))
                .await;
        }

        self.task_manager.start_tasks(ctx.clone()).await;
    }
}

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn register(ctx: Context<'_>) -> Result<(), Error> {
    poise::builtins::register_application_commands_buttons(ctx).await?;
    Ok(())
}

/// Show all available commands
#[poise::command(slash_command)]
async fn help(
    ctx: Context<'_>,
    #[description = "Command to show help about"] command: Option<String>,
) -> Result<(), Error> {
    poise::builtins::help(
        ctx,
        command.as_deref(),
        poise::builtins::HelpConfiguration::default(),
    )
    .await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    info!("starting modgate");

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let token = config.discord_token.clone();
    let intents = serenity::GatewayIntents::non_privileged();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions::<Data, Error> {
            allowed_mentions: Some(CreateAllowedMentions::new().empty_roles().empty_users()),
            commands: vec![
                register(),
                help(),
                modules::server::commands::ping(),
                modules::server::commands::info(),
                modules::server::commands::restart(),
                modules::server::commands::panel(),
                modules::mods::commands::listmods(),
                modules::mods::commands::uploadmod(),
                modules::mods::commands::removemod(),
                modules::mods::commands::history(),
                modules::mods::commands::modpack(),
            ],
            pre_command: |ctx| {
                Box::pin(async move {
                    trace!(
                        "Command {} used by {} in {}",
                        ctx.command().qualified_name,
                        ctx.author().tag(),
                        ctx.guild_id()
                            .map_or_else(|| "DM".to_string(), |id| id.to_string())
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command {} completed for {} in {}",
                        ctx.command().qualified_name,
                        ctx.author().tag(),
                        ctx.guild_id()
                            .map_or_else(|| "DM".to_string(), |id| id.to_string())
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!(
                                "Command {} failed for {} in {}: {:?}",
                                ctx.command().qualified_name,
                                ctx.author().tag(),
                                ctx.guild_id()
                                    .map_or_else(|| "DM".to_string(), |id| id.to_string()),
                                error
                            );
                        }
                        err => error!("Other framework error: {:?}", err),
                    }
                })
            },
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    data.event_manager.handle_event(ctx, &event).await;
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                info!("registering commands");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let dbs = Arc::new(Databases::open(&config.history_path).await?);
                let storage = storage::from_config(&config.storage);
                let panel = config.panel.as_ref().map(|c| Arc::new(PanelClient::new(c)));
                let rcon = config.rcon.as_ref().map(|c| Arc::new(RconClient::new(c)));

                let policy = GatePolicy {
                    allow_list: config.allowed_mods.clone(),
                    cooldown: config.cooldown,
                    case_sensitive: config.case_sensitive_allowlist,
                };
                let gatekeeper = Arc::new(Gatekeeper::new(
                    storage,
                    dbs.history.clone(),
                    panel.clone(),
                    policy,
                    config.restart_after_change,
                ));
                let approvals = Arc::new(ApprovalRegistry::new());

                let task_manager = Arc::new(TaskManager::new());
                let event_manager = Arc::new(EventManager::new());
                event_manager.add_handler(ReadyHandler).await;
                event_manager
                    .add_handler(ApprovalHandler::new(gatekeeper.clone(), approvals.clone()))
                    .await;

                let data = Data {
                    config: config.clone(),
                    dbs,
                    gatekeeper,
                    approvals,
                    panel,
                    rcon,
                    task_manager,
                    event_manager,
                };
                data.init_tasks(ctx).await;

                Ok(data)
            })
        })
        .build();

    let client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await;

    client.unwrap().start().await.unwrap();
}
