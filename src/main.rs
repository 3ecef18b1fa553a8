use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Discord bot that links Discord accounts to Roblox accounts
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Force re-sync of slash commands to all guilds (use when commands aren't showing up)
    #[arg(long, short = 's')]
    sync_commands: bool,

    /// Register commands per-guild instead of globally (faster for testing)
    #[arg(long)]
    guild_commands: bool,

    /// Specific guild ID to sync commands to (for testing)
    #[arg(long)]
    guild_id: Option<u64>,
}

mod commands;
mod config;
mod error;
mod events;
mod logging;
mod managers;
mod messages;
mod roblox;
mod state;
mod verification;
mod web;

use commands::{allowid, confirm, disallowid, help, ping, reverify, update, verify};
use config::Settings;
use events::{handle_component, handle_guild_create};
use managers::{
    create_shared_cooldown_manager, create_shared_verification_manager,
    run_startup_permission_check, SharedCooldownManager, SharedVerificationManager,
    VerificationManager,
};
use roblox::{
    create_shared_identity_cache, create_shared_resolver, IdentityResolver, RobloxClient,
    RobloxProfileSource,
};
use state::{create_shared_storage, FileStore, SharedStorage};
use verification::{create_shared_challenge_store, spawn_sweeper, ProfileMatcher};

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

const UPTIME_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state
pub struct Data {
    pub settings: Settings,
    pub storage: SharedStorage,
    pub verification_manager: SharedVerificationManager,
    pub cooldowns: SharedCooldownManager,
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => {
            if let Err(e) = handle_component(ctx, component, data).await {
                error!("Failed to handle button {}: {}", component.data.custom_id, e);
            }
        }
        serenity::FullEvent::GuildCreate { guild, is_new } => {
            if let Err(e) = handle_guild_create(ctx, guild, *is_new, data).await {
                error!("Failed to handle guild create: {}", e);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Refresh the uptime counter from the recorded startup time
fn spawn_uptime_ticker(storage: SharedStorage) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(UPTIME_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let result = async {
                let stats = storage.get_stats().await?;
                let uptime = (chrono::Utc::now() - stats.last_startup).num_seconds().max(0);
                storage.update_uptime(uptime as u64).await
            }
            .await;
            if let Err(e) = result {
                warn!("Failed to update uptime: {}", e);
            }
        }
    })
}

fn log_bot_id(token: &str) {
    use base64::Engine;

    // The first token segment is the bot's user ID, base64 without padding
    let Some(segment) = token.split('.').next() else {
        return;
    };
    let decoded = base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(segment)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(segment));
    if let Some(id) = decoded.ok().and_then(|bytes| String::from_utf8(bytes).ok()) {
        info!(
            "Bot ID: {} (configure intents at https://discord.com/developers/applications/{}/bot)",
            id, id
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let log_buffer = logging::create_log_buffer(1000);
    logging::init_tracing(
        log_buffer.clone(),
        logging::parse_level_filter(std::env::var("LOG_LEVEL").ok().as_deref()),
    );

    let token = std::env::var("DISCORD_TOKEN").expect("Missing DISCORD_TOKEN environment variable");
    log_bot_id(&token);

    let settings = Settings::from_env();

    tokio::fs::create_dir_all(&settings.state_path).await?;
    let state_file = settings.linked_accounts_path();
    info!("Loading state from {}...", state_file);
    let storage = create_shared_storage(FileStore::open(&state_file).await?);
    if let Err(e) = storage.record_startup().await {
        warn!("Failed to record startup time: {}", e);
    }

    let client = RobloxClient::new(&settings.roblox);
    let resolver = create_shared_resolver(IdentityResolver::new(
        client.clone(),
        create_shared_identity_cache(),
    ));
    let matcher = ProfileMatcher::new(Arc::new(RobloxProfileSource::new(client)));
    let challenges = create_shared_challenge_store(settings.challenge_ttl);
    let verification_manager = create_shared_verification_manager(VerificationManager::new(
        storage.clone(),
        resolver,
        challenges.clone(),
        matcher,
    ));
    let cooldowns = create_shared_cooldown_manager(settings.command_cooldown);

    spawn_sweeper(challenges, settings.sweep_interval);
    spawn_uptime_ticker(storage.clone());

    let sync_commands = args.sync_commands;
    let guild_commands = args.guild_commands;
    let target_guild_id = args.guild_id;

    if sync_commands {
        info!("--sync-commands: Will force re-register slash commands");
    }
    if guild_commands {
        info!("--guild-commands: Will register commands per-guild (faster for testing)");
    } else {
        info!("Registering commands globally by default (takes up to 1 hour to propagate)");
    }
    if let Some(gid) = target_guild_id {
        info!("--guild-id: Targeting specific guild {}", gid);
    }

    let prefix = settings.command_prefix.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                verify(),
                reverify(),
                update(),
                confirm(),
                help(),
                ping(),
                allowid(),
                disallowid(),
            ],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                ..Default::default()
            },
            command_check: Some(|ctx| Box::pin(commands::command_gate(ctx))),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' invoked by {} (ID: {}) in {}",
                        ctx.command().qualified_name,
                        ctx.author().name,
                        ctx.author().id,
                        ctx.guild_id().map(|g| g.to_string()).unwrap_or_else(|| "DM".to_string())
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' completed for {}",
                        ctx.command().qualified_name,
                        ctx.author().name
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Error in command '{}': {}", ctx.command().qualified_name, error);
                            let _ = ctx
                                .send(
                                    poise::CreateReply::default()
                                        .content(messages::GENERIC_FAILURE)
                                        .ephemeral(true),
                                )
                                .await;
                        }
                        // The gate has already replied
                        poise::FrameworkError::CommandCheckFailed { error: None, .. } => {}
                        poise::FrameworkError::CommandCheckFailed { error: Some(error), ctx, .. } => {
                            error!("Command gate failed for '{}': {}", ctx.command().qualified_name, error);
                            let _ = ctx
                                .send(
                                    poise::CreateReply::default()
                                        .content(messages::GENERIC_FAILURE)
                                        .ephemeral(true),
                                )
                                .await;
                        }
                        poise::FrameworkError::ArgumentParse { error, input, ctx, .. } => {
                            error!("Argument parse error in '{}': {} (input: {:?})", ctx.command().qualified_name, error, input);
                        }
                        poise::FrameworkError::MissingBotPermissions { missing_permissions, ctx, .. } => {
                            error!("Bot missing permissions for '{}': {:?}", ctx.command().qualified_name, missing_permissions);
                        }
                        other => {
                            error!("Other framework error: {}", other);
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            let log_buffer = log_buffer.clone();

            Box::pin(async move {
                info!("Bot logged in as: {}", ready.user.name);

                let guild_ids: Vec<serenity::GuildId> = ready.guilds.iter().map(|g| g.id).collect();
                if !guild_ids.is_empty() {
                    run_startup_permission_check(ctx.http.as_ref(), &guild_ids).await;
                } else {
                    warn!("Bot is not in any guilds - skipping permission check");
                }

                let guilds_to_register: Vec<serenity::GuildId> = match target_guild_id {
                    Some(gid) => vec![serenity::GuildId::new(gid)],
                    None => guild_ids,
                };

                if guild_commands || sync_commands {
                    for guild_id in &guilds_to_register {
                        info!("Registering commands to guild: {}", guild_id);
                        if let Err(e) = poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            *guild_id,
                        ).await {
                            error!("Failed to register commands for guild {}: {}", guild_id, e);
                        } else {
                            info!("Successfully registered {} commands for guild {}",
                                  framework.options().commands.len(), guild_id);
                        }
                    }
                } else {
                    info!("Registering commands globally...");
                    if let Err(e) = poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    ).await {
                        error!("Failed to register commands globally: {}", e);
                    } else {
                        info!("Successfully registered {} commands globally (may take up to 1 hour to propagate)",
                              framework.options().commands.len());
                    }
                }

                let web_config = web::WebServerConfig::from_env();
                if web_config.enabled {
                    let api_state = web::ApiState {
                        storage: storage.clone(),
                        admin_user_id: settings.admin_user_id.clone(),
                        log_buffer,
                    };
                    tokio::spawn(async move {
                        info!("Starting web API on port {}...", web_config.port);
                        if let Err(e) = web::start_web_server(web_config, api_state).await {
                            error!("Web server error: {}", e);
                        }
                    });
                } else {
                    warn!("Web API not started: WEB_ENABLED is off");
                }

                Ok(Data {
                    settings,
                    storage,
                    verification_manager,
                    cooldowns,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let privileged_intents: Vec<&str> = [
        (serenity::GatewayIntents::MESSAGE_CONTENT, "MESSAGE_CONTENT"),
        (serenity::GatewayIntents::GUILD_MEMBERS, "GUILD_MEMBERS"),
        (serenity::GatewayIntents::GUILD_PRESENCES, "GUILD_PRESENCES"),
    ]
    .into_iter()
    .filter(|(intent, _)| intents.contains(*intent))
    .map(|(_, name)| name)
    .collect();

    info!("Requesting privileged intents: {:?}", privileged_intents);

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    info!("Starting bot...");
    if let Err(e) = client.start().await {
        let err_str = e.to_string();
        if err_str.contains("Disallowed") || err_str.contains("intents") {
            error!("Failed to start bot: {}", e);
            error!("The following privileged intents need to be enabled in the Discord Developer Portal:");
            for intent in &privileged_intents {
                error!("  - {}", intent);
            }
            error!("Go to https://discord.com/developers/applications -> Your App -> Bot -> Privileged Gateway Intents");
            return Err(anyhow::anyhow!(
                "Disallowed gateway intents. Enable these in Discord Developer Portal: {:?}",
                privileged_intents
            ));
        }
        return Err(e.into());
    }
    warn!("Bot ended.");

    Ok(())
}
