//! Command-line interface parsing and handling.
//!
//! `gaod` starts the chat REPL by default; the remaining subcommands cover
//! model management, memory inspection, accounts, and the admin surface
//! (API keys, system prompt, storage backend selection).

use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::auth::{AuthManager, Session};
use crate::core::config::{Config, StorageMode};
use crate::core::models::{CustomModel, ModelKind, Provider};
use crate::orchestrator::{ChatOrchestrator, TurnOutcome};
use crate::provider::{Dispatcher, AUX_IMAGE_MODEL, AUX_SEARCH_CX};
use crate::storage::local::LocalStore;
use crate::storage::remote::{self, RemoteConfig, RemoteStore};
use crate::storage::{CredentialRecord, Store};

#[derive(Parser)]
#[command(name = "gaod")]
#[command(about = "A terminal chat client with provider dispatch and per-user memory")]
#[command(
    long_about = "Gaod is a terminal chat client that talks to OpenAI and Gemini models, \
falls back to a deterministic simulation when no API key is configured, executes \
bracketed tool calls (calculator, web search, image generation), and keeps \
per-user long-term memory in local or remote storage."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// List or manage the selectable models
    Models {
        #[command(subcommand)]
        action: Option<ModelsAction>,
    },
    /// Show or clear the signed-in user's memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
    /// List or remove accounts (admin only)
    Users {
        #[command(subcommand)]
        action: Option<UsersAction>,
    },
    /// Administrative configuration (admin only)
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
pub enum ModelsAction {
    /// Print the selectable models (default)
    List,
    /// Register a custom model; custom models replace the built-in defaults
    Add {
        /// Display name shown in the model picker
        name: String,
        /// Upstream model id, e.g. gpt-4o
        model_id: String,
        /// Provider tag (openai, vertex, google)
        provider: String,
        /// Treat the model as an image generator
        #[arg(long)]
        image: bool,
    },
    /// Delete a custom model by display name or uuid
    Remove { name: String },
}

#[derive(Subcommand)]
pub enum MemoryAction {
    /// Print every remembered fact
    Show,
    /// Delete all remembered facts (irreversible)
    Clear,
}

#[derive(Subcommand)]
pub enum UsersAction {
    /// List registered users (default)
    List,
    /// Delete an account by email
    Remove { email: String },
}

#[derive(Subcommand)]
pub enum AdminAction {
    /// Store an API key for a provider (openai, vertex, google)
    SetKey { provider: String, key: String },
    /// Delete the stored credentials of a provider
    ClearKey { provider: String },
    /// Store the Google programmable search engine id
    SetSearch { cx: String },
    /// Override the image generation model id
    SetImageModel { model: String },
    /// Set the system prompt prepended to every model call
    SetPrompt { prompt: String },
    /// Probe a remote database without switching to it
    TestDb { url: String, key: String },
    /// Switch the storage backend (local or remote)
    UseDb {
        mode: String,
        url: Option<String>,
        key: Option<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = Config::load()?;
    let client = reqwest::Client::new();
    let store = build_store(&config, client.clone())?;
    store.ensure_seed_admin().await?;

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(config, client, store).await,
        Commands::Models { action } => run_models(store, action).await,
        Commands::Memory { action } => run_memory(store, action).await,
        Commands::Users { action } => run_users(store, action).await,
        Commands::Admin { action } => run_admin(config, client, store, action).await,
    }
}

fn build_store(config: &Config, client: reqwest::Client) -> Result<Store, Box<dyn Error>> {
    match config.storage {
        StorageMode::Local => Ok(Store::new(Arc::new(LocalStore::new()))),
        StorageMode::Remote => {
            let url = config
                .remote_url
                .clone()
                .ok_or("remote storage selected but no URL configured; run 'gaod admin use-db'")?;
            let api_key = config.remote_api_key.clone().unwrap_or_default();
            Ok(Store::new(Arc::new(RemoteStore::new(
                client,
                RemoteConfig { url, api_key },
            ))))
        }
    }
}

async fn run_models(store: Store, action: Option<ModelsAction>) -> Result<(), Box<dyn Error>> {
    match action.unwrap_or(ModelsAction::List) {
        ModelsAction::List => {
            for model in store.selectable_models().await? {
                println!(
                    "{}  [{} / {}]  {}",
                    model.display_name,
                    model.provider.display_name(),
                    model.kind,
                    model.model_id
                );
            }
        }
        ModelsAction::Add {
            name,
            model_id,
            provider,
            image,
        } => {
            sign_in(&store).await?;
            let provider = Provider::from_tag(&provider)?;
            let kind = if image {
                ModelKind::Image
            } else {
                ModelKind::Text
            };
            let model = CustomModel::new(name.clone(), model_id, provider, kind);
            store.save_custom_model(&model).await?;
            println!("✅ Added model {name} ({})", provider.display_name());
        }
        ModelsAction::Remove { name } => {
            sign_in(&store).await?;
            let models = store.list_custom_models().await?;
            let model = models
                .iter()
                .find(|m| m.display_name == name || m.uuid.to_string() == name)
                .ok_or_else(|| format!("no custom model named '{name}'"))?;
            store.delete_custom_model(model.uuid).await?;
            println!("✅ Removed model {}", model.display_name);
        }
    }
    Ok(())
}

async fn run_memory(store: Store, action: MemoryAction) -> Result<(), Box<dyn Error>> {
    let session = sign_in(&store).await?;
    let memory = crate::memory::MemoryStore::new(store);
    match action {
        MemoryAction::Show => {
            let facts = memory.read(&session.user_id).await?;
            if facts.is_empty() {
                println!("(no facts remembered yet)");
            }
            for fact in facts {
                println!("- {fact}");
            }
        }
        MemoryAction::Clear => {
            memory.clear(&session.user_id).await?;
            println!("✅ Memory cleared for {}", session.email);
        }
    }
    Ok(())
}

async fn run_users(store: Store, action: Option<UsersAction>) -> Result<(), Box<dyn Error>> {
    let session = require_admin(&store).await?;
    match action.unwrap_or(UsersAction::List) {
        UsersAction::List => {
            for user in store.list_users().await? {
                println!("{}  <{}>  {}", user.name, user.email, user.role);
            }
        }
        UsersAction::Remove { email } => {
            if session.email.eq_ignore_ascii_case(&email) {
                return Err("refusing to delete the signed-in account".into());
            }
            let user = store
                .find_user_by_email(&email)
                .await?
                .ok_or_else(|| format!("no account with email {email}"))?;
            store.delete_user(&user.id).await?;
            println!("✅ Deleted account {email}");
        }
    }
    Ok(())
}

async fn run_admin(
    mut config: Config,
    client: reqwest::Client,
    store: Store,
    action: AdminAction,
) -> Result<(), Box<dyn Error>> {
    require_admin(&store).await?;
    match action {
        AdminAction::SetKey { provider, key } => {
            let provider = Provider::from_tag(&provider)?;
            let mut record = store
                .credentials_for(provider)
                .await?
                .unwrap_or_else(|| CredentialRecord::new(""));
            record.api_key = key;
            store.set_credentials(provider, &record).await?;
            println!("✅ Stored API key for {}", provider.display_name());
        }
        AdminAction::ClearKey { provider } => {
            let provider = Provider::from_tag(&provider)?;
            store.clear_credentials(provider).await?;
            println!("✅ Cleared credentials for {}", provider.display_name());
        }
        AdminAction::SetSearch { cx } => {
            let record = store
                .credentials_for(Provider::Google)
                .await?
                .unwrap_or_else(|| CredentialRecord::new(""))
                .with_aux(AUX_SEARCH_CX, cx);
            store.set_credentials(Provider::Google, &record).await?;
            println!("✅ Stored search engine id");
        }
        AdminAction::SetImageModel { model } => {
            let record = store
                .credentials_for(Provider::OpenAi)
                .await?
                .unwrap_or_else(|| CredentialRecord::new(""))
                .with_aux(AUX_IMAGE_MODEL, model);
            store.set_credentials(Provider::OpenAi, &record).await?;
            println!("✅ Stored image model override");
        }
        AdminAction::SetPrompt { prompt } => {
            store.set_system_prompt(&prompt).await?;
            println!("✅ Stored system prompt");
        }
        AdminAction::TestDb { url, key } => {
            remote::test_connection(&client, &RemoteConfig { url, api_key: key }).await?;
            println!("✅ Remote database reachable");
        }
        AdminAction::UseDb { mode, url, key } => {
            match mode.as_str() {
                "local" => config.storage = StorageMode::Local,
                "remote" => {
                    let url = url.ok_or("remote mode needs a URL")?;
                    let api_key = key.clone().unwrap_or_default();
                    remote::test_connection(&client, &RemoteConfig {
                        url: url.clone(),
                        api_key,
                    })
                    .await?;
                    config.storage = StorageMode::Remote;
                    config.remote_url = Some(url);
                    config.remote_api_key = key;
                }
                other => return Err(format!("unknown storage mode: {other}").into()),
            }
            config.save()?;
            println!("✅ Storage set to {}", config.storage);
        }
    }
    Ok(())
}

async fn sign_in(store: &Store) -> Result<Session, Box<dyn Error>> {
    let auth = AuthManager::new(store.clone());
    if let Some(session) = auth.current_session().await? {
        println!("Signed in as {}", session.email);
        return Ok(session);
    }
    let email = prompt("Email: ")?;
    let email = email.trim();
    let password = prompt("Password: ")?;
    let password = password.trim();

    if store.find_user_by_email(email).await?.is_none() {
        let answer = prompt("No account with that email. Create one? [y/N] ")?;
        if answer.trim().eq_ignore_ascii_case("y") {
            let name = prompt("Name: ")?;
            return Ok(auth.sign_up(email, password, name.trim()).await?);
        }
    }
    Ok(auth.sign_in(email, password).await?)
}

async fn require_admin(store: &Store) -> Result<Session, Box<dyn Error>> {
    let session = sign_in(store).await?;
    if !session.is_admin() {
        return Err("this command requires an admin account".into());
    }
    Ok(session)
}

fn prompt(label: &str) -> Result<String, Box<dyn Error>> {
    print!("{label}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input)
}

async fn pick_model(config: &Config, store: &Store) -> Result<CustomModel, Box<dyn Error>> {
    let models = store.selectable_models().await?;
    if let Some(name) = &config.default_model {
        if let Some(model) = models.iter().find(|m| &m.display_name == name) {
            return Ok(model.clone());
        }
        eprintln!("⚠️  Default model '{name}' is not selectable, using the first model");
    }
    models
        .into_iter()
        .next()
        .ok_or_else(|| "no models available".into())
}

async fn run_chat(
    config: Config,
    client: reqwest::Client,
    store: Store,
) -> Result<(), Box<dyn Error>> {
    let session = sign_in(&store).await?;
    let model = pick_model(&config, &store).await?;
    println!(
        "Chatting with {} ({}). Commands: /new, /chats, /open <n>, /rename <title>, /delete, /logout, /quit.",
        model.display_name,
        model.provider.display_name()
    );

    let auth = AuthManager::new(store.clone());
    let dispatcher = Dispatcher::new(client, store.clone());
    let orchestrator = ChatOrchestrator::new(store.clone(), dispatcher);
    let mut chat_id: Option<String> = None;

    loop {
        let line = prompt("> ")?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        match text {
            "/quit" | "/exit" => return Ok(()),
            "/logout" => {
                auth.sign_out().await?;
                println!("Signed out.");
                return Ok(());
            }
            "/new" => {
                chat_id = None;
                println!("(started a new chat)");
                continue;
            }
            "/chats" => {
                let chats = store.list_chats(&session.user_id).await?;
                if chats.is_empty() {
                    println!("(no chats yet)");
                }
                for (index, chat) in chats.iter().enumerate() {
                    let marker = if Some(chat.id.as_str()) == chat_id.as_deref() {
                        "*"
                    } else {
                        " "
                    };
                    println!("{marker}{}. {}", index + 1, chat.title());
                }
                continue;
            }
            "/delete" => {
                match chat_id.take() {
                    Some(id) => {
                        store.delete_chat(&id).await?;
                        println!("(chat deleted)");
                    }
                    None => println!("(no active chat; /open one first)"),
                }
                continue;
            }
            _ => {}
        }
        if let Some(rest) = text.strip_prefix("/rename") {
            let title = rest.trim();
            match (&chat_id, title.is_empty()) {
                (Some(id), false) => {
                    let mut chat = store
                        .get_chat(id)
                        .await?
                        .ok_or("the active chat no longer exists")?;
                    chat.set_title(title);
                    store.save_chat(&chat).await?;
                    println!("(renamed to \"{title}\")");
                }
                (None, _) => println!("(no active chat; /open one first)"),
                (_, true) => println!("usage: /rename <title>"),
            }
            continue;
        }
        if let Some(rest) = text.strip_prefix("/open") {
            let chats = store.list_chats(&session.user_id).await?;
            match rest.trim().parse::<usize>() {
                Ok(n) if (1..=chats.len()).contains(&n) => {
                    chat_id = Some(chats[n - 1].id.clone());
                    println!("(opened \"{}\")", chats[n - 1].title());
                }
                _ => println!("usage: /open <number> (see /chats)"),
            }
            continue;
        }
        if text.starts_with('/') {
            println!("(unknown command {text})");
            continue;
        }

        let outcome = orchestrator
            .send_message(&session, chat_id.as_deref(), &model, text, Vec::new())
            .await?;
        match outcome {
            TurnOutcome::Completed {
                chat, assistant, ..
            } => {
                // Replay everything this turn appended after the user message.
                let start = chat
                    .messages
                    .iter()
                    .rposition(|m| m.role.is_user())
                    .map(|at| at + 1)
                    .unwrap_or(0);
                for message in &chat.messages[start..] {
                    if message.role.is_assistant() {
                        if let Some(reasoning) = &assistant.reasoning {
                            println!("[reasoning] {reasoning}");
                        }
                        println!("{}", message.content);
                    } else {
                        println!("[tool] {}", message.content);
                    }
                }
                chat_id = Some(chat.id);
            }
            TurnOutcome::Discarded => println!("(turn cancelled)"),
        }
    }
}
