//! CLI `chat` command: interactive session with persistent memory.
//!
//! Lines starting with `/` are commands; everything else is a message. No
//! ledger is connected: transactions are printed and confirmed at the
//! prompt, and a confirmed one gets a local dry-run digest.

use std::io::Write as _;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use intentmem::chat::{ChatSession, DispatchError, DispatchRequest, LedgerDispatcher};
use intentmem::config::IntentMemConfig;
use intentmem::db;
use intentmem::gateway::{BlobGateway, WalrusStore};
use intentmem::intent::{ActionType, TransactionIntent};
use intentmem::llm::ModelVariant;
use intentmem::memory::cache::PointerCache;
use intentmem::memory::{MemoryManager, SaveOutcome};

type Input = Arc<tokio::sync::Mutex<Lines<BufReader<Stdin>>>>;

const HELP: &str = "\
Commands:
  /save                  save memory now
  /clear                 forget this wallet's memory
  /contact <name> <addr> add or replace a contact
  /forget <name>         remove a contact
  /contacts              list contacts
  /status                show persistence status
  /quit                  save pending changes and exit";

/// Asks for confirmation on stdin instead of signing anything.
struct PromptLedger {
    input: Input,
}

#[async_trait]
impl LedgerDispatcher for PromptLedger {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<String, DispatchError> {
        let amount = match request.amount_minor {
            Some(minor) => format!("{minor} (minor units)"),
            None => "entire balance".to_string(),
        };
        println!("  action:     {}", request.action_type);
        println!("  token:      {}", request.token.as_deref().unwrap_or("native"));
        println!("  amount:     {amount}");
        for recipient in &request.recipients {
            println!("  recipient:  {recipient}");
        }
        prompt("Execute? [y/N] ");

        let answer = self
            .input
            .lock()
            .await
            .next_line()
            .await
            .map_err(|e| DispatchError::ExecutionFailed(e.to_string()))?
            .unwrap_or_default();
        if answer.trim().eq_ignore_ascii_case("y") {
            Ok(format!("dryrun-{}", uuid::Uuid::now_v7().simple()))
        } else {
            Err(DispatchError::UserRejected)
        }
    }
}

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

pub async fn chat(config: &IntentMemConfig, wallet: &str, model: ModelVariant) -> Result<()> {
    let conn = db::open_database(config.resolved_cache_path())?;
    let cache = PointerCache::new(Arc::new(Mutex::new(conn)));
    let store = WalrusStore::new(&config.blob).context("failed to build blob store client")?;
    let gateway = BlobGateway::new(Arc::new(store), config.blob.timeout());
    let memory = Arc::new(MemoryManager::new(
        gateway,
        cache,
        &config.persistence,
        config.blob.epochs,
    ));
    let extractor = super::analyze::build_extractor(config)?;
    let session = ChatSession::new(Arc::clone(&memory), extractor, config.ledger.clone());

    memory.connect(wallet).await;
    if let Some((messages, contacts)) =
        memory.with_aggregate(|a| (a.chat_history.len(), a.contacts.len()))
    {
        println!("Loaded memory for {wallet}: {messages} messages, {contacts} contacts.");
    }
    println!("Type /help for commands.");

    let input: Input = Arc::new(tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()));
    let ledger = PromptLedger {
        input: Arc::clone(&input),
    };

    loop {
        prompt("> ");
        let line = input.lock().await.next_line().await?;
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !run_command(&session, command).await? {
                break;
            }
            continue;
        }

        let intent = session.handle_turn(line, model).await?;
        println!("{}", intent.summary);
        maybe_dispatch(&session, &intent, &ledger).await?;
    }

    memory.shutdown().await;
    Ok(())
}

async fn maybe_dispatch(
    session: &ChatSession,
    intent: &TransactionIntent,
    ledger: &PromptLedger,
) -> Result<()> {
    if !intent.is_transaction() || intent.action_type() == ActionType::None {
        return Ok(());
    }
    let outcome = session.dispatch(intent, ledger).await?;
    println!("{}", outcome.message());
    Ok(())
}

/// Returns `false` when the session should end.
async fn run_command(session: &ChatSession, command: &str) -> Result<bool> {
    let memory = session.memory();
    let mut parts = command.split_whitespace();
    match parts.next().unwrap_or_default() {
        "quit" | "exit" => return Ok(false),
        "help" => println!("{HELP}"),
        "save" => match memory.save_now().await {
            SaveOutcome::Saved { pointer } => println!("Saved ({pointer})."),
            SaveOutcome::Failed { notice: Some(update), .. } => {
                println!("{}", update.shown.message);
                memory.dismiss_notice(update.shown.id);
            }
            SaveOutcome::Failed { error, notice: None } => {
                tracing::debug!(%error, "save failure notice throttled");
            }
            SaveOutcome::NotReady => println!("Memory is not loaded."),
        },
        "clear" => {
            memory.clear().await?;
            println!("Memory cleared.");
        }
        "contact" => match (parts.next(), parts.next()) {
            (Some(name), Some(address)) => {
                session.add_contact(name, address)?;
                println!("Saved contact {name} → {address}.");
            }
            _ => println!("Usage: /contact <name> <address>"),
        },
        "forget" => match parts.next() {
            Some(name) if session.remove_contact(name)? => println!("Removed {name}."),
            Some(name) => println!("No contact named {name}."),
            None => println!("Usage: /forget <name>"),
        },
        "contacts" => {
            let contacts = memory.with_aggregate(|a| a.contacts.clone()).unwrap_or_default();
            if contacts.is_empty() {
                println!("No contacts yet.");
            }
            for contact in contacts {
                println!("  {:<16} {}", contact.name, contact.address);
            }
        }
        "status" => println!("{}", serde_json::to_string_pretty(&memory.status())?),
        other => println!("Unknown command /{other}. Type /help."),
    }
    Ok(true)
}
