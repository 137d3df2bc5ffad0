//! Natural-language transaction intents with durable per-wallet memory.
//!
//! intentmem turns free-form requests ("send 10 SUI to Ali") into structured,
//! schema-checked [`intent::TransactionIntent`] values using a generative
//! model, and keeps a per-wallet memory (chat history, activity log,
//! contacts, summary) committed to a content-addressed blob store.
//!
//! # Architecture
//!
//! - **Extraction**: prompt assembly, a Gemini `generateContent` call, output
//!   sanitation and truncation repair, normalization and strict validation.
//!   Every failure degrades to a localized CHAT reply; extraction never errors.
//! - **Memory**: one [`memory::MemoryManager`] per connected wallet applies
//!   mutations immediately and commits snapshots through a debounced,
//!   single-flight worker with failure backoff.
//! - **Storage**: snapshots live in a Walrus-style blob store; a local SQLite
//!   cache maps each wallet to its latest snapshot pointer.
//! - **Transport**: an axum HTTP server exposes intent analysis and a blob
//!   proxy; the CLI offers a one-shot analyzer and an interactive chat.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite pointer cache (schema, migrations, health checks)
//! - [`intent`]: Intent types and the extraction pipeline
//! - [`llm`]: Generative backend trait and Gemini client
//! - [`resolver`]: Recipient resolution against contacts
//! - [`gateway`]: Timeout-guarded blob store access
//! - [`memory`]: Memory aggregate, commit scheduler, pointer cache, and manager
//! - [`chat`]: Turn handling and ledger dispatch
//! - [`server`]: HTTP routes

pub mod chat;
pub mod config;
pub mod db;
pub mod gateway;
pub mod intent;
pub mod llm;
pub mod memory;
pub mod resolver;
pub mod server;
