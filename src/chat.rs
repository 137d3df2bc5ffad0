//! Turn handling on top of the extractor and the memory manager.
//!
//! A [`ChatSession`] is what a front end talks to: it records each user turn,
//! asks the [`IntentExtractor`] for an intent with the wallet's memory as
//! context, resolves recipients against the wallet's contacts, and hands
//! executable intents to a [`LedgerDispatcher`]. Every dispatch outcome is
//! written back to the activity log.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::LedgerConfig;
use crate::intent::prompt::{HistoryTurn, Personalization, MAX_HISTORY_TURNS};
use crate::intent::{ActionType, ExtractRequest, IntentExtractor, TransactionIntent};
use crate::llm::ModelVariant;
use crate::memory::types::{names_match, now_millis, ActivityLogEntry, ActivityStatus, ChatMessage, Contact};
use crate::memory::{ManagerError, MemoryManager};
use crate::resolver::{resolve, resolve_all};

/// What the ledger collaborator is asked to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub action_type: ActionType,
    /// `None` is the native coin.
    pub token: Option<String>,
    /// Amount in minor units. `None` only when `is_max` is set.
    pub amount_minor: Option<u128>,
    pub is_max: bool,
    /// Resolved addresses. Empty for DEFI_SUPPLY.
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("transaction was rejected by the user")]
    UserRejected,
    #[error("transaction failed: {0}")]
    ExecutionFailed(String),
}

/// Builds, signs and submits transactions. Returns the transaction digest.
#[async_trait]
pub trait LedgerDispatcher: Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<String, DispatchError>;
}

/// Result of [`ChatSession::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Executed { digest: String },
    Failed { error: DispatchError },
    /// Recognized but not executable yet (SWAP, STAKE).
    Deferred { message: String },
    /// Not executable as given; nothing was sent to the ledger.
    Rejected { message: String },
}

impl DispatchOutcome {
    /// Reply text for the user.
    pub fn message(&self) -> String {
        match self {
            Self::Executed { digest } => format!("Done. Transaction digest: {digest}"),
            Self::Failed {
                error: DispatchError::UserRejected,
            } => "Transaction cancelled.".to_string(),
            Self::Failed { error } => format!("Sorry, that didn't go through. {error}."),
            Self::Deferred { message } | Self::Rejected { message } => message.clone(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is missing")]
    Missing,
    #[error("amount {0:?} is not a positive decimal number")]
    Invalid(String),
    #[error("amount {amount:?} has more than {decimals} decimal places")]
    TooPrecise { amount: String, decimals: u32 },
    #[error("amount {0:?} is too large")]
    Overflow(String),
}

/// Convert a decimal string in major units to minor units, exactly.
/// `"0.5"` with 9 decimals is `500_000_000`.
pub fn to_minor_units(amount: &str, decimals: u32) -> Result<u128, AmountError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(AmountError::Missing);
    }
    let invalid = || AmountError::Invalid(amount.to_string());

    let (whole, frac) = match amount.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let frac = frac.trim_end_matches('0');
    if frac.len() > decimals as usize {
        return Err(AmountError::TooPrecise {
            amount: amount.to_string(),
            decimals,
        });
    }

    let overflow = || AmountError::Overflow(amount.to_string());
    let scale = 10u128.checked_pow(decimals).ok_or_else(overflow)?;
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow())?
    };
    let frac_value: u128 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = decimals as usize);
        padded.parse().map_err(|_| overflow())?
    };

    let total = whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_value))
        .ok_or_else(overflow)?;
    if total == 0 {
        return Err(invalid());
    }
    Ok(total)
}

fn unresolved_reply(token: &str) -> TransactionIntent {
    TransactionIntent::chat(format!(
        "I couldn't find a contact or address for \"{token}\". Add them as a contact or use the full address."
    ))
}

/// One wallet's conversation.
pub struct ChatSession {
    memory: Arc<MemoryManager>,
    extractor: IntentExtractor,
    ledger: LedgerConfig,
}

impl ChatSession {
    pub fn new(memory: Arc<MemoryManager>, extractor: IntentExtractor, ledger: LedgerConfig) -> Self {
        Self {
            memory,
            extractor,
            ledger,
        }
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Handle one user utterance and return the intent to show.
    /// Transaction intents come back with recipients replaced by addresses.
    #[tracing::instrument(skip_all, fields(variant = %variant))]
    pub async fn handle_turn(
        &self,
        utterance: &str,
        variant: ModelVariant,
    ) -> Result<TransactionIntent, ManagerError> {
        self.memory.append_chat_message(ChatMessage::user(utterance))?;

        let (history, personalization, contacts) = self
            .memory
            .with_aggregate(|agg| {
                // The last message is the utterance itself.
                let recent = agg.recent_chat(MAX_HISTORY_TURNS + 1);
                let prior = &recent[..recent.len().saturating_sub(1)];
                let history: Vec<HistoryTurn> = prior
                    .iter()
                    .map(|m| HistoryTurn {
                        role: m.role,
                        content: m.content.clone(),
                    })
                    .collect();
                let personalization = Personalization::from_aggregate(agg, recent.len());
                (history, personalization, agg.contacts.clone())
            })
            .ok_or(ManagerError::NotReady)?;

        let request = ExtractRequest {
            utterance: utterance.to_string(),
            history,
            variant,
            personalization: Some(personalization),
            link_context: None,
        };
        let intent = self.extractor.extract(&request).await;
        let intent = self.resolve_recipients(intent, &contacts);

        self.memory
            .append_chat_message(ChatMessage::assistant(intent.summary.clone()))?;
        Ok(intent)
    }

    fn resolve_recipients(&self, mut intent: TransactionIntent, contacts: &[Contact]) -> TransactionIntent {
        if !intent.is_transaction() {
            return intent;
        }
        let prefix = &self.ledger.address_prefix;
        let params = &mut intent.data.params;

        match intent.data.action_type {
            ActionType::Transfer => {
                let token = params.recipient.clone().unwrap_or_default();
                let resolution = resolve(&token, contacts, prefix);
                if !resolution.is_resolved() {
                    tracing::info!(token = %token, "transfer recipient unresolved");
                    return unresolved_reply(&token);
                }
                params.recipient = Some(resolution.address);
            }
            ActionType::BatchTransfer => {
                let tokens = params.recipients.clone().unwrap_or_default();
                if tokens.is_empty() {
                    return unresolved_reply("");
                }
                match resolve_all(tokens.iter().map(String::as_str), contacts, prefix) {
                    Ok(resolved) => {
                        params.recipients = Some(resolved.into_iter().map(|r| r.address).collect());
                    }
                    Err(token) => {
                        tracing::info!(token = %token, "batch recipient unresolved");
                        return unresolved_reply(&token);
                    }
                }
            }
            _ => {}
        }
        intent
    }

    /// Execute a transaction intent through `ledger` and record the outcome.
    pub async fn dispatch(
        &self,
        intent: &TransactionIntent,
        ledger: &dyn LedgerDispatcher,
    ) -> Result<DispatchOutcome, ManagerError> {
        let request = match self.build_request(intent) {
            Ok(request) => request,
            Err(outcome) => return Ok(outcome),
        };

        let result = ledger.dispatch(&request).await;
        let params = intent.params();
        let (digest, status, outcome) = match result {
            Ok(digest) => {
                tracing::info!(action = %request.action_type, %digest, "transaction executed");
                (digest.clone(), ActivityStatus::Success, DispatchOutcome::Executed { digest })
            }
            Err(error) => {
                tracing::warn!(action = %request.action_type, %error, "transaction not executed");
                (String::new(), ActivityStatus::Failed, DispatchOutcome::Failed { error })
            }
        };

        let entry = ActivityLogEntry {
            action_type: request.action_type,
            digest,
            amount: params.amount.clone(),
            recipient: (request.action_type == ActionType::Transfer)
                .then(|| request.recipients.first().cloned())
                .flatten(),
            recipients: (request.action_type == ActionType::BatchTransfer)
                .then(|| request.recipients.clone()),
            timestamp: now_millis(),
            status,
        };
        self.memory.append_activity_log(entry)?;
        self.memory
            .append_chat_message(ChatMessage::assistant(outcome.message()))?;
        Ok(outcome)
    }

    fn build_request(&self, intent: &TransactionIntent) -> Result<DispatchRequest, DispatchOutcome> {
        let rejected = |message: String| DispatchOutcome::Rejected { message };
        if !intent.is_transaction() {
            return Err(rejected("There is no transaction to execute.".into()));
        }

        let action_type = intent.action_type();
        match action_type {
            ActionType::Swap | ActionType::Stake => {
                return Err(DispatchOutcome::Deferred {
                    message: format!(
                        "{} isn't available yet. I've noted the request, but nothing was executed.",
                        action_type.as_str().to_lowercase()
                    ),
                });
            }
            _ if !action_type.is_dispatchable() => {
                return Err(rejected("There is no transaction to execute.".into()))
            }
            _ => {}
        }

        let params = intent.params();
        let is_max = params.is_max.unwrap_or(false);
        let amount_minor = match params.amount.as_deref() {
            Some(amount) => Some(
                to_minor_units(amount, self.ledger.decimals).map_err(|e| rejected(format!("I can't use that amount: {e}.")))?,
            ),
            None if is_max => None,
            None => return Err(rejected("How much should I send?".into())),
        };

        let contacts = self.memory.with_aggregate(|a| a.contacts.clone()).unwrap_or_default();
        let prefix = &self.ledger.address_prefix;
        let recipients = match action_type {
            ActionType::Transfer => {
                let token = params.recipient.as_deref().unwrap_or_default();
                let resolution = resolve(token, &contacts, prefix);
                if !resolution.is_resolved() {
                    return Err(rejected(unresolved_reply(token).summary));
                }
                vec![resolution.address]
            }
            ActionType::BatchTransfer => {
                let tokens = params.recipients.as_deref().unwrap_or_default();
                if tokens.is_empty() {
                    return Err(rejected(unresolved_reply("").summary));
                }
                resolve_all(tokens.iter().map(String::as_str), &contacts, prefix)
                    .map_err(|token| rejected(unresolved_reply(&token).summary))?
                    .into_iter()
                    .map(|r| r.address)
                    .collect()
            }
            _ => Vec::new(),
        };

        Ok(DispatchRequest {
            action_type,
            token: params.token.clone(),
            amount_minor,
            is_max,
            recipients,
        })
    }

    /// Add or replace a contact (names compare case-insensitively).
    pub fn add_contact(&self, name: &str, address: &str) -> Result<(), ManagerError> {
        let mut contacts = self
            .memory
            .with_aggregate(|a| a.contacts.clone())
            .ok_or(ManagerError::NotReady)?;
        contacts.retain(|c| !names_match(&c.name, name));
        contacts.push(Contact::new(name.trim(), address.trim()));
        self.memory.set_contacts(contacts)
    }

    /// Returns whether a contact was removed.
    pub fn remove_contact(&self, name: &str) -> Result<bool, ManagerError> {
        let mut contacts = self
            .memory
            .with_aggregate(|a| a.contacts.clone())
            .ok_or(ManagerError::NotReady)?;
        let before = contacts.len();
        contacts.retain(|c| !names_match(&c.name, name));
        if contacts.len() == before {
            return Ok(false);
        }
        self.memory.set_contacts(contacts)?;
        Ok(true)
    }
}
