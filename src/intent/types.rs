//! Canonical intent shape.
//!
//! Defines [`TransactionIntent`] (the only value the extractor ever hands back),
//! its [`IntentKind`] and [`ActionType`] enums, and the always-present
//! [`IntentParams`] object.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether an intent is a plain reply or a request to move funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentKind {
    Chat,
    Transaction,
}

/// The ledger action a transaction intent asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Transfer,
    BatchTransfer,
    /// Deferred: recognized but never executed.
    Swap,
    /// Deferred: recognized but never executed.
    Stake,
    DefiSupply,
    None,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "TRANSFER",
            Self::BatchTransfer => "BATCH_TRANSFER",
            Self::Swap => "SWAP",
            Self::Stake => "STAKE",
            Self::DefiSupply => "DEFI_SUPPLY",
            Self::None => "NONE",
        }
    }

    /// Actions the ledger dispatch collaborator can execute.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Transfer | Self::BatchTransfer | Self::DefiSupply)
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action parameters. Every field is optional and nullable, but the object
/// itself is always present, even for CHAT/NONE intents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IntentParams {
    /// Decimal amount in major units, as a string (e.g. `"10"`, `"0.5"`).
    #[serde(default)]
    pub amount: Option<String>,
    /// Token symbol; `null` means the chain's native coin.
    #[serde(default)]
    pub token: Option<String>,
    /// Contact name or raw address of a single recipient.
    #[serde(default)]
    pub recipient: Option<String>,
    /// Recipients of a batch transfer.
    #[serde(default)]
    pub recipients: Option<Vec<String>>,
    /// Destination token of a swap.
    #[serde(default)]
    pub target_token: Option<String>,
    /// Spend the whole balance instead of `amount`.
    #[serde(default, rename = "isMax")]
    pub is_max: Option<bool>,
}

/// Action plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IntentData {
    pub action_type: ActionType,
    pub params: IntentParams,
}

impl Default for IntentData {
    fn default() -> Self {
        Self {
            action_type: ActionType::None,
            params: IntentParams::default(),
        }
    }
}

/// Structured result of interpreting one user utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TransactionIntent {
    #[serde(rename = "type")]
    pub kind: IntentKind,
    /// Reply text shown to the user.
    pub summary: String,
    pub data: IntentData,
}

impl TransactionIntent {
    /// A plain reply with no action.
    pub fn chat(summary: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::Chat,
            summary: summary.into(),
            data: IntentData::default(),
        }
    }

    pub fn transaction(
        summary: impl Into<String>,
        action_type: ActionType,
        params: IntentParams,
    ) -> Self {
        Self {
            kind: IntentKind::Transaction,
            summary: summary.into(),
            data: IntentData {
                action_type,
                params,
            },
        }
    }

    pub fn is_transaction(&self) -> bool {
        self.kind == IntentKind::Transaction
    }

    pub fn action_type(&self) -> ActionType {
        self.data.action_type
    }

    pub fn params(&self) -> &IntentParams {
        &self.data.params
    }
}

/// JSON Schema of [`TransactionIntent`], embedded in the model's output contract.
pub fn intent_json_schema() -> String {
    let schema = schemars::schema_for!(TransactionIntent);
    serde_json::to_string(&schema).unwrap_or_default()
}
