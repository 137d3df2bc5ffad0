//! Intent resolution pipeline.
//!
//! An utterance flows through [`prompt`] assembly, a generative backend call,
//! [`sanitize`] (fence stripping, object extraction, truncation repair),
//! [`normalize`] (legacy aliases, shape coercion, schema validation) and comes
//! out as a [`types::TransactionIntent`]. The [`extractor`] ties the stages
//! together and absorbs every failure into a localized CHAT reply.

pub mod extractor;
pub mod locale;
pub mod normalize;
pub mod prompt;
pub mod sanitize;
pub mod types;

pub use extractor::{ExtractRequest, IntentExtractor};
pub use types::{ActionType, IntentData, IntentKind, IntentParams, TransactionIntent};
