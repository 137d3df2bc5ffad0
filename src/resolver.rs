//! Recipient resolution against a wallet's contacts.
//!
//! Tokens that look like raw addresses pass through, with a best-effort
//! reverse lookup for a display name. Anything else must match a contact name
//! exactly (ignoring case); otherwise the result is unresolved and the caller
//! must not build a transaction from it.

use serde::Serialize;

use crate::memory::types::{names_match, Contact};

/// Outcome of resolving one recipient token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Chain address, or empty when unresolved.
    pub address: String,
    /// Display name, when known.
    pub name: Option<String>,
}

impl Resolution {
    pub fn unresolved() -> Self {
        Self {
            address: String::new(),
            name: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.address.is_empty()
    }
}

/// Resolve `token` against `contacts`. `address_prefix` marks raw addresses
/// (`"0x"` on Sui).
pub fn resolve(token: &str, contacts: &[Contact], address_prefix: &str) -> Resolution {
    let token = token.trim();
    if token.is_empty() {
        return Resolution::unresolved();
    }

    if has_prefix_ignore_case(token, address_prefix) {
        let name = contacts
            .iter()
            .find(|c| c.address.eq_ignore_ascii_case(token))
            .map(|c| c.name.clone());
        return Resolution {
            address: token.to_string(),
            name,
        };
    }

    match contacts.iter().find(|c| names_match(&c.name, token)) {
        Some(contact) => Resolution {
            address: contact.address.clone(),
            name: Some(contact.name.clone()),
        },
        None => {
            tracing::debug!(token, "recipient did not resolve");
            Resolution::unresolved()
        }
    }
}

/// Resolve every token, stopping at the first one that does not resolve.
/// The error carries that token.
pub fn resolve_all<'a, I>(tokens: I, contacts: &[Contact], address_prefix: &str) -> Result<Vec<Resolution>, String>
where
    I: IntoIterator<Item = &'a str>,
{
    tokens
        .into_iter()
        .map(|token| {
            let resolution = resolve(token, contacts, address_prefix);
            if resolution.is_resolved() {
                Ok(resolution)
            } else {
                Err(token.to_string())
            }
        })
        .collect()
}

fn has_prefix_ignore_case(token: &str, prefix: &str) -> bool {
    !prefix.is_empty()
        && token
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
