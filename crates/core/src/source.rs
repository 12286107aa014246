//! References from derived records (layers, consumptions, journal entries) back
//! to the business document that caused them.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// `(document type, document number)`, e.g. `("ADJUSTMENT", "ADJ-000042")`.
///
/// Journal posting is idempotent per source document within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceDocument {
    pub document_type: String,
    pub number: String,
}

impl SourceDocument {
    pub fn new(document_type: impl Into<String>, number: impl Into<String>) -> DomainResult<Self> {
        let document_type = document_type.into();
        let number = number.into();
        if document_type.trim().is_empty() || number.trim().is_empty() {
            return Err(DomainError::validation(
                "source document type and number are required",
            ));
        }
        Ok(Self {
            document_type,
            number,
        })
    }

    /// Derived reference, e.g. the COGS leg of a transfer write-off.
    pub fn derived(&self, suffix: &str) -> Self {
        Self {
            document_type: self.document_type.clone(),
            number: format!("{}/{suffix}", self.number),
        }
    }
}

impl core::fmt::Display for SourceDocument {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.document_type, self.number)
    }
}
