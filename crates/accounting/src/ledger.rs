use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwise_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, SourceDocument, TenantId, UserId,
};
use stockwise_events::Event;

use crate::journal::{EntryHeader, JournalEntry, JournalEntryId, JournalStatus, validate_lines};

/// Ledger identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub AggregateId);

impl LedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Ledger (one per tenant).
///
/// The ledger does not hold the entries or balances. It tracks which source
/// documents have been posted and the status of each entry, which is all it
/// needs to keep posting idempotent and reversals one-shot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    id: LedgerId,
    tenant_id: Option<TenantId>,
    posted_sources: BTreeSet<SourceDocument>,
    entries: BTreeMap<JournalEntryId, JournalStatus>,
    version: u64,
    created: bool,
}

impl Ledger {
    /// Empty aggregate for rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            tenant_id: None,
            posted_sources: BTreeSet::new(),
            entries: BTreeMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn has_posted(&self, source: &SourceDocument) -> bool {
        self.posted_sources.contains(source)
    }

    pub fn entry_status(&self, id: JournalEntryId) -> Option<JournalStatus> {
        self.entries.get(&id).copied()
    }
}

impl AggregateRoot for Ledger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PostJournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJournalEntry {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry: JournalEntry,
    pub currency_scale: u32,
}

/// Command: ReverseJournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseJournalEntry {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub original: JournalEntry,
    pub reversal: EntryHeader,
    pub reason: String,
}

/// Command: mark a source document as handled when it derived no lines, so a
/// second posting for it is still a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSource {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub source: SourceDocument,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCommand {
    PostJournalEntry(PostJournalEntry),
    ReverseJournalEntry(ReverseJournalEntry),
    ClaimSource(ClaimSource),
}

/// Event: JournalEntryPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryPosted {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry: JournalEntry,
    pub occurred_at: DateTime<Utc>,
}

/// Event: JournalEntryReversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryReversed {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub original_id: JournalEntryId,
    pub reversal_id: JournalEntryId,
    pub reason: String,
    pub reversed_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    JournalEntryPosted(JournalEntryPosted),
    JournalEntryReversed(JournalEntryReversed),
    SourceClaimed {
        tenant_id: TenantId,
        ledger_id: LedgerId,
        source: SourceDocument,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::JournalEntryPosted(_) => "accounting.ledger.journal_entry_posted",
            LedgerEvent::JournalEntryReversed(_) => "accounting.ledger.journal_entry_reversed",
            LedgerEvent::SourceClaimed { .. } => "accounting.ledger.source_claimed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::JournalEntryPosted(e) => e.occurred_at,
            LedgerEvent::JournalEntryReversed(e) => e.occurred_at,
            LedgerEvent::SourceClaimed { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Ledger {
    type Command = JournalCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::JournalEntryPosted(e) => {
                self.id = e.ledger_id;
                if self.tenant_id.is_none() {
                    self.tenant_id = Some(e.tenant_id);
                    self.created = true;
                }
                self.posted_sources.insert(e.entry.source.clone());
                self.entries.insert(e.entry.id, e.entry.status);
            }
            LedgerEvent::JournalEntryReversed(e) => {
                self.entries.insert(e.original_id, JournalStatus::Reversed);
            }
            LedgerEvent::SourceClaimed {
                tenant_id,
                ledger_id,
                source,
                ..
            } => {
                self.id = *ledger_id;
                if self.tenant_id.is_none() {
                    self.tenant_id = Some(*tenant_id);
                    self.created = true;
                }
                self.posted_sources.insert(source.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalCommand::PostJournalEntry(cmd) => self.handle_post(cmd),
            JournalCommand::ReverseJournalEntry(cmd) => self.handle_reverse(cmd),
            JournalCommand::ClaimSource(cmd) => {
                self.ensure_tenant(cmd.tenant_id)?;
                if self.posted_sources.contains(&cmd.source) {
                    return Err(DomainError::DuplicatePosting(cmd.source.to_string()));
                }
                Ok(vec![LedgerEvent::SourceClaimed {
                    tenant_id: cmd.tenant_id,
                    ledger_id: cmd.ledger_id,
                    source: cmd.source.clone(),
                    occurred_at: cmd.occurred_at,
                }])
            }
        }
    }
}

impl Ledger {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_post(&self, cmd: &PostJournalEntry) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.entry.status != JournalStatus::Posted {
            return Err(DomainError::validation("only posted entries can be recorded"));
        }
        validate_lines(&cmd.entry.lines, cmd.currency_scale)?;

        if self.posted_sources.contains(&cmd.entry.source) {
            return Err(DomainError::DuplicatePosting(cmd.entry.source.to_string()));
        }
        if self.entries.contains_key(&cmd.entry.id) {
            return Err(DomainError::conflict(format!(
                "journal entry {} already exists",
                cmd.entry.id
            )));
        }

        Ok(vec![LedgerEvent::JournalEntryPosted(JournalEntryPosted {
            tenant_id: cmd.tenant_id,
            ledger_id: cmd.ledger_id,
            entry: cmd.entry.clone(),
            occurred_at: cmd.entry.entry_date,
        })])
    }

    fn handle_reverse(&self, cmd: &ReverseJournalEntry) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("a reversal reason is required"));
        }
        match self.entries.get(&cmd.original.id) {
            None => {
                return Err(DomainError::not_found(format!(
                    "journal entry {}",
                    cmd.original.id
                )));
            }
            Some(JournalStatus::Reversed) => {
                return Err(DomainError::invalid_transition("reversed", "reverse"));
            }
            Some(JournalStatus::Posted) => {}
        }
        if cmd.original.reversal_of.is_some() {
            return Err(DomainError::validation("a reversal cannot itself be reversed"));
        }

        let source = SourceDocument::new("REVERSAL", cmd.original.number.clone())?;
        if self.posted_sources.contains(&source) {
            return Err(DomainError::DuplicatePosting(source.to_string()));
        }

        let mirror = JournalEntry {
            id: cmd.reversal.id,
            number: cmd.reversal.number.clone(),
            entry_date: cmd.reversal.entry_date,
            description: format!("Reversal of {}: {}", cmd.original.number, cmd.reason),
            source,
            status: JournalStatus::Posted,
            lines: cmd.original.lines.iter().map(|l| l.mirrored()).collect(),
            posted_by: cmd.reversal.posted_by,
            reversal_of: Some(cmd.original.id),
            reversed_by: None,
        };

        Ok(vec![
            LedgerEvent::JournalEntryPosted(JournalEntryPosted {
                tenant_id: cmd.tenant_id,
                ledger_id: cmd.ledger_id,
                entry: mirror,
                occurred_at: cmd.reversal.entry_date,
            }),
            LedgerEvent::JournalEntryReversed(JournalEntryReversed {
                tenant_id: cmd.tenant_id,
                ledger_id: cmd.ledger_id,
                original_id: cmd.original.id,
                reversal_id: cmd.reversal.id,
                reason: cmd.reason.clone(),
                reversed_by: cmd.reversal.posted_by,
                occurred_at: cmd.reversal.entry_date,
            }),
        ])
    }
}
