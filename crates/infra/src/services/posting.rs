//! Journal posting, reversal and ledger queries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use stockwise_accounting::{
    Account, EntryHeader, JournalCommand, JournalEntry, JournalEntryId, JournalStatus,
    LedgerEvent, ReverseJournalEntry, SourceEvent, TrialBalanceRow, trial_balance,
};
use stockwise_core::{Aggregate, DomainError, SourceDocument, TenantId};

use crate::error::ServiceResult;
use crate::store::{InMemoryStore, RowKey, sequence};

use super::stock_ops::post_in;
use super::{ServiceConfig, ServiceContext};

/// Journal query filter. Every field narrows the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EntryFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub source_type: Option<String>,
    pub source_number: Option<String>,
    pub status: Option<JournalStatus>,
}

impl EntryFilter {
    fn matches(&self, entry: &JournalEntry) -> bool {
        self.from.is_none_or(|from| entry.entry_date >= from)
            && self.to.is_none_or(|to| entry.entry_date <= to)
            && self
                .source_type
                .as_ref()
                .is_none_or(|t| entry.source.document_type == *t)
            && self
                .source_number
                .as_ref()
                .is_none_or(|n| entry.source.number == *n)
            && self.status.is_none_or(|s| entry.status == s)
    }
}

#[derive(Clone)]
pub struct PostingService {
    store: Arc<InMemoryStore>,
    config: Arc<ServiceConfig>,
}

impl PostingService {
    pub fn new(store: Arc<InMemoryStore>, config: Arc<ServiceConfig>) -> Self {
        Self { store, config }
    }

    /// Post one entry for `event`. Fails with `PostingImbalance` or
    /// `DuplicatePosting` without persisting anything.
    pub fn post(&self, ctx: &ServiceContext, event: SourceEvent) -> ServiceResult<JournalEntry> {
        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock([RowKey::Ledger])?;
        let entry = post_in(&mut tx, ctx, &self.config, &event)?.ok_or_else(|| {
            DomainError::validation(format!("{} for {} has nothing to post", event.event_type(), event.source()))
        })?;
        tx.commit()?;
        Ok(entry)
    }

    /// Post the mirror of entry `id` and mark the original Reversed.
    pub fn reverse(
        &self,
        ctx: &ServiceContext,
        id: JournalEntryId,
        reason: String,
    ) -> ServiceResult<JournalEntry> {
        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock([RowKey::Ledger])?;
        let mut original = tx
            .journal_entry(id)?
            .ok_or_else(|| DomainError::not_found(format!("journal entry {id}")))?;

        let mut ledger = tx.ledger()?;
        let events = ledger.execute(&JournalCommand::ReverseJournalEntry(ReverseJournalEntry {
            tenant_id: ctx.tenant_id,
            ledger_id: ledger.id_typed(),
            original: original.clone(),
            reversal: EntryHeader {
                id: JournalEntryId::generate(),
                number: tx.next_number(sequence::JOURNAL_ENTRY)?,
                entry_date: ctx.now,
                posted_by: ctx.actor,
            },
            reason,
        }))?;
        let reversal = events
            .iter()
            .find_map(|e| match e {
                LedgerEvent::JournalEntryPosted(posted) => Some(posted.entry.clone()),
                _ => None,
            })
            .ok_or_else(|| DomainError::invariant("reversal produced no mirror entry"))?;

        original.status = JournalStatus::Reversed;
        original.reversed_by = Some(reversal.id);
        tx.put_journal_entry(original.clone())?;
        tx.put_journal_entry(reversal.clone())?;
        tx.save(ledger, &events, ctx.actor)?;
        tx.commit()?;

        info!(
            tenant_id = %ctx.tenant_id,
            original = %original.number,
            reversal = %reversal.number,
            "journal entry reversed"
        );
        Ok(reversal)
    }

    pub fn entry(&self, tenant_id: TenantId, id: JournalEntryId) -> ServiceResult<JournalEntry> {
        self.store
            .read(tenant_id, |t| t.journal_entry(id).cloned())?
            .ok_or_else(|| DomainError::not_found(format!("journal entry {id}")).into())
    }

    pub fn entry_for_source(
        &self,
        tenant_id: TenantId,
        source: &SourceDocument,
    ) -> ServiceResult<Option<JournalEntry>> {
        self.store
            .read(tenant_id, |t| t.journal_entry_for(source).cloned())
    }

    /// Matching entries ordered by date, then number.
    pub fn entries(&self, tenant_id: TenantId, filter: &EntryFilter) -> ServiceResult<Vec<JournalEntry>> {
        let mut found: Vec<JournalEntry> = self.store.read(tenant_id, |t| {
            t.journal_entries()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect()
        })?;
        found.sort_by(|a, b| (a.entry_date, &a.number).cmp(&(b.entry_date, &b.number)));
        Ok(found)
    }

    /// Per-account totals over every entry dated on or before `as_of`.
    pub fn trial_balance(
        &self,
        tenant_id: TenantId,
        as_of: Option<DateTime<Utc>>,
    ) -> ServiceResult<Vec<TrialBalanceRow>> {
        self.store.read(tenant_id, |t| {
            trial_balance(
                t.journal_entries()
                    .filter(|e| as_of.is_none_or(|at| e.entry_date <= at)),
            )
        })
    }

    pub fn chart_of_accounts(&self) -> Vec<Account> {
        self.config.posting_rules.chart().cloned().collect()
    }
}
