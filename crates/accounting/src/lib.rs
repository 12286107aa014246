//! Accounting module (double-entry journal derived from inventory and billing events).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod account;
pub mod journal;
pub mod ledger;
pub mod posting;

pub use account::{Account, AccountKind, AccountRole, PostingRules};
pub use journal::{
    EntryHeader, JournalEntry, JournalEntryId, JournalLine, JournalStatus, TrialBalanceRow,
    trial_balance, validate_lines,
};
pub use ledger::{
    ClaimSource, JournalCommand, JournalEntryPosted, JournalEntryReversed, Ledger, LedgerEvent, LedgerId,
    PostJournalEntry, ReverseJournalEntry,
};
pub use posting::{ManualLine, SourceEvent, create_journal_entry};
