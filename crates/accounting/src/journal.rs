//! Journal entries: immutable once posted, reversed only by a mirror entry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwise_core::{AggregateId, DomainError, DomainResult, Money, SourceDocument, UserId};

use crate::account::Account;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JournalEntryId(pub AggregateId);

impl JournalEntryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for JournalEntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for JournalEntryId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalStatus {
    Posted,
    Reversed,
}

/// One line of a journal entry. Exactly one of `debit` / `credit` is non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub line_number: u32,
    pub account: Account,
    pub debit: Money,
    pub credit: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl JournalLine {
    pub fn debit(account: &Account, amount: Money) -> Self {
        Self {
            line_number: 0,
            account: account.clone(),
            debit: amount,
            credit: Money::ZERO,
            memo: None,
        }
    }

    pub fn credit(account: &Account, amount: Money) -> Self {
        Self {
            line_number: 0,
            account: account.clone(),
            debit: Money::ZERO,
            credit: amount,
            memo: None,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// The same line on the opposite side.
    pub fn mirrored(&self) -> Self {
        Self {
            line_number: self.line_number,
            account: self.account.clone(),
            debit: self.credit,
            credit: self.debit,
            memo: self.memo.clone(),
        }
    }
}

/// Identity, number and date assigned to an entry by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    pub id: JournalEntryId,
    pub number: String,
    pub entry_date: DateTime<Utc>,
    pub posted_by: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub number: String,
    pub entry_date: DateTime<Utc>,
    pub description: String,
    pub source: SourceDocument,
    pub status: JournalStatus,
    pub lines: Vec<JournalLine>,
    pub posted_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversal_of: Option<JournalEntryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversed_by: Option<JournalEntryId>,
}

impl JournalEntry {
    pub fn total_debits(&self) -> Money {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credits(&self) -> Money {
        self.lines.iter().map(|l| l.credit).sum()
    }
}

/// Checks a set of lines before anything is persisted.
///
/// Balance is compared exactly; a one-cent difference is an imbalance.
pub fn validate_lines(lines: &[JournalLine], scale: u32) -> DomainResult<()> {
    if lines.len() < 2 {
        return Err(DomainError::validation(
            "journal entry needs at least two lines",
        ));
    }

    let mut debits = Money::ZERO;
    let mut credits = Money::ZERO;
    for line in lines {
        if line.debit.is_negative() || line.credit.is_negative() {
            return Err(DomainError::validation("journal amounts cannot be negative"));
        }
        if line.debit.is_zero() == line.credit.is_zero() {
            return Err(DomainError::validation(format!(
                "line {} on account {} must have exactly one non-zero side",
                line.line_number, line.account.code
            )));
        }
        line.debit.ensure_scale(scale)?;
        line.credit.ensure_scale(scale)?;
        debits += line.debit;
        credits += line.credit;
    }

    if debits != credits {
        return Err(DomainError::PostingImbalance {
            debits: debits.amount(),
            credits: credits.amount(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    pub account: Account,
    pub debits: Money,
    pub credits: Money,
    /// Signed in the account's normal direction.
    pub balance: Money,
}

/// Per-account totals over `entries`, ordered by account code.
pub fn trial_balance<'a>(entries: impl IntoIterator<Item = &'a JournalEntry>) -> Vec<TrialBalanceRow> {
    let mut rows: BTreeMap<String, TrialBalanceRow> = BTreeMap::new();
    for entry in entries {
        for line in &entry.lines {
            let row = rows
                .entry(line.account.code.clone())
                .or_insert_with(|| TrialBalanceRow {
                    account: line.account.clone(),
                    debits: Money::ZERO,
                    credits: Money::ZERO,
                    balance: Money::ZERO,
                });
            row.debits += line.debit;
            row.credits += line.credit;
        }
    }

    rows.into_values()
        .map(|mut row| {
            row.balance = if row.account.kind.is_debit_normal() {
                row.debits - row.credits
            } else {
                row.credits - row.debits
            };
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountKind;
    use rust_decimal_macros::dec;

    fn cash() -> Account {
        Account::new("1000", "Bank", AccountKind::Asset)
    }

    fn payable() -> Account {
        Account::new("2000", "Accounts Payable", AccountKind::Liability)
    }

    #[test]
    fn one_cent_imbalance_is_rejected() {
        let lines = vec![
            JournalLine::debit(&cash(), Money::new(dec!(100.00))),
            JournalLine::credit(&payable(), Money::new(dec!(99.99))),
        ];
        assert_eq!(
            validate_lines(&lines, 2),
            Err(DomainError::PostingImbalance {
                debits: dec!(100.00),
                credits: dec!(99.99),
            })
        );
    }

    #[test]
    fn two_sided_line_is_rejected() {
        let mut line = JournalLine::debit(&cash(), Money::new(dec!(5)));
        line.credit = Money::new(dec!(5));
        let lines = vec![line, JournalLine::credit(&payable(), Money::new(dec!(0)))];
        assert!(matches!(
            validate_lines(&lines, 2),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn sub_cent_amounts_are_not_rounded() {
        let lines = vec![
            JournalLine::debit(&cash(), Money::new(dec!(1.005))),
            JournalLine::credit(&payable(), Money::new(dec!(1.005))),
        ];
        assert!(matches!(
            validate_lines(&lines, 2),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn trial_balance_uses_normal_side() {
        let entry = JournalEntry {
            id: JournalEntryId::generate(),
            number: "JE-000001".into(),
            entry_date: Utc::now(),
            description: "stock".into(),
            source: SourceDocument::new("BILL", "B-1").unwrap(),
            status: JournalStatus::Posted,
            lines: vec![
                JournalLine::debit(&cash(), Money::new(dec!(40))),
                JournalLine::credit(&payable(), Money::new(dec!(40))),
            ],
            posted_by: None,
            reversal_of: None,
            reversed_by: None,
        };
        let rows = trial_balance([&entry]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].balance, Money::new(dec!(40)));
        assert_eq!(rows[1].balance, Money::new(dec!(40)));
    }
}
