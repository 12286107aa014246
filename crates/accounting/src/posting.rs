//! Derivation of journal lines from business events.
//!
//! Every derived amount is rounded once to the currency scale before the lines
//! are built, so both sides of an entry start from the same figure. Manual
//! lines are taken as given and validated, never adjusted.

use serde::{Deserialize, Serialize};

use stockwise_core::{DomainError, DomainResult, Money, SourceDocument};

use crate::account::{AccountRole, PostingRules};
use crate::journal::{EntryHeader, JournalEntry, JournalLine, JournalStatus, validate_lines};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualLine {
    pub account_code: String,
    #[serde(default)]
    pub debit: Money,
    #[serde(default)]
    pub credit: Money,
    #[serde(default)]
    pub memo: Option<String>,
}

/// A completed business event that produces a journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceEvent {
    /// Dr Accounts Receivable / Cr Sales Revenue + Sales Tax.
    InvoiceIssued {
        source: SourceDocument,
        subtotal: Money,
        #[serde(default)]
        tax: Money,
    },
    /// Dr Operating Expenses + Purchase Tax / Cr Accounts Payable.
    BillReceived {
        source: SourceDocument,
        subtotal: Money,
        #[serde(default)]
        tax: Money,
    },
    /// Dr Bank + Fees / Cr Accounts Receivable, or Undeposited Funds when the
    /// payment is not applied to any invoice.
    PaymentReceived {
        source: SourceDocument,
        amount: Money,
        #[serde(default)]
        processing_fee: Money,
        applied: bool,
    },
    /// Dr Accounts Payable + Fees / Cr Bank.
    PaymentMade {
        source: SourceDocument,
        amount: Money,
        #[serde(default)]
        processing_fee: Money,
    },
    /// Dr Inventory / Cr Accounts Payable.
    InventoryReceived { source: SourceDocument, value: Money },
    /// Dr Cost of Goods Sold / Cr Inventory.
    GoodsIssued { source: SourceDocument, cost: Money },
    /// Signed: an increase debits Inventory, a decrease credits it.
    InventoryAdjusted { source: SourceDocument, value: Money },
    /// Dr Inventory Adjustments / Cr Inventory.
    TransferWriteOff { source: SourceDocument, value: Money },
    /// Dr Inventory / Cr Accounts Payable.
    LandedCostAllocated { source: SourceDocument, amount: Money },
    Manual {
        source: SourceDocument,
        description: String,
        lines: Vec<ManualLine>,
    },
}

impl SourceEvent {
    pub fn source(&self) -> &SourceDocument {
        match self {
            SourceEvent::InvoiceIssued { source, .. }
            | SourceEvent::BillReceived { source, .. }
            | SourceEvent::PaymentReceived { source, .. }
            | SourceEvent::PaymentMade { source, .. }
            | SourceEvent::InventoryReceived { source, .. }
            | SourceEvent::GoodsIssued { source, .. }
            | SourceEvent::InventoryAdjusted { source, .. }
            | SourceEvent::TransferWriteOff { source, .. }
            | SourceEvent::LandedCostAllocated { source, .. }
            | SourceEvent::Manual { source, .. } => source,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            SourceEvent::InvoiceIssued { .. } => "invoice_issued",
            SourceEvent::BillReceived { .. } => "bill_received",
            SourceEvent::PaymentReceived { .. } => "payment_received",
            SourceEvent::PaymentMade { .. } => "payment_made",
            SourceEvent::InventoryReceived { .. } => "inventory_received",
            SourceEvent::GoodsIssued { .. } => "goods_issued",
            SourceEvent::InventoryAdjusted { .. } => "inventory_adjusted",
            SourceEvent::TransferWriteOff { .. } => "transfer_write_off",
            SourceEvent::LandedCostAllocated { .. } => "landed_cost_allocated",
            SourceEvent::Manual { .. } => "manual",
        }
    }

    pub fn description(&self) -> String {
        let source = self.source();
        match self {
            SourceEvent::InvoiceIssued { .. } => format!("Sales invoice {}", source.number),
            SourceEvent::BillReceived { .. } => format!("Purchase bill {}", source.number),
            SourceEvent::PaymentReceived { .. } => format!("Payment received {}", source.number),
            SourceEvent::PaymentMade { .. } => format!("Payment made {}", source.number),
            SourceEvent::InventoryReceived { .. } => format!("Inventory receipt {source}"),
            SourceEvent::GoodsIssued { .. } => format!("Cost of goods issued {source}"),
            SourceEvent::InventoryAdjusted { .. } => format!("Inventory adjustment {source}"),
            SourceEvent::TransferWriteOff { .. } => format!("Transfer write-off {source}"),
            SourceEvent::LandedCostAllocated { .. } => format!("Landed cost {source}"),
            SourceEvent::Manual { description, .. } => description.clone(),
        }
    }
}

impl PostingRules {
    /// Lines for `event`, numbered from 1. Zero legs (no tax, no fee) are left out.
    pub fn derive_lines(&self, event: &SourceEvent, scale: u32) -> DomainResult<Vec<JournalLine>> {
        use AccountRole::*;

        let round = |m: &Money| -> DomainResult<Money> {
            if m.is_negative() {
                return Err(DomainError::validation(format!(
                    "{} amount cannot be negative",
                    event.event_type()
                )));
            }
            Ok(m.round_to(scale))
        };

        let mut lines = Vec::new();
        match event {
            SourceEvent::InvoiceIssued { subtotal, tax, .. } => {
                let (subtotal, tax) = (round(subtotal)?, round(tax)?);
                lines.push(JournalLine::debit(self.account(AccountsReceivable)?, subtotal + tax));
                lines.push(JournalLine::credit(self.account(SalesRevenue)?, subtotal));
                lines.push(JournalLine::credit(self.account(SalesTax)?, tax));
            }
            SourceEvent::BillReceived { subtotal, tax, .. } => {
                let (subtotal, tax) = (round(subtotal)?, round(tax)?);
                lines.push(JournalLine::debit(self.account(OperatingExpenses)?, subtotal));
                lines.push(JournalLine::debit(self.account(PurchaseTax)?, tax));
                lines.push(JournalLine::credit(self.account(AccountsPayable)?, subtotal + tax));
            }
            SourceEvent::PaymentReceived {
                amount,
                processing_fee,
                applied,
                ..
            } => {
                let (amount, fee) = (round(amount)?, round(processing_fee)?);
                let receivable = if *applied {
                    AccountsReceivable
                } else {
                    UndepositedFunds
                };
                lines.push(JournalLine::debit(self.account(Bank)?, amount));
                lines.push(JournalLine::debit(self.account(PaymentProcessingFees)?, fee));
                lines.push(JournalLine::credit(self.account(receivable)?, amount + fee));
            }
            SourceEvent::PaymentMade {
                amount,
                processing_fee,
                ..
            } => {
                let (amount, fee) = (round(amount)?, round(processing_fee)?);
                lines.push(JournalLine::debit(self.account(AccountsPayable)?, amount));
                lines.push(JournalLine::debit(self.account(PaymentProcessingFees)?, fee));
                lines.push(JournalLine::credit(self.account(Bank)?, amount + fee));
            }
            SourceEvent::InventoryReceived { value, .. } => {
                let value = round(value)?;
                lines.push(JournalLine::debit(self.account(Inventory)?, value));
                lines.push(JournalLine::credit(self.account(AccountsPayable)?, value));
            }
            SourceEvent::GoodsIssued { cost, .. } => {
                let cost = round(cost)?;
                lines.push(JournalLine::debit(self.account(CostOfGoodsSold)?, cost));
                lines.push(JournalLine::credit(self.account(Inventory)?, cost));
            }
            SourceEvent::InventoryAdjusted { value, .. } => {
                let amount = value.abs().round_to(scale);
                if value.is_negative() {
                    lines.push(JournalLine::debit(self.account(InventoryAdjustments)?, amount));
                    lines.push(JournalLine::credit(self.account(Inventory)?, amount));
                } else {
                    lines.push(JournalLine::debit(self.account(Inventory)?, amount));
                    lines.push(JournalLine::credit(self.account(InventoryAdjustments)?, amount));
                }
            }
            SourceEvent::TransferWriteOff { value, .. } => {
                let value = round(value)?;
                lines.push(JournalLine::debit(self.account(InventoryAdjustments)?, value));
                lines.push(JournalLine::credit(self.account(Inventory)?, value));
            }
            SourceEvent::LandedCostAllocated { amount, .. } => {
                let amount = round(amount)?;
                lines.push(JournalLine::debit(self.account(Inventory)?, amount));
                lines.push(JournalLine::credit(self.account(AccountsPayable)?, amount));
            }
            SourceEvent::Manual { lines: manual, .. } => {
                for line in manual {
                    let account = self.by_code(&line.account_code)?;
                    lines.push(JournalLine {
                        line_number: 0,
                        account: account.clone(),
                        debit: line.debit,
                        credit: line.credit,
                        memo: line.memo.clone(),
                    });
                }
            }
        }

        let manual = matches!(event, SourceEvent::Manual { .. });
        let mut numbered: Vec<JournalLine> = lines
            .into_iter()
            .filter(|l| manual || !(l.debit.is_zero() && l.credit.is_zero()))
            .collect();
        for (i, line) in numbered.iter_mut().enumerate() {
            line.line_number = i as u32 + 1;
        }
        Ok(numbered)
    }
}

/// Derive, validate and build a posted entry for `event`. Nothing is returned
/// unless the lines balance exactly.
pub fn create_journal_entry(
    event: &SourceEvent,
    rules: &PostingRules,
    scale: u32,
    header: EntryHeader,
) -> DomainResult<JournalEntry> {
    let lines = rules.derive_lines(event, scale)?;
    validate_lines(&lines, scale)?;

    Ok(JournalEntry {
        id: header.id,
        number: header.number,
        entry_date: header.entry_date,
        description: event.description(),
        source: event.source().clone(),
        status: JournalStatus::Posted,
        lines,
        posted_by: header.posted_by,
        reversal_of: None,
        reversed_by: None,
    })
}
