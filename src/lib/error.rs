use thiserror::Error;

use crate::types::{ExpenseId, GroupId, MemberId, MonetaryAmount};

/// The facts handed to the calculator do not describe a consistent group.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataIntegrityError {
    #[error("{fact} fact references member {member} who is not in the roster")]
    UnknownMember { member: MemberId, fact: &'static str },

    #[error("balances sum to {residual}, expected zero")]
    Unbalanced { residual: MonetaryAmount },

    #[error("{remaining} {side} left with {outstanding} outstanding after matching")]
    Unsettled {
        side: &'static str,
        remaining: usize,
        outstanding: MonetaryAmount,
    },
}

/// A mutation of the group book was rejected. The book is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("group {0} not found")]
    UnknownGroup(GroupId),

    #[error("member {0} is not registered")]
    UnknownMember(MemberId),

    #[error("member {member} is not part of group {group}")]
    NotInGroup { group: GroupId, member: MemberId },

    #[error("member {member} is already part of group {group}")]
    DuplicateMember { group: GroupId, member: MemberId },

    #[error("expense {0:?} not found")]
    UnknownExpense(ExpenseId),

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(MonetaryAmount),

    #[error("{0} cannot be split into whole cents")]
    SubCentAmount(MonetaryAmount),

    #[error("expense has no splits")]
    EmptySplits,

    #[error("splits add up to {splits}, expense amount is {amount}")]
    SplitMismatch {
        amount: MonetaryAmount,
        splits: MonetaryAmount,
    },

    #[error("member {0} cannot settle with themselves")]
    SelfSettlement(MemberId),
}

/// Reading the facts CSV or writing the instruction CSV failed.
#[derive(Error, Debug)]
pub enum FactsError {
    #[error("file error: {0}")]
    File(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("output is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("csv writer error: {0}")]
    Writer(String),

    #[error("line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("no facts recorded for group {0}")]
    UnknownGroup(GroupId),
}

impl<W> From<csv::IntoInnerError<W>> for FactsError {
    fn from(err: csv::IntoInnerError<W>) -> Self {
        FactsError::Writer(err.error().to_string())
    }
}

/// Failure of [`crate::compute_settlement`]: either the collaborator could not be
/// read, or what it returned is inconsistent.
#[derive(Error, Debug)]
pub enum SettlementError<E: std::error::Error + 'static> {
    #[error("ledger source failed: {0}")]
    Source(#[source] E),

    #[error("data integrity error: {0}")]
    Integrity(#[from] DataIntegrityError),
}
