mod balances;
mod book;
mod error;
mod io;
mod settings;
mod settlement;
mod source;
mod types;
mod utils;

use std::ffi::OsStr;

pub use balances::{aggregate_balances, ensure_zero_sum, rounded_balances};
pub use book::{split_equally, Expense, Group, GroupBook, GroupDetails, SharedGroupBook, Split};
pub use error::{DataIntegrityError, FactsError, LedgerError, SettlementError};
pub use io::{output_balances_csv, output_csv, CsvLedgerSource};
pub use settings::Settings;
pub use settlement::{
    apply_instructions, compute_settlement, match_transfers, MemberOrdering,
    SettlementCalculator,
};
pub use source::LedgerSource;
pub use types::{
    BalanceSheet, ExpenseId, GroupId, GroupSnapshot, Member, MemberId, MonetaryAmount,
    PaymentFact, SettlementFact, SplitFact, TransferInstruction,
};

/// Settles `group` from a facts CSV and renders the transfers as CSV.
pub fn process_settlement(
    csv_path: &OsStr,
    group: GroupId,
    calculator: &SettlementCalculator,
) -> Result<String, SettlementError<FactsError>> {
    let source = CsvLedgerSource::from_path(csv_path).map_err(SettlementError::Source)?;

    let instructions = compute_settlement(&source, group, calculator)?;

    let result = output_csv(instructions).map_err(SettlementError::Source)?;
    Ok(result)
}

/// Net balance of every member of `group`, rounded to cents, as CSV.
pub fn process_balances(
    csv_path: &OsStr,
    group: GroupId,
    calculator: &SettlementCalculator,
) -> Result<String, SettlementError<FactsError>> {
    let source = CsvLedgerSource::from_path(csv_path).map_err(SettlementError::Source)?;

    let snapshot = source.snapshot(group).map_err(SettlementError::Source)?;
    let sheet = calculator.balances(&snapshot)?;

    let result = output_balances_csv(rounded_balances(&sheet)).map_err(SettlementError::Source)?;
    Ok(result)
}
