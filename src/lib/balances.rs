use im::Vector;
use tracing::{debug, warn};

use crate::error::DataIntegrityError;
use crate::types::{BalanceSheet, GroupSnapshot, Member, MemberId, MonetaryAmount};
use crate::utils::PushImmut;

fn credit(
    sheet: BalanceSheet,
    member: MemberId,
    amount: MonetaryAmount,
    fact: &'static str,
) -> Result<BalanceSheet, DataIntegrityError> {
    if !sheet.balances.contains_key(&member) {
        warn!(%member, fact, "fact references member outside the roster");
        return Err(DataIntegrityError::UnknownMember { member, fact });
    }
    Ok(sheet.map_balance(member, |b| b + amount))
}

fn debit(
    sheet: BalanceSheet,
    member: MemberId,
    amount: MonetaryAmount,
    fact: &'static str,
) -> Result<BalanceSheet, DataIntegrityError> {
    credit(sheet, member, -amount, fact)
}

fn opening_sheet(roster: &[Member]) -> BalanceSheet {
    roster.iter().fold(BalanceSheet::default(), |sheet, member| {
        // A repeated roster entry keeps its first position.
        if sheet.members.contains_key(&member.id) {
            return sheet;
        }
        BalanceSheet {
            order: sheet.order.push(member.id),
            members: sheet.members.update(member.id, member.clone()),
            balances: sheet.balances.update(member.id, MonetaryAmount::ZERO),
        }
    })
}

/// Folds the payment, split and settlement facts of a snapshot into one net balance
/// per roster member.
///
/// Amounts are accumulated exactly; nothing is rounded here.
pub fn aggregate_balances(snapshot: &GroupSnapshot) -> Result<BalanceSheet, DataIntegrityError> {
    let sheet = opening_sheet(&snapshot.roster);

    let sheet = snapshot
        .payments
        .iter()
        .try_fold(sheet, |sheet, p| credit(sheet, p.member, p.amount, "payment"))?;

    let sheet = snapshot
        .splits
        .iter()
        .try_fold(sheet, |sheet, s| debit(sheet, s.member, s.amount, "split"))?;

    let sheet = snapshot.settlements.iter().try_fold(sheet, |sheet, s| {
        let sheet = credit(sheet, s.payer, s.amount, "settlement")?;
        debit(sheet, s.payee, s.amount, "settlement")
    })?;

    debug!(
        members = sheet.len(),
        total = %sheet.total(),
        "aggregated group balances"
    );
    Ok(sheet)
}

/// Rejects a sheet whose balances do not net out to less than `tolerance`.
pub fn ensure_zero_sum(
    sheet: &BalanceSheet,
    tolerance: MonetaryAmount,
) -> Result<(), DataIntegrityError> {
    let residual = sheet.total();
    if residual.abs() >= tolerance {
        warn!(%residual, "group balances do not sum to zero");
        return Err(DataIntegrityError::Unbalanced { residual });
    }
    Ok(())
}

/// Balances rounded to cents for display, in roster order.
pub fn rounded_balances(sheet: &BalanceSheet) -> Vector<(Member, MonetaryAmount)> {
    sheet
        .iter()
        .map(|(member, balance)| (member.clone(), balance.round2()))
        .collect()
}
