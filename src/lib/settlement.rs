use im::Vector;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::balances::{aggregate_balances, ensure_zero_sum};
use crate::error::{DataIntegrityError, SettlementError};
use crate::source::LedgerSource;
use crate::types::{
    BalanceSheet, GroupId, GroupSnapshot, Member, MemberId, MonetaryAmount, TransferInstruction,
};

/// Order in which debtors and creditors are paired off.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberOrdering {
    /// The order members appear in the group roster.
    #[default]
    Roster,
    /// Ascending member id, independent of how the roster was stored.
    MemberId,
}

#[derive(Clone, Copy, Debug)]
struct Position {
    member: MemberId,
    balance: MonetaryAmount,
}

impl Position {
    fn map_balance<F: FnOnce(MonetaryAmount) -> MonetaryAmount>(&self, f: F) -> Self {
        Self {
            balance: f(self.balance),
            ..*self
        }
    }
}

fn positions(sheet: &BalanceSheet, ordering: MemberOrdering) -> Vec<Position> {
    let mut positions: Vec<Position> = sheet
        .iter()
        .map(|(member, balance)| Position {
            member: member.id,
            balance,
        })
        .collect();
    if ordering == MemberOrdering::MemberId {
        positions.sort_by_key(|p| p.member);
    }
    positions
}

fn member_of(sheet: &BalanceSheet, id: MemberId) -> Result<Member, DataIntegrityError> {
    sheet
        .member(&id)
        .cloned()
        .ok_or(DataIntegrityError::UnknownMember {
            member: id,
            fact: "balance",
        })
}

/// Replaces the head of a working list, or drops it once it is within `tolerance` of
/// zero. A dropped head that still carries a balance is returned.
fn advance(
    list: &mut Vector<Position>,
    head: Position,
    tolerance: MonetaryAmount,
) -> Option<Position> {
    if head.balance.abs() < tolerance {
        list.pop_front();
        (head.balance != MonetaryAmount::ZERO).then_some(head)
    } else {
        list.set(0, head);
        None
    }
}

fn unsettled(side: &'static str, list: &Vector<Position>) -> DataIntegrityError {
    let outstanding = list.iter().map(|p| p.balance).sum::<MonetaryAmount>().abs();
    warn!(side, remaining = list.len(), %outstanding, "matching left balances unsettled");
    DataIntegrityError::Unsettled {
        side,
        remaining: list.len(),
        outstanding,
    }
}

/// Pays the head debtor into the head creditor until either list is empty.
/// Balances dropped while still non-zero are pushed onto `residue`.
fn pair_off(
    sheet: &BalanceSheet,
    debtors: &mut Vector<Position>,
    creditors: &mut Vector<Position>,
    tolerance: MonetaryAmount,
    residue: &mut Vector<Position>,
    instructions: &mut Vec<TransferInstruction>,
) -> Result<(), DataIntegrityError> {
    while let (Some(debtor), Some(creditor)) = (debtors.front().copied(), creditors.front().copied())
    {
        let transfer = (-debtor.balance).min(creditor.balance);
        let amount = transfer.round2();
        if amount.is_positive() {
            instructions.push(TransferInstruction {
                from: member_of(sheet, debtor.member)?,
                to: member_of(sheet, creditor.member)?,
                amount,
            });
        }

        let dropped = [
            advance(debtors, debtor.map_balance(|b| b + transfer), tolerance),
            advance(creditors, creditor.map_balance(|b| b - transfer), tolerance),
        ];
        residue.extend(dropped.into_iter().flatten());
    }
    Ok(())
}

/// Pairs the first remaining debtor with the first remaining creditor until one side
/// runs out.
///
/// If one side outlives the other, it is paid off against the balances that sit
/// inside `tolerance` on the opposite side, so a zero-sum sheet always settles.
/// Without such small balances at most `debtors + creditors - 1` instructions are
/// emitted. Amounts are rounded to cents on the way out and transfers that round to
/// nothing are skipped; the working balances are not rounded.
pub fn match_transfers(
    sheet: &BalanceSheet,
    tolerance: MonetaryAmount,
    ordering: MemberOrdering,
) -> Result<Vec<TransferInstruction>, DataIntegrityError> {
    let positions = positions(sheet, ordering);
    let mut debtors: Vector<Position> = positions
        .iter()
        .filter(|p| p.balance < -tolerance)
        .copied()
        .collect();
    let mut creditors: Vector<Position> = positions
        .iter()
        .filter(|p| p.balance > tolerance)
        .copied()
        .collect();
    let mut small: Vector<Position> = positions
        .iter()
        .filter(|p| p.balance != MonetaryAmount::ZERO && p.balance.abs() <= tolerance)
        .copied()
        .collect();

    debug!(
        debtors = debtors.len(),
        creditors = creditors.len(),
        small = small.len(),
        "matching balances"
    );

    let mut instructions = Vec::new();
    pair_off(
        sheet,
        &mut debtors,
        &mut creditors,
        tolerance,
        &mut small,
        &mut instructions,
    )?;

    if !debtors.is_empty() {
        let mut small_creditors: Vector<Position> = small
            .iter()
            .filter(|p| p.balance.is_positive())
            .copied()
            .collect();
        debug!(
            debtors = debtors.len(),
            counterparties = small_creditors.len(),
            "paying leftover debtors into small balances"
        );
        pair_off(
            sheet,
            &mut debtors,
            &mut small_creditors,
            tolerance,
            &mut Vector::new(),
            &mut instructions,
        )?;
    }
    if !creditors.is_empty() {
        let mut small_debtors: Vector<Position> = small
            .iter()
            .filter(|p| p.balance < MonetaryAmount::ZERO)
            .copied()
            .collect();
        debug!(
            creditors = creditors.len(),
            counterparties = small_debtors.len(),
            "paying leftover creditors from small balances"
        );
        pair_off(
            sheet,
            &mut small_debtors,
            &mut creditors,
            tolerance,
            &mut Vector::new(),
            &mut instructions,
        )?;
    }

    if !debtors.is_empty() {
        return Err(unsettled("debtors", &debtors));
    }
    if !creditors.is_empty() {
        return Err(unsettled("creditors", &creditors));
    }
    Ok(instructions)
}

/// Replays instructions onto a sheet as if each one had been paid: the sender's
/// balance rises towards zero and the receiver's falls.
pub fn apply_instructions(
    sheet: &BalanceSheet,
    instructions: &[TransferInstruction],
) -> BalanceSheet {
    instructions.iter().fold(sheet.clone(), |sheet, instruction| {
        sheet
            .map_balance(instruction.from.id, |b| b + instruction.amount)
            .map_balance(instruction.to.id, |b| b - instruction.amount)
    })
}

/// Turns a group snapshot into the transfers that would leave every member even.
///
/// The calculator holds no state between calls and may be shared freely across threads.
#[derive(Clone, Copy, Debug)]
pub struct SettlementCalculator {
    tolerance: MonetaryAmount,
    ordering: MemberOrdering,
}

impl Default for SettlementCalculator {
    fn default() -> Self {
        Self {
            tolerance: MonetaryAmount::new(Decimal::new(1, 2)),
            ordering: MemberOrdering::default(),
        }
    }
}

impl SettlementCalculator {
    /// Tolerances below one cent are raised to one cent; anything finer would let
    /// the matcher emit transfers that round to `0.00`.
    pub fn new(tolerance: MonetaryAmount, ordering: MemberOrdering) -> Self {
        let floor = MonetaryAmount::from_cents(1);
        if tolerance.abs() < floor {
            warn!(%tolerance, "tolerance below one cent, using 0.01");
        }
        Self {
            tolerance: tolerance.abs().max(floor),
            ordering,
        }
    }

    pub fn tolerance(&self) -> MonetaryAmount {
        self.tolerance
    }

    pub fn ordering(&self) -> MemberOrdering {
        self.ordering
    }

    /// Net balances for the snapshot, rejected unless they sum to zero.
    pub fn balances(&self, snapshot: &GroupSnapshot) -> Result<BalanceSheet, DataIntegrityError> {
        let sheet = aggregate_balances(snapshot)?;
        ensure_zero_sum(&sheet, self.tolerance)?;
        Ok(sheet)
    }

    pub fn settle(
        &self,
        sheet: &BalanceSheet,
    ) -> Result<Vec<TransferInstruction>, DataIntegrityError> {
        match_transfers(sheet, self.tolerance, self.ordering)
    }

    pub fn calculate(
        &self,
        snapshot: &GroupSnapshot,
    ) -> Result<Vec<TransferInstruction>, DataIntegrityError> {
        let sheet = self.balances(snapshot)?;
        self.settle(&sheet)
    }
}

/// Reads one consistent snapshot of `group` from `source` and settles it.
pub fn compute_settlement<S: LedgerSource>(
    source: &S,
    group: GroupId,
    calculator: &SettlementCalculator,
) -> Result<Vec<TransferInstruction>, SettlementError<S::Error>> {
    let snapshot = source.snapshot(group).map_err(SettlementError::Source)?;
    let instructions = calculator.calculate(&snapshot)?;
    info!(%group, transfers = instructions.len(), "computed settlement");
    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{apply_instructions, match_transfers, MemberOrdering, SettlementCalculator};
    use crate::balances::aggregate_balances;
    use crate::error::DataIntegrityError;
    use crate::types::{
        BalanceSheet, GroupSnapshot, Member, MemberId, MonetaryAmount, PaymentFact,
        SettlementFact, SplitFact,
    };

    fn cents(c: i64) -> MonetaryAmount {
        MonetaryAmount::from_cents(c)
    }

    fn member(id: u32, name: &str) -> Member {
        Member::new(MemberId::new(id), name)
    }

    fn paid(id: u32, c: i64) -> PaymentFact {
        PaymentFact {
            member: MemberId::new(id),
            amount: cents(c),
        }
    }

    fn owed(id: u32, c: i64) -> SplitFact {
        SplitFact {
            member: MemberId::new(id),
            amount: cents(c),
        }
    }

    fn dinner() -> GroupSnapshot {
        GroupSnapshot {
            roster: vec![member(1, "A"), member(2, "B"), member(3, "C")],
            payments: vec![paid(1, 9000)],
            splits: vec![owed(1, 3000), owed(2, 3000), owed(3, 3000)],
            settlements: vec![],
        }
    }

    fn transfers(snapshot: &GroupSnapshot) -> Vec<(String, String, MonetaryAmount)> {
        SettlementCalculator::default()
            .calculate(snapshot)
            .unwrap()
            .into_iter()
            .map(|t| (t.from.name, t.to.name, t.amount))
            .collect()
    }

    fn assert_settled(sheet: &BalanceSheet, tolerance: MonetaryAmount) {
        for (member, balance) in sheet.iter() {
            assert!(
                balance.abs() < tolerance,
                "{} left with {}",
                member.name,
                balance
            );
        }
    }

    #[test]
    fn payer_is_repaid_by_each_debtor_in_roster_order() {
        assert_eq!(
            transfers(&dinner()),
            vec![
                ("B".to_string(), "A".to_string(), cents(3000)),
                ("C".to_string(), "A".to_string(), cents(3000)),
            ]
        );
    }

    #[test]
    fn prior_settlement_is_taken_into_account() {
        let snapshot = GroupSnapshot {
            settlements: vec![SettlementFact {
                payer: MemberId::new(2),
                payee: MemberId::new(1),
                amount: cents(3000),
            }],
            ..dinner()
        };

        assert_eq!(
            transfers(&snapshot),
            vec![("C".to_string(), "A".to_string(), cents(3000))]
        );
    }

    #[test]
    fn balanced_group_needs_no_transfers() {
        let snapshot = GroupSnapshot {
            roster: vec![member(1, "A"), member(2, "B")],
            payments: vec![paid(1, 2000), paid(2, 2000)],
            splits: vec![owed(1, 2000), owed(2, 2000)],
            settlements: vec![],
        };

        assert!(transfers(&snapshot).is_empty());
    }

    #[test]
    fn sub_cent_balances_count_as_settled() {
        let snapshot = GroupSnapshot {
            roster: vec![member(1, "A"), member(2, "B")],
            payments: vec![PaymentFact {
                member: MemberId::new(1),
                amount: MonetaryAmount::new(Decimal::new(5, 3)),
            }],
            splits: vec![SplitFact {
                member: MemberId::new(2),
                amount: MonetaryAmount::new(Decimal::new(5, 3)),
            }],
            settlements: vec![],
        };

        assert!(transfers(&snapshot).is_empty());
    }

    #[test]
    fn debtor_can_be_split_across_creditors() {
        // A and B each paid 60 for a 120 bill owed entirely by C.
        let snapshot = GroupSnapshot {
            roster: vec![member(1, "A"), member(2, "B"), member(3, "C")],
            payments: vec![paid(1, 6000), paid(2, 6000)],
            splits: vec![owed(3, 12000)],
            settlements: vec![],
        };

        assert_eq!(
            transfers(&snapshot),
            vec![
                ("C".to_string(), "A".to_string(), cents(6000)),
                ("C".to_string(), "B".to_string(), cents(6000)),
            ]
        );
    }

    #[test]
    fn first_pair_is_matched_rather_than_largest() {
        // Balances: A -10, B -50, C +20, D +40.
        let snapshot = GroupSnapshot {
            roster: vec![member(1, "A"), member(2, "B"), member(3, "C"), member(4, "D")],
            payments: vec![paid(3, 2000), paid(4, 4000)],
            splits: vec![owed(1, 1000), owed(2, 5000)],
            settlements: vec![],
        };

        assert_eq!(
            transfers(&snapshot),
            vec![
                ("A".to_string(), "C".to_string(), cents(1000)),
                ("B".to_string(), "C".to_string(), cents(1000)),
                ("B".to_string(), "D".to_string(), cents(4000)),
            ]
        );
    }

    #[test]
    fn member_id_ordering_ignores_roster_order() {
        let snapshot = GroupSnapshot {
            roster: vec![member(3, "C"), member(2, "B"), member(1, "A")],
            ..dinner()
        };
        let calculator = SettlementCalculator::new(cents(1), MemberOrdering::MemberId);

        let names: Vec<String> = calculator
            .calculate(&snapshot)
            .unwrap()
            .into_iter()
            .map(|t| t.from.name)
            .collect();

        assert_eq!(names, vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn roster_ordering_follows_roster() {
        let snapshot = GroupSnapshot {
            roster: vec![member(3, "C"), member(2, "B"), member(1, "A")],
            ..dinner()
        };

        let names: Vec<String> = transfers(&snapshot).into_iter().map(|t| t.0).collect();

        assert_eq!(names, vec!["C".to_string(), "B".to_string()]);
    }

    #[test]
    fn uneven_three_way_split_rounds_only_on_output() {
        // 100.00 split in thirds, paid by A.
        let third = MonetaryAmount::new(Decimal::from(100) / Decimal::from(3));
        let snapshot = GroupSnapshot {
            roster: vec![member(1, "A"), member(2, "B"), member(3, "C")],
            payments: vec![paid(1, 10000)],
            splits: (1..=3)
                .map(|id| SplitFact {
                    member: MemberId::new(id),
                    amount: third,
                })
                .collect(),
            settlements: vec![],
        };
        let calculator = SettlementCalculator::default();

        let sheet = calculator.balances(&snapshot).unwrap();
        let instructions = calculator.settle(&sheet).unwrap();

        assert_eq!(instructions.len(), 2);
        assert!(instructions.iter().all(|t| t.amount == cents(3333)));
        assert_settled(&apply_instructions(&sheet, &instructions), cents(1));
    }

    #[test]
    fn applying_instructions_zeroes_every_balance() {
        let snapshot = GroupSnapshot {
            roster: (1..=6).map(|id| member(id, &format!("m{id}"))).collect(),
            payments: vec![paid(1, 12345), paid(4, 6789), paid(6, 1111)],
            splits: vec![
                owed(1, 2000),
                owed(2, 5000),
                owed(3, 3245),
                owed(4, 4000),
                owed(5, 4000),
                owed(6, 2000),
            ],
            settlements: vec![SettlementFact {
                payer: MemberId::new(2),
                payee: MemberId::new(1),
                amount: cents(1500),
            }],
        };
        let calculator = SettlementCalculator::default();

        let sheet = calculator.balances(&snapshot).unwrap();
        let instructions = calculator.settle(&sheet).unwrap();
        let movers = sheet
            .iter()
            .filter(|(_, b)| b.abs() > calculator.tolerance())
            .count();

        assert!(!instructions.is_empty());
        assert!(instructions.len() <= movers - 1);
        assert!(instructions.iter().all(|t| t.amount.is_positive()));
        assert_settled(&apply_instructions(&sheet, &instructions), cents(1));
    }

    #[test]
    fn repeated_calculation_is_identical() {
        let calculator = SettlementCalculator::default();
        let first = calculator.calculate(&dinner()).unwrap();
        let second = calculator.calculate(&dinner()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn unbalanced_snapshot_is_rejected() {
        let snapshot = GroupSnapshot {
            splits: vec![owed(2, 3000), owed(3, 3000)],
            ..dinner()
        };

        assert_eq!(
            SettlementCalculator::default().calculate(&snapshot),
            Err(DataIntegrityError::Unbalanced {
                residual: cents(3000)
            })
        );
    }

    #[test]
    fn leftover_debtor_pays_members_inside_the_tolerance() {
        // Cent remainders from equal splits leave A and B one cent up and C two down.
        let snapshot = GroupSnapshot {
            roster: vec![member(1, "A"), member(2, "B"), member(3, "C")],
            payments: vec![paid(1, 100), paid(2, 99), paid(3, 64)],
            splits: vec![owed(1, 99), owed(2, 98), owed(3, 66)],
            settlements: vec![],
        };
        let calculator = SettlementCalculator::default();

        let sheet = calculator.balances(&snapshot).unwrap();
        let instructions = calculator.settle(&sheet).unwrap();

        assert_eq!(
            transfers(&snapshot),
            vec![
                ("C".to_string(), "A".to_string(), cents(1)),
                ("C".to_string(), "B".to_string(), cents(1)),
            ]
        );
        assert_settled(&apply_instructions(&sheet, &instructions), cents(1));
    }

    #[test]
    fn leftover_creditor_is_paid_by_members_inside_the_tolerance() {
        let snapshot = GroupSnapshot {
            roster: vec![member(1, "A"), member(2, "B"), member(3, "C")],
            payments: vec![paid(1, 2)],
            splits: vec![owed(2, 1), owed(3, 1)],
            settlements: vec![],
        };

        assert_eq!(
            transfers(&snapshot),
            vec![
                ("B".to_string(), "A".to_string(), cents(1)),
                ("C".to_string(), "A".to_string(), cents(1)),
            ]
        );
    }

    #[test]
    fn transfers_that_round_to_nothing_are_skipped() {
        // A is owed 0.004 and B 0.01; C owes 0.014.
        let snapshot = GroupSnapshot {
            roster: vec![member(1, "A"), member(2, "B"), member(3, "C")],
            payments: vec![
                PaymentFact {
                    member: MemberId::new(1),
                    amount: MonetaryAmount::new(Decimal::new(4, 3)),
                },
                paid(2, 1),
            ],
            splits: vec![SplitFact {
                member: MemberId::new(3),
                amount: MonetaryAmount::new(Decimal::new(14, 3)),
            }],
            settlements: vec![],
        };

        assert_eq!(
            transfers(&snapshot),
            vec![("C".to_string(), "B".to_string(), cents(1))]
        );
    }

    #[test]
    fn residual_of_exactly_the_tolerance_is_unbalanced() {
        let snapshot = GroupSnapshot {
            roster: vec![member(1, "A"), member(2, "B"), member(3, "C")],
            payments: vec![paid(1, 10000)],
            splits: vec![owed(2, 5000), owed(3, 4999)],
            settlements: vec![],
        };

        assert_eq!(
            SettlementCalculator::default().calculate(&snapshot),
            Err(DataIntegrityError::Unbalanced {
                residual: cents(1)
            })
        );
    }

    #[test]
    fn unbalanced_sheet_leaves_a_side_unsettled() {
        // Skips the zero-sum check to reach the matcher directly.
        let snapshot = GroupSnapshot {
            roster: vec![member(1, "A"), member(2, "B")],
            payments: vec![],
            splits: vec![owed(2, 3000)],
            settlements: vec![],
        };
        let sheet = aggregate_balances(&snapshot).unwrap();

        assert_eq!(
            match_transfers(&sheet, cents(1), MemberOrdering::Roster),
            Err(DataIntegrityError::Unsettled {
                side: "debtors",
                remaining: 1,
                outstanding: cents(3000),
            })
        );
    }

    #[test]
    fn tolerance_is_at_least_one_cent() {
        let calculator = SettlementCalculator::new(MonetaryAmount::ZERO, MemberOrdering::Roster);
        let snapshot = GroupSnapshot {
            roster: vec![member(1, "A"), member(2, "B")],
            payments: vec![PaymentFact {
                member: MemberId::new(1),
                amount: MonetaryAmount::new(Decimal::new(4, 3)),
            }],
            splits: vec![SplitFact {
                member: MemberId::new(2),
                amount: MonetaryAmount::new(Decimal::new(4, 3)),
            }],
            settlements: vec![],
        };

        assert_eq!(calculator.tolerance(), cents(1));
        let finer = MonetaryAmount::new(Decimal::new(1, 3));
        assert_eq!(
            SettlementCalculator::new(finer, MemberOrdering::Roster).tolerance(),
            cents(1)
        );
        assert_eq!(calculator.calculate(&snapshot), Ok(vec![]));
    }
}
