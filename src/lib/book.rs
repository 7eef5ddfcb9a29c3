use std::sync::Arc;

use im::{HashMap, Vector};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::source::LedgerSource;
use crate::types::{
    ExpenseId, GroupId, GroupSnapshot, Member, MemberId, MonetaryAmount, PaymentFact,
    SettlementFact, SplitFact,
};
use crate::utils::{accumulate, PushImmut};

/// One member's share of an expense.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Split {
    pub member: MemberId,
    pub amount: MonetaryAmount,
}

impl Split {
    pub fn new(member: MemberId, amount: MonetaryAmount) -> Self {
        Self { member, amount }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Expense {
    pub id: ExpenseId,
    pub group: GroupId,
    pub description: String,
    pub amount: MonetaryAmount,
    pub paid_by: MemberId,
    pub splits: Vector<Split>,
}

#[derive(Clone, Debug)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub created_by: MemberId,
    pub members: Vector<MemberId>,
    pub expenses: Vector<ExpenseId>,
    pub settlements: Vector<SettlementFact>,
}

impl Group {
    fn has_member(&self, member: MemberId) -> bool {
        self.members.iter().any(|m| *m == member)
    }

    fn require_member(&self, member: MemberId) -> Result<(), LedgerError> {
        if self.has_member(member) {
            Ok(())
        } else {
            Err(LedgerError::NotInGroup {
                group: self.id,
                member,
            })
        }
    }
}

/// A group as shown to its members: roster plus expenses, newest first.
#[derive(Clone, Debug)]
pub struct GroupDetails {
    pub id: GroupId,
    pub name: String,
    pub created_by: MemberId,
    pub members: Vec<Member>,
    pub expenses: Vec<Expense>,
}

/// Splits `amount` into equal shares, one per member.
///
/// Shares are whole cents; leftover cents go one each to the first members so the
/// shares always add up to exactly `amount`. Amounts finer than a cent are rejected.
pub fn split_equally(
    amount: MonetaryAmount,
    members: &[MemberId],
) -> Result<Vec<Split>, LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::NonPositiveAmount(amount));
    }
    if !amount.is_whole_cents() {
        return Err(LedgerError::SubCentAmount(amount));
    }
    if members.is_empty() {
        return Err(LedgerError::EmptySplits);
    }
    let total_cents = amount.value() * Decimal::ONE_HUNDRED;
    let count = Decimal::from(members.len());
    let base = (total_cents / count).trunc();
    let remainder = total_cents - base * count;

    Ok(members
        .iter()
        .enumerate()
        .map(|(idx, member)| {
            let extra = if Decimal::from(idx) < remainder {
                Decimal::ONE
            } else {
                Decimal::ZERO
            };
            Split::new(
                *member,
                MonetaryAmount::new((base + extra) / Decimal::ONE_HUNDRED),
            )
        })
        .collect())
}

/// In-memory store of users, groups, expenses and settlements.
///
/// Every mutation either applies completely or leaves the book as it was. The
/// collections are persistent, so cloning the book is cheap and a clone is an
/// isolated snapshot.
#[derive(Clone, Default, Debug)]
pub struct GroupBook {
    users: HashMap<MemberId, Member>,
    groups: HashMap<GroupId, Group>,
    expenses: HashMap<ExpenseId, Expense>,
    last_group: u32,
    last_expense: u32,
}

impl GroupBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against a copy of the book and keeps the result only if `f` succeeds.
    pub fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut GroupBook) -> Result<T, E>,
    {
        let mut draft = self.clone();
        let value = f(&mut draft)?;
        *self = draft;
        Ok(value)
    }

    pub fn register_member(&mut self, member: Member) {
        debug!(member = %member.id, name = %member.name, "registered member");
        self.users = self.users.update(member.id, member);
    }

    pub fn member(&self, id: MemberId) -> Result<&Member, LedgerError> {
        self.users.get(&id).ok_or(LedgerError::UnknownMember(id))
    }

    pub fn group(&self, id: GroupId) -> Result<&Group, LedgerError> {
        self.groups.get(&id).ok_or(LedgerError::UnknownGroup(id))
    }

    pub fn expense(&self, id: ExpenseId) -> Result<&Expense, LedgerError> {
        self.expenses.get(&id).ok_or(LedgerError::UnknownExpense(id))
    }

    /// Creates a group containing `creator` followed by `members`, without duplicates.
    pub fn create_group(
        &mut self,
        name: &str,
        creator: MemberId,
        members: &[MemberId],
    ) -> Result<GroupId, LedgerError> {
        self.transaction(|book| {
            let id = GroupId::new(book.last_group + 1);
            book.member(creator)?;
            book.last_group = id.value();
            book.groups = book.groups.update(
                id,
                Group {
                    id,
                    name: name.to_string(),
                    created_by: creator,
                    members: Vector::unit(creator),
                    expenses: Vector::new(),
                    settlements: Vector::new(),
                },
            );
            for member in members {
                if !book.group(id)?.has_member(*member) {
                    book.add_member(id, *member)?;
                }
            }
            info!(group = %id, name, members = book.group(id)?.members.len(), "created group");
            Ok(id)
        })
    }

    pub fn add_member(&mut self, group: GroupId, member: MemberId) -> Result<(), LedgerError> {
        self.member(member)?;
        let current = self.group(group)?;
        if current.has_member(member) {
            return Err(LedgerError::DuplicateMember { group, member });
        }
        let updated = Group {
            members: current.members.push(member),
            ..current.clone()
        };
        self.groups = self.groups.update(group, updated);
        debug!(%group, %member, "added member");
        Ok(())
    }

    /// Groups `member` belongs to, by ascending id.
    pub fn groups_for(&self, member: MemberId) -> Vec<(GroupId, String)> {
        let mut groups: Vec<(GroupId, String)> = self
            .groups
            .values()
            .filter(|g| g.has_member(member))
            .map(|g| (g.id, g.name.clone()))
            .collect();
        groups.sort_by_key(|(id, _)| *id);
        groups
    }

    pub fn group_details(&self, group: GroupId) -> Result<GroupDetails, LedgerError> {
        let current = self.group(group)?;
        let members = current
            .members
            .iter()
            .map(|id| self.member(*id).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let expenses = current
            .expenses
            .iter()
            .rev()
            .map(|id| self.expense(*id).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GroupDetails {
            id: current.id,
            name: current.name.clone(),
            created_by: current.created_by,
            members,
            expenses,
        })
    }

    pub fn delete_group(&mut self, group: GroupId) -> Result<Group, LedgerError> {
        let removed = self.group(group)?.clone();
        self.expenses = removed
            .expenses
            .iter()
            .fold(self.expenses.clone(), |acc, id| acc.without(id));
        self.groups = self.groups.without(&group);
        info!(%group, expenses = removed.expenses.len(), "deleted group");
        Ok(removed)
    }

    /// Records an expense paid by `paid_by` and shared according to `splits`.
    ///
    /// The splits must add up to exactly `amount`, and everyone involved must belong
    /// to the group.
    pub fn add_expense(
        &mut self,
        group: GroupId,
        description: &str,
        amount: MonetaryAmount,
        paid_by: MemberId,
        splits: &[Split],
    ) -> Result<ExpenseId, LedgerError> {
        let current = self.group(group)?;
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        if splits.is_empty() {
            return Err(LedgerError::EmptySplits);
        }
        current.require_member(paid_by)?;
        for split in splits {
            current.require_member(split.member)?;
            if !split.amount.is_positive() {
                return Err(LedgerError::NonPositiveAmount(split.amount));
            }
        }
        let split_total: MonetaryAmount = splits.iter().map(|s| s.amount).sum();
        if split_total != amount {
            return Err(LedgerError::SplitMismatch {
                amount,
                splits: split_total,
            });
        }

        let id = ExpenseId::new(self.last_expense + 1);
        let updated = Group {
            expenses: current.expenses.push(id),
            ..current.clone()
        };
        self.last_expense = id.value();
        self.expenses = self.expenses.update(
            id,
            Expense {
                id,
                group,
                description: description.to_string(),
                amount,
                paid_by,
                splits: splits.iter().copied().collect(),
            },
        );
        self.groups = self.groups.update(group, updated);
        info!(%group, expense = id.value(), %amount, %paid_by, "added expense");
        Ok(id)
    }

    pub fn delete_expense(&mut self, expense: ExpenseId) -> Result<Expense, LedgerError> {
        let removed = self.expense(expense)?.clone();
        let current = self.group(removed.group)?;
        let updated = Group {
            expenses: current
                .expenses
                .iter()
                .filter(|id| **id != expense)
                .copied()
                .collect(),
            ..current.clone()
        };
        self.groups = self.groups.update(removed.group, updated);
        self.expenses = self.expenses.without(&expense);
        info!(group = %removed.group, expense = expense.value(), "deleted expense");
        Ok(removed)
    }

    /// Records that `payer` paid `payee` directly.
    pub fn record_settlement(
        &mut self,
        group: GroupId,
        payer: MemberId,
        payee: MemberId,
        amount: MonetaryAmount,
    ) -> Result<(), LedgerError> {
        let current = self.group(group)?;
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        if payer == payee {
            return Err(LedgerError::SelfSettlement(payer));
        }
        current.require_member(payer)?;
        current.require_member(payee)?;
        let updated = Group {
            settlements: current.settlements.push(SettlementFact {
                payer,
                payee,
                amount,
            }),
            ..current.clone()
        };
        self.groups = self.groups.update(group, updated);
        info!(%group, %payer, %payee, %amount, "recorded settlement");
        Ok(())
    }

    fn group_expenses(&self, group: GroupId) -> Result<Vec<&Expense>, LedgerError> {
        self.group(group)?
            .expenses
            .iter()
            .map(|id| self.expense(*id))
            .collect()
    }
}

impl LedgerSource for GroupBook {
    type Error = LedgerError;

    fn fetch_roster(&self, group: GroupId) -> Result<Vec<Member>, LedgerError> {
        self.group(group)?
            .members
            .iter()
            .map(|id| self.member(*id).cloned())
            .collect()
    }

    fn fetch_payment_facts(&self, group: GroupId) -> Result<Vec<PaymentFact>, LedgerError> {
        let (order, totals) = self
            .group_expenses(group)?
            .into_iter()
            .fold((Vector::new(), HashMap::new()), |acc, e| {
                accumulate(acc, e.paid_by, e.amount)
            });
        Ok(order
            .iter()
            .map(|member| PaymentFact {
                member: *member,
                amount: totals.get(member).copied().unwrap_or_default(),
            })
            .collect())
    }

    fn fetch_split_facts(&self, group: GroupId) -> Result<Vec<SplitFact>, LedgerError> {
        let (order, totals) = self
            .group_expenses(group)?
            .into_iter()
            .flat_map(|e| e.splits.iter().copied())
            .fold((Vector::new(), HashMap::new()), |acc, s| {
                accumulate(acc, s.member, s.amount)
            });
        Ok(order
            .iter()
            .map(|member| SplitFact {
                member: *member,
                amount: totals.get(member).copied().unwrap_or_default(),
            })
            .collect())
    }

    fn fetch_settlement_facts(&self, group: GroupId) -> Result<Vec<SettlementFact>, LedgerError> {
        Ok(self.group(group)?.settlements.iter().copied().collect())
    }
}

/// A [`GroupBook`] shared between threads.
///
/// Snapshots are taken under a single read lock, so a settlement is never computed
/// from a half-written expense.
#[derive(Clone, Default, Debug)]
pub struct SharedGroupBook {
    inner: Arc<RwLock<GroupBook>>,
}

impl SharedGroupBook {
    pub fn new(book: GroupBook) -> Self {
        Self {
            inner: Arc::new(RwLock::new(book)),
        }
    }

    pub fn read<T, F: FnOnce(&GroupBook) -> T>(&self, f: F) -> T {
        f(&self.inner.read())
    }

    pub fn write<T, F: FnOnce(&mut GroupBook) -> T>(&self, f: F) -> T {
        f(&mut self.inner.write())
    }
}

impl LedgerSource for SharedGroupBook {
    type Error = LedgerError;

    fn fetch_roster(&self, group: GroupId) -> Result<Vec<Member>, LedgerError> {
        self.read(|book| book.fetch_roster(group))
    }

    fn fetch_payment_facts(&self, group: GroupId) -> Result<Vec<PaymentFact>, LedgerError> {
        self.read(|book| book.fetch_payment_facts(group))
    }

    fn fetch_split_facts(&self, group: GroupId) -> Result<Vec<SplitFact>, LedgerError> {
        self.read(|book| book.fetch_split_facts(group))
    }

    fn fetch_settlement_facts(&self, group: GroupId) -> Result<Vec<SettlementFact>, LedgerError> {
        self.read(|book| book.fetch_settlement_facts(group))
    }

    fn snapshot(&self, group: GroupId) -> Result<GroupSnapshot, LedgerError> {
        self.read(|book| book.snapshot(group))
    }
}
