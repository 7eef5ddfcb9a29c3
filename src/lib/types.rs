use std::fmt;
use std::ops::{Add, Neg, Sub};

use im::{HashMap, Vector};
use rust_decimal::{Decimal, RoundingStrategy};

#[derive(Default, Hash, Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct MemberId(u32);

impl MemberId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default, Hash, Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct GroupId(u32);

impl GroupId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default, Hash, Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct ExpenseId(u32);

impl ExpenseId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

/// A decimal amount of money. Arithmetic is exact; rounding only happens through
/// [`MonetaryAmount::round2`] at presentation boundaries.
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct MonetaryAmount(Decimal);

impl MonetaryAmount {
    pub const ZERO: MonetaryAmount = MonetaryAmount(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Builds an amount from a whole number of cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn min(self, other: Self) -> Self {
        if self <= other {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Self) -> Self {
        if self >= other {
            self
        } else {
            other
        }
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// True when the amount has no digits beyond whole cents.
    pub fn is_whole_cents(&self) -> bool {
        self.0.normalize().scale() <= 2
    }

    /// Rounds half away from zero to two decimal places.
    pub fn round2(&self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }
}

impl fmt::Display for MonetaryAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.round2().0)
    }
}

impl Add for MonetaryAmount {
    type Output = MonetaryAmount;

    fn add(self, rhs: Self) -> Self::Output {
        MonetaryAmount(self.value() + rhs.value())
    }
}

impl Sub for MonetaryAmount {
    type Output = MonetaryAmount;

    fn sub(self, rhs: Self) -> Self::Output {
        MonetaryAmount(self.value() - rhs.value())
    }
}

impl Neg for MonetaryAmount {
    type Output = MonetaryAmount;

    fn neg(self) -> Self::Output {
        MonetaryAmount(-self.value())
    }
}

impl std::iter::Sum for MonetaryAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(MonetaryAmount::ZERO, |acc, x| acc + x)
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
}

impl Member {
    pub fn new(id: MemberId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Total paid by one member across the group's expenses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PaymentFact {
    pub member: MemberId,
    pub amount: MonetaryAmount,
}

/// Total owed by one member across the group's expense splits.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SplitFact {
    pub member: MemberId,
    pub amount: MonetaryAmount,
}

/// A recorded direct payment from `payer` to `payee`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SettlementFact {
    pub payer: MemberId,
    pub payee: MemberId,
    pub amount: MonetaryAmount,
}

/// Everything the calculator needs about one group, read at a single point in time.
#[derive(Clone, Default, Debug)]
pub struct GroupSnapshot {
    pub roster: Vec<Member>,
    pub payments: Vec<PaymentFact>,
    pub splits: Vec<SplitFact>,
    pub settlements: Vec<SettlementFact>,
}

/// Net balance per member, iterated in roster order.
///
/// Positive balances are owed to the member, negative balances are owed by the member.
#[derive(Clone, Default, Debug)]
pub struct BalanceSheet {
    pub(crate) order: Vector<MemberId>,
    pub(crate) members: HashMap<MemberId, Member>,
    pub(crate) balances: HashMap<MemberId, MonetaryAmount>,
}

impl BalanceSheet {
    pub fn get(&self, id: &MemberId) -> Option<MonetaryAmount> {
        self.balances.get(id).copied()
    }

    pub fn member(&self, id: &MemberId) -> Option<&Member> {
        self.members.get(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn total(&self) -> MonetaryAmount {
        self.balances.values().copied().sum()
    }

    /// Members and balances in roster order.
    pub fn iter(&self) -> impl Iterator<Item = (&Member, MonetaryAmount)> + '_ {
        self.order.iter().filter_map(move |id| {
            let member = self.members.get(id)?;
            let balance = self.balances.get(id).copied().unwrap_or_default();
            Some((member, balance))
        })
    }

    pub fn map_balance<F>(&self, id: MemberId, f: F) -> Self
    where
        F: FnOnce(MonetaryAmount) -> MonetaryAmount,
    {
        let current = self.balances.get(&id).copied().unwrap_or_default();
        Self {
            balances: self.balances.update(id, f(current)),
            ..self.clone()
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TransferInstruction {
    pub from: Member,
    pub to: Member,
    pub amount: MonetaryAmount,
}
