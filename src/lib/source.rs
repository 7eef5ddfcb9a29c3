use crate::types::{GroupId, GroupSnapshot, Member, PaymentFact, SettlementFact, SplitFact};

/// Where the calculator gets its facts from.
///
/// Payment and split facts are expected pre-summed, one row per member. The
/// calculator only ever sees what [`LedgerSource::snapshot`] returns, so a source
/// that can be written to while it is being read should override it and answer
/// from a single consistent read.
pub trait LedgerSource {
    type Error: std::error::Error + 'static;

    fn fetch_roster(&self, group: GroupId) -> Result<Vec<Member>, Self::Error>;

    fn fetch_payment_facts(&self, group: GroupId) -> Result<Vec<PaymentFact>, Self::Error>;

    fn fetch_split_facts(&self, group: GroupId) -> Result<Vec<SplitFact>, Self::Error>;

    fn fetch_settlement_facts(&self, group: GroupId) -> Result<Vec<SettlementFact>, Self::Error>;

    fn snapshot(&self, group: GroupId) -> Result<GroupSnapshot, Self::Error> {
        Ok(GroupSnapshot {
            roster: self.fetch_roster(group)?,
            payments: self.fetch_payment_facts(group)?,
            splits: self.fetch_split_facts(group)?,
            settlements: self.fetch_settlement_facts(group)?,
        })
    }
}
