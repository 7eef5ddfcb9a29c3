use std::{ffi::OsStr, fs::File, io::Read, str::FromStr};

use ::serde::{Deserialize, Serialize, Serializer};
use im::{HashMap, Vector};
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::FactsError;
use crate::source::LedgerSource;
use crate::types::{
    GroupId, Member, MemberId, MonetaryAmount, PaymentFact, SettlementFact, SplitFact,
    TransferInstruction,
};
use crate::utils::{accumulate, OrDefault, PushImmut};

#[derive(Debug, Deserialize, Clone, Copy)]
pub enum FactTypeEntity {
    #[serde(alias = "member")]
    Member,
    #[serde(alias = "paid")]
    Paid,
    #[serde(alias = "owed")]
    Owed,
    #[serde(alias = "settled")]
    Settled,
}

#[derive(Debug, Deserialize)]
pub struct FactRowEntity {
    #[serde(alias = "type")]
    pub fact_type: FactTypeEntity,
    pub group: u32,
    pub member: u32,
    pub counterparty: Option<u32>,
    pub amount: Option<String>,
    pub name: Option<String>,
}

enum Fact {
    Member(Member),
    Paid(PaymentFact),
    Owed(SplitFact),
    Settled(SettlementFact),
}

fn malformed(line: usize, reason: impl Into<String>) -> FactsError {
    FactsError::MalformedRow {
        line,
        reason: reason.into(),
    }
}

fn parse_amount(line: usize, raw: Option<&str>) -> Result<MonetaryAmount, FactsError> {
    let raw = raw
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed(line, "missing amount"))?;
    let value =
        Decimal::from_str(raw).map_err(|e| malformed(line, format!("bad amount {raw:?}: {e}")))?;
    if value.is_sign_negative() {
        return Err(malformed(line, format!("negative amount {raw}")));
    }
    Ok(MonetaryAmount::new(value))
}

impl FactRowEntity {
    fn into_domain(self, line: usize) -> Result<(GroupId, Fact), FactsError> {
        let group = GroupId::new(self.group);
        let member = MemberId::new(self.member);
        let fact = match self.fact_type {
            FactTypeEntity::Member => {
                let name = self
                    .name
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| malformed(line, "member row without a name"))?;
                Fact::Member(Member::new(member, name))
            }
            FactTypeEntity::Paid => Fact::Paid(PaymentFact {
                member,
                amount: parse_amount(line, self.amount.as_deref())?,
            }),
            FactTypeEntity::Owed => Fact::Owed(SplitFact {
                member,
                amount: parse_amount(line, self.amount.as_deref())?,
            }),
            FactTypeEntity::Settled => Fact::Settled(SettlementFact {
                payer: member,
                payee: MemberId::new(
                    self.counterparty
                        .ok_or_else(|| malformed(line, "settlement without a counterparty"))?,
                ),
                amount: parse_amount(line, self.amount.as_deref())?,
            }),
        };
        Ok((group, fact))
    }
}

type Totals = (Vector<MemberId>, HashMap<MemberId, MonetaryAmount>);

#[derive(Clone, Default, Debug)]
struct GroupFacts {
    roster: Vector<Member>,
    paid: Totals,
    owed: Totals,
    settlements: Vector<SettlementFact>,
}

impl GroupFacts {
    fn record(self, fact: Fact) -> Self {
        match fact {
            Fact::Member(member) => Self {
                roster: self.roster.push(member),
                ..self
            },
            Fact::Paid(p) => Self {
                paid: accumulate(self.paid, p.member, p.amount),
                ..self
            },
            Fact::Owed(s) => Self {
                owed: accumulate(self.owed, s.member, s.amount),
                ..self
            },
            Fact::Settled(s) => Self {
                settlements: self.settlements.push(s),
                ..self
            },
        }
    }
}

fn flatten(totals: &Totals) -> Vec<(MemberId, MonetaryAmount)> {
    let (order, amounts) = totals;
    order
        .iter()
        .map(|member| (*member, amounts.get_or_default(member)))
        .collect()
}

/// Ledger facts loaded from a CSV file with the columns
/// `type,group,member,counterparty,amount,name`.
///
/// `paid` and `owed` rows may repeat per member; they are summed on load in the order
/// members first appear.
#[derive(Clone, Default, Debug)]
pub struct CsvLedgerSource {
    groups: HashMap<GroupId, GroupFacts>,
}

impl CsvLedgerSource {
    pub fn from_path(csv_path: &OsStr) -> Result<Self, FactsError> {
        let file = File::open(csv_path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FactsError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut groups: HashMap<GroupId, GroupFacts> = HashMap::new();
        for (idx, row) in reader.deserialize::<FactRowEntity>().enumerate() {
            // fail on the first bad row, a partial ledger would settle wrongly
            let (group, fact) = row?.into_domain(idx + 2)?;
            let facts = groups.get_or_default(&group).record(fact);
            groups = groups.update(group, facts);
        }
        debug!(groups = groups.len(), "loaded ledger facts");

        Ok(Self { groups })
    }

    fn group(&self, group: GroupId) -> Result<&GroupFacts, FactsError> {
        self.groups
            .get(&group)
            .ok_or(FactsError::UnknownGroup(group))
    }
}

impl LedgerSource for CsvLedgerSource {
    type Error = FactsError;

    fn fetch_roster(&self, group: GroupId) -> Result<Vec<Member>, FactsError> {
        Ok(self.group(group)?.roster.iter().cloned().collect())
    }

    fn fetch_payment_facts(&self, group: GroupId) -> Result<Vec<PaymentFact>, FactsError> {
        Ok(flatten(&self.group(group)?.paid)
            .into_iter()
            .map(|(member, amount)| PaymentFact { member, amount })
            .collect())
    }

    fn fetch_split_facts(&self, group: GroupId) -> Result<Vec<SplitFact>, FactsError> {
        Ok(flatten(&self.group(group)?.owed)
            .into_iter()
            .map(|(member, amount)| SplitFact { member, amount })
            .collect())
    }

    fn fetch_settlement_facts(&self, group: GroupId) -> Result<Vec<SettlementFact>, FactsError> {
        Ok(self.group(group)?.settlements.iter().copied().collect())
    }
}

fn two_places<S: Serializer>(x: &Decimal, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:.2}", x))
}

#[derive(Debug, Serialize)]
pub struct TransferRowEntity {
    from: String,
    to: String,
    #[serde(serialize_with = "two_places")]
    amount: Decimal,
}

impl TransferRowEntity {
    pub fn from_instruction(instruction: TransferInstruction) -> Self {
        Self {
            from: instruction.from.name,
            to: instruction.to.name,
            amount: instruction.amount.round2().value(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceRowEntity {
    member: u32,
    name: String,
    #[serde(serialize_with = "two_places")]
    balance: Decimal,
}

impl BalanceRowEntity {
    pub fn from_balance(member: Member, balance: MonetaryAmount) -> Self {
        Self {
            member: member.id.value(),
            name: member.name,
            balance: balance.round2().value(),
        }
    }
}

fn write_csv<T: Serialize>(rows: impl IntoIterator<Item = T>) -> Result<String, FactsError> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    for row in rows {
        wtr.serialize(row)?
    }

    wtr.flush()?;
    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

pub fn output_csv(instructions: Vec<TransferInstruction>) -> Result<String, FactsError> {
    write_csv(
        instructions
            .into_iter()
            .map(TransferRowEntity::from_instruction),
    )
}

pub fn output_balances_csv(
    balances: impl IntoIterator<Item = (Member, MonetaryAmount)>,
) -> Result<String, FactsError> {
    write_csv(
        balances
            .into_iter()
            .map(|(member, balance)| BalanceRowEntity::from_balance(member, balance)),
    )
}
