use std::{collections::HashMap, ffi::OsString};

use serde::Serialize;

#[derive(Serialize)]
struct TransferRow {
    from: &'static str,
    to: &'static str,
    amount: &'static str,
}

#[derive(Serialize)]
struct BalanceRow {
    member: &'static str,
    name: &'static str,
    balance: &'static str,
}

fn to_csv<T: Serialize>(rows: Vec<T>) -> String {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for row in rows {
        wtr.serialize(row).unwrap();
    }
    wtr.flush().unwrap();
    String::from_utf8(wtr.into_inner().unwrap()).unwrap()
}

// Only used during testing so no need to return result
pub fn create_transfer_csv(rows: Vec<[&'static str; 3]>) -> String {
    to_csv(
        rows.into_iter()
            .map(|r| TransferRow {
                from: r[0],
                to: r[1],
                amount: r[2],
            })
            .collect(),
    )
}

pub fn create_balance_csv(rows: Vec<[&'static str; 3]>) -> String {
    to_csv(
        rows.into_iter()
            .map(|r| BalanceRow {
                member: r[0],
                name: r[1],
                balance: r[2],
            })
            .collect(),
    )
}

pub fn resource(name: &str) -> OsString {
    OsString::from(format!("tests/resources/{}", name))
}

fn count_rows(csv: &str) -> HashMap<String, usize> {
    csv.lines()
        .skip(1) // ignore row titles
        .filter(|line| !line.is_empty())
        .fold(HashMap::new(), |mut acc, line| {
            *acc.entry(line.to_string()).or_insert(0) += 1;
            acc
        })
}

// Row order is not part of the balance output contract. Transfer output is ordered
// and should be compared with assert_eq instead.
pub fn assert_unsorted_eq(s1: &str, s2: &str) {
    let sut1 = count_rows(s1);
    let sut2 = count_rows(s2);
    if sut1.values().sum::<usize>() != sut2.values().sum::<usize>() {
        panic!("csvs do not contain the same number of rows");
    }

    sut1.iter().for_each(|(row, n)| match sut2.get(row) {
        Some(m) => assert_eq!(m, n, "row {} appears a different number of times", row),
        None => panic!("row {} not found in both csvs", row),
    })
}
