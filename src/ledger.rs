//! Net balance computation for a group's ledger.
//!
//! Folds the accumulated expenses and settlements into one net figure per
//! member: positive means the member is owed money, negative means they owe.
//! Members who left the group after paying or consuming still get an entry,
//! so the sheet always sums to (approximately) zero.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::{Group, GroupExpense, Settlement};

/// Balances below this magnitude count as settled and are omitted from the
/// itemized list.
const ZERO_TOLERANCE: f64 = 1e-9;

/// One member's net position in a group.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemberBalance {
    pub user_id: Uuid,
    pub username: String,
    pub net_balance: f64,
}

/// Per-member balances plus aggregate figures for the viewing member.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BalanceSheet {
    pub group_id: Uuid,
    pub total_owed_by_you: f64,
    pub total_owed_to_you: f64,
    pub balances: Vec<MemberBalance>,
}

/// Computes net balances for a group as seen by `viewer`.
///
/// Expenses credit their payer with the full amount and debit each share
/// holder; expenses recorded without explicit shares split evenly across
/// the current roster. Settlements move the paid amount from the
/// receiver's column to the payer's. Even-split remainders are left to
/// floating point, not redistributed.
pub fn compute_balances(
    group: &Group,
    expenses: &[GroupExpense],
    settlements: &[Settlement],
    viewer: Uuid,
) -> BalanceSheet {
    let mut balances: HashMap<Uuid, f64> = HashMap::new();
    let mut usernames: HashMap<Uuid, String> = HashMap::new();
    // Roster first, former members appended as they appear in the history.
    let mut order: Vec<Uuid> = Vec::new();

    for member in &group.members {
        balances.insert(member.user_id, 0.0);
        usernames.insert(member.user_id, member.username.clone());
        order.push(member.user_id);
    }

    fn touch(id: Uuid, balances: &mut HashMap<Uuid, f64>, order: &mut Vec<Uuid>) {
        if !balances.contains_key(&id) {
            balances.insert(id, 0.0);
            order.push(id);
        }
    }

    for expense in expenses {
        touch(expense.paid_by, &mut balances, &mut order);
        *balances.entry(expense.paid_by).or_insert(0.0) += expense.amount;

        if expense.shares.is_empty() {
            // Even split across the current roster.
            if !group.members.is_empty() {
                let per_member = expense.amount / group.members.len() as f64;
                for member in &group.members {
                    *balances.entry(member.user_id).or_insert(0.0) -= per_member;
                }
            }
        } else {
            for share in &expense.shares {
                touch(share.user_id, &mut balances, &mut order);
                *balances.entry(share.user_id).or_insert(0.0) -= share.share_amount;
            }
        }
    }

    for settlement in settlements {
        touch(settlement.payer_id, &mut balances, &mut order);
        touch(settlement.receiver_id, &mut balances, &mut order);
        // Cash handed over reduces what the payer owes and what the
        // receiver is owed.
        *balances.entry(settlement.payer_id).or_insert(0.0) += settlement.amount;
        *balances.entry(settlement.receiver_id).or_insert(0.0) -= settlement.amount;
    }

    let mut total_owed_by_you = 0.0;
    let mut total_owed_to_you = 0.0;
    if let Some(net) = balances.get(&viewer) {
        if *net < -ZERO_TOLERANCE {
            total_owed_by_you = net.abs();
        } else if *net > ZERO_TOLERANCE {
            total_owed_to_you = *net;
        }
    }

    let itemized = order
        .iter()
        .filter_map(|id| {
            let net = balances[id];
            if net.abs() <= ZERO_TOLERANCE {
                return None;
            }
            Some(MemberBalance {
                user_id: *id,
                username: usernames
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| format!("user {}", id)),
                net_balance: net,
            })
        })
        .collect();

    BalanceSheet {
        group_id: group.id,
        total_owed_by_you,
        total_owed_to_you,
        balances: itemized,
    }
}
