#![forbid(unsafe_code)]

use crate::model::{Identity, TaskStatus, TransactionKind, TransactionStatus};
use std::collections::{HashMap, HashSet};

pub const NO_REASON: &str = "no reason given";

/// A user-meaningful state change found by diffing two identity snapshots.
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    RewardReceived {
        task_id: String,
        platform_name: String,
        amount: f64,
    },
    TaskRejected {
        task_id: String,
        platform_name: String,
        reason: String,
    },
    WithdrawalSucceeded {
        transaction_id: String,
        amount: f64,
    },
    WithdrawalFailed {
        transaction_id: String,
        amount: f64,
    },
    NewMessage {
        message_id: String,
        title: String,
    },
}

impl Transition {
    /// Key identifying a terminal transition, so it can be announced at most once.
    pub fn terminal_key(&self) -> Option<(String, &'static str)> {
        match self {
            Self::RewardReceived { task_id, .. } => Some((task_id.clone(), "completed")),
            Self::TaskRejected { task_id, .. } => Some((task_id.clone(), "rejected")),
            Self::WithdrawalSucceeded { transaction_id, .. } => {
                Some((transaction_id.clone(), "success"))
            }
            Self::WithdrawalFailed { transaction_id, .. } => {
                Some((transaction_id.clone(), "failed"))
            }
            Self::NewMessage { .. } => None,
        }
    }
}

/// Terminal keys that `identity` shows as open again: tasks back in review or progress, and
/// withdrawals still pending. A later terminal transition for them must be announced anew.
pub fn reopened_keys(identity: &Identity) -> Vec<(String, &'static str)> {
    let mut keys = Vec::new();
    for task in &identity.my_tasks {
        if matches!(task.status, TaskStatus::Ongoing | TaskStatus::Reviewing) {
            keys.push((task.id.clone(), "completed"));
            keys.push((task.id.clone(), "rejected"));
        }
    }
    for tx in &identity.transactions {
        if tx.status == TransactionStatus::Pending {
            keys.push((tx.id.clone(), "success"));
            keys.push((tx.id.clone(), "failed"));
        }
    }
    keys
}

/// Diffs `previous` against `next`. Output order: tasks, transactions, messages; each in the
/// order the rows appear in `next`.
pub fn detect(previous: &Identity, next: &Identity) -> Vec<Transition> {
    let mut out = Vec::new();

    let old_tasks = previous
        .my_tasks
        .iter()
        .map(|t| (t.id.as_str(), t.status))
        .collect::<HashMap<_, _>>();
    for task in &next.my_tasks {
        let old = old_tasks.get(task.id.as_str()).copied();
        match task.status {
            TaskStatus::Completed if old != Some(TaskStatus::Completed) => {
                out.push(Transition::RewardReceived {
                    task_id: task.id.clone(),
                    platform_name: task.platform_name.clone(),
                    amount: task.reward_amount,
                });
            }
            TaskStatus::Rejected if old != Some(TaskStatus::Rejected) => {
                let reason = task
                    .reject_reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .unwrap_or(NO_REASON)
                    .to_string();
                out.push(Transition::TaskRejected {
                    task_id: task.id.clone(),
                    platform_name: task.platform_name.clone(),
                    reason,
                });
            }
            _ => {}
        }
    }

    // only rows that were visibly pending before the cycle count
    let old_pending = previous
        .transactions
        .iter()
        .filter(|tx| tx.status == TransactionStatus::Pending)
        .map(|tx| tx.id.as_str())
        .collect::<HashSet<_>>();
    for tx in &next.transactions {
        if tx.kind != TransactionKind::Withdraw || !old_pending.contains(tx.id.as_str()) {
            continue;
        }
        match tx.status {
            TransactionStatus::Success => out.push(Transition::WithdrawalSucceeded {
                transaction_id: tx.id.clone(),
                amount: tx.amount.abs(),
            }),
            TransactionStatus::Failed => out.push(Transition::WithdrawalFailed {
                transaction_id: tx.id.clone(),
                amount: tx.amount.abs(),
            }),
            TransactionStatus::Pending => {}
        }
    }

    let old_messages = previous
        .messages
        .iter()
        .map(|m| m.id.as_str())
        .collect::<HashSet<_>>();
    for message in &next.messages {
        if !old_messages.contains(message.id.as_str()) {
            out.push(Transition::NewMessage {
                message_id: message.id.clone(),
                title: message.title.clone(),
            });
        }
    }

    out
}
