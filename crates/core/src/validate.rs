#![forbid(unsafe_code)]

use crate::model::{Identity, NewBankAccount, TaskStatus};
use crate::patch::LOCAL_ID_PREFIX;
use thiserror::Error;

const MIN_PHONE_DIGITS: usize = 8;
const MAX_PHONE_DIGITS: usize = 15;
const MAX_FIELD_LEN: usize = 128;

/// Rejections raised locally, before any remote call is made.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{0} is too long")]
    TooLong(&'static str),
    #[error("phone number must contain 8-15 digits")]
    InvalidPhone,
    #[error("amount must be a positive number")]
    AmountNotPositive,
    #[error("minimum withdrawal is {minimum}")]
    BelowMinimum { minimum: f64, amount: f64 },
    #[error("insufficient balance ({balance} < {amount})")]
    InsufficientBalance { balance: f64, amount: f64 },
    #[error("please bind a phone number first")]
    PhoneNotBound,
    #[error("unknown payment account")]
    UnknownAccount,
    #[error("unknown task")]
    UnknownTask,
    #[error("please sign in first")]
    NotSignedIn,
    #[error("cannot submit proof for task with status: {}", .0.as_str())]
    TaskNotSubmittable(TaskStatus),
    #[error("task is still being created, try again shortly")]
    TaskNotSynced,
}

pub fn normalize_phone(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty("phone"));
    }
    let mut digits = 0usize;
    for (index, ch) in trimmed.chars().enumerate() {
        match ch {
            '0'..='9' => digits += 1,
            '+' if index == 0 => {}
            ' ' | '-' => {}
            _ => return Err(ValidationError::InvalidPhone),
        }
    }
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
        return Err(ValidationError::InvalidPhone);
    }
    Ok(trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect())
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty(field));
    }
    if value.len() > MAX_FIELD_LEN {
        return Err(ValidationError::TooLong(field));
    }
    Ok(value.to_string())
}

pub fn normalize_account(account: &NewBankAccount) -> Result<NewBankAccount, ValidationError> {
    Ok(NewBankAccount {
        bank_name: required(&account.bank_name, "bank name")?,
        account_name: required(&account.account_name, "account name")?,
        account_number: required(&account.account_number, "account number")?,
        kind: account.kind,
    })
}

pub fn check_withdraw(
    identity: &Identity,
    amount: f64,
    account_id: &str,
    minimum: f64,
) -> Result<(), ValidationError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::AmountNotPositive);
    }
    if amount < minimum {
        return Err(ValidationError::BelowMinimum { minimum, amount });
    }
    if identity.balance < amount {
        return Err(ValidationError::InsufficientBalance {
            balance: identity.balance,
            amount,
        });
    }
    if !identity.has_phone() {
        return Err(ValidationError::PhoneNotBound);
    }
    if identity.account(account_id).is_none() {
        return Err(ValidationError::UnknownAccount);
    }
    Ok(())
}

pub fn check_proof(identity: &Identity, task_id: &str, proof_url: &str) -> Result<(), ValidationError> {
    required(proof_url, "proof image url")?;
    let task = identity.task(task_id).ok_or(ValidationError::UnknownTask)?;
    if task.id.starts_with(LOCAL_ID_PREFIX) {
        return Err(ValidationError::TaskNotSynced);
    }
    match task.status {
        TaskStatus::Ongoing | TaskStatus::Rejected => Ok(()),
        other => Err(ValidationError::TaskNotSubmittable(other)),
    }
}
