#![forbid(unsafe_code)]

//! Pure local patches applied optimistically before the backend confirms an action.
//!
//! A patch never performs I/O: it inspects the live values, decides whether the action should
//! run at all (`check`), and computes the optimistic replacement values.

use crate::model::{
    Catalog, Identity, NewBankAccount, TaskStatus, Transaction, TransactionKind, TransactionStatus,
    UserTask,
};
use crate::validate::{self, ValidationError};

/// Prefix of placeholder ids minted for rows that exist only locally.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Inputs a patch may need besides the live values. Supplied by the caller so patches stay pure.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchContext {
    pub now: String,
    /// Placeholder id for rows created locally (replaced by the backend's row on confirmation).
    pub local_id: String,
    pub min_withdraw: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Check {
    Apply,
    /// Duplicate or no-op action; nothing is mutated and no remote call is made.
    Skip(&'static str),
}

pub trait LocalPatch: Send + Sync + 'static {
    fn label(&self) -> &'static str;

    fn check(&self, _identity: &Identity, _ctx: &PatchContext) -> Result<Check, ValidationError> {
        Ok(Check::Apply)
    }

    fn patch_identity(&self, identity: &Identity, ctx: &PatchContext) -> Identity;

    /// `None` leaves the catalog untouched.
    fn patch_catalog(&self, _catalog: &Catalog) -> Option<Catalog> {
        None
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LikeTask {
    pub platform_id: String,
}

impl LocalPatch for LikeTask {
    fn label(&self) -> &'static str {
        "like_task"
    }

    fn check(&self, identity: &Identity, _ctx: &PatchContext) -> Result<Check, ValidationError> {
        if identity.has_liked(&self.platform_id) {
            return Ok(Check::Skip("already liked"));
        }
        Ok(Check::Apply)
    }

    fn patch_identity(&self, identity: &Identity, _ctx: &PatchContext) -> Identity {
        let mut next = identity.clone();
        next.liked_task_ids.push(self.platform_id.clone());
        next
    }

    fn patch_catalog(&self, catalog: &Catalog) -> Option<Catalog> {
        let index = catalog
            .platforms
            .iter()
            .position(|p| p.id == self.platform_id)?;
        let mut next = catalog.clone();
        let platform = &mut next.platforms[index];
        platform.likes = Some(platform.like_count() + 1);
        Some(next)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StartTask {
    pub platform_id: String,
    pub platform_name: String,
    pub logo_url: String,
    pub reward_amount: f64,
}

impl LocalPatch for StartTask {
    fn label(&self) -> &'static str {
        "start_task"
    }

    fn check(&self, identity: &Identity, _ctx: &PatchContext) -> Result<Check, ValidationError> {
        if identity.task_for_platform(&self.platform_id).is_some() {
            return Ok(Check::Skip("already participating"));
        }
        Ok(Check::Apply)
    }

    fn patch_identity(&self, identity: &Identity, ctx: &PatchContext) -> Identity {
        let mut next = identity.clone();
        next.my_tasks.insert(
            0,
            UserTask {
                id: ctx.local_id.clone(),
                platform_id: self.platform_id.clone(),
                platform_name: self.platform_name.clone(),
                logo_url: self.logo_url.clone(),
                reward_amount: self.reward_amount,
                status: TaskStatus::Ongoing,
                start_time: ctx.now.clone(),
                submission_time: None,
                proof_image_url: None,
                reject_reason: None,
            },
        );
        next
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindPhone {
    /// Already normalized via [`validate::normalize_phone`].
    pub phone: String,
}

impl LocalPatch for BindPhone {
    fn label(&self) -> &'static str {
        "bind_phone"
    }

    fn check(&self, identity: &Identity, _ctx: &PatchContext) -> Result<Check, ValidationError> {
        if identity.phone.as_deref() == Some(self.phone.as_str()) {
            return Ok(Check::Skip("phone unchanged"));
        }
        Ok(Check::Apply)
    }

    fn patch_identity(&self, identity: &Identity, _ctx: &PatchContext) -> Identity {
        let mut next = identity.clone();
        next.phone = Some(self.phone.clone());
        next
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BindAccount {
    pub account: NewBankAccount,
}

impl LocalPatch for BindAccount {
    fn label(&self) -> &'static str {
        "bind_account"
    }

    fn check(&self, identity: &Identity, _ctx: &PatchContext) -> Result<Check, ValidationError> {
        let duplicate = identity.bank_accounts.iter().any(|a| {
            a.bank_name == self.account.bank_name && a.account_number == self.account.account_number
        });
        if duplicate {
            return Ok(Check::Skip("account already bound"));
        }
        Ok(Check::Apply)
    }

    fn patch_identity(&self, identity: &Identity, ctx: &PatchContext) -> Identity {
        let mut next = identity.clone();
        next.bank_accounts
            .push(self.account.with_id(ctx.local_id.clone()));
        next
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitProof {
    pub task_id: String,
    pub proof_url: String,
}

impl LocalPatch for SubmitProof {
    fn label(&self) -> &'static str {
        "submit_proof"
    }

    fn check(&self, identity: &Identity, _ctx: &PatchContext) -> Result<Check, ValidationError> {
        validate::check_proof(identity, &self.task_id, &self.proof_url)?;
        Ok(Check::Apply)
    }

    fn patch_identity(&self, identity: &Identity, ctx: &PatchContext) -> Identity {
        let mut next = identity.clone();
        if let Some(task) = next.my_tasks.iter_mut().find(|t| t.id == self.task_id) {
            task.status = TaskStatus::Reviewing;
            task.proof_image_url = Some(self.proof_url.trim().to_string());
            task.submission_time = Some(ctx.now.clone());
            task.reject_reason = None;
        }
        next
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Withdraw {
    pub amount: f64,
    pub account_id: String,
}

impl LocalPatch for Withdraw {
    fn label(&self) -> &'static str {
        "withdraw"
    }

    fn check(&self, identity: &Identity, ctx: &PatchContext) -> Result<Check, ValidationError> {
        validate::check_withdraw(identity, self.amount, &self.account_id, ctx.min_withdraw)?;
        Ok(Check::Apply)
    }

    fn patch_identity(&self, identity: &Identity, ctx: &PatchContext) -> Identity {
        let mut next = identity.clone();
        next.balance -= self.amount;
        let description = match identity.account(&self.account_id) {
            Some(account) => format!(
                "Withdraw to {} ({})",
                account.bank_name, account.account_number
            ),
            None => "Withdraw".to_string(),
        };
        next.transactions.insert(
            0,
            Transaction {
                id: ctx.local_id.clone(),
                kind: TransactionKind::Withdraw,
                amount: -self.amount,
                date: ctx.now.clone(),
                description,
                status: TransactionStatus::Pending,
            },
        );
        next
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MarkMessagesRead;

impl LocalPatch for MarkMessagesRead {
    fn label(&self) -> &'static str {
        "mark_messages_read"
    }

    fn check(&self, identity: &Identity, _ctx: &PatchContext) -> Result<Check, ValidationError> {
        if identity.unread_message_count() == 0 {
            return Ok(Check::Skip("nothing unread"));
        }
        Ok(Check::Apply)
    }

    fn patch_identity(&self, identity: &Identity, _ctx: &PatchContext) -> Identity {
        let mut next = identity.clone();
        for message in &mut next.messages {
            message.read = true;
        }
        next
    }
}
