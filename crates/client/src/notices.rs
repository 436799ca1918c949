#![forbid(unsafe_code)]

use rh_core::transitions::Transition;
use std::fmt;
use tokio::sync::mpsc;

/// User-visible alerts, delivered in the order they were raised.
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
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
    ActionConfirmed {
        action: &'static str,
    },
    ActionFailed {
        action: &'static str,
        message: String,
    },
}

impl From<Transition> for Notice {
    fn from(transition: Transition) -> Self {
        match transition {
            Transition::RewardReceived {
                task_id,
                platform_name,
                amount,
            } => Self::RewardReceived {
                task_id,
                platform_name,
                amount,
            },
            Transition::TaskRejected {
                task_id,
                platform_name,
                reason,
            } => Self::TaskRejected {
                task_id,
                platform_name,
                reason,
            },
            Transition::WithdrawalSucceeded {
                transaction_id,
                amount,
            } => Self::WithdrawalSucceeded {
                transaction_id,
                amount,
            },
            Transition::WithdrawalFailed {
                transaction_id,
                amount,
            } => Self::WithdrawalFailed {
                transaction_id,
                amount,
            },
            Transition::NewMessage { message_id, title } => Self::NewMessage { message_id, title },
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RewardReceived {
                platform_name,
                amount,
                ..
            } => write!(f, "Task approved: +{amount} from {platform_name}"),
            Self::TaskRejected {
                platform_name,
                reason,
                ..
            } => write!(f, "Task rejected ({platform_name}): {reason}"),
            Self::WithdrawalSucceeded { amount, .. } => {
                write!(f, "Withdrawal of {amount} was paid out")
            }
            Self::WithdrawalFailed { amount, .. } => {
                write!(f, "Withdrawal of {amount} failed and was refunded")
            }
            Self::NewMessage { title, .. } => write!(f, "New message: {title}"),
            Self::ActionConfirmed { action } => write!(f, "{action}: done"),
            Self::ActionFailed { action, message } => write!(f, "{action} failed: {message}"),
        }
    }
}

pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;

/// Cloneable sending half. Sends after the receiver is gone are dropped silently.
#[derive(Clone, Debug)]
pub struct NoticeSender {
    tx: mpsc::UnboundedSender<Notice>,
}

impl NoticeSender {
    pub fn send(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }
}

pub fn channel() -> (NoticeSender, NoticeReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NoticeSender { tx }, rx)
}

/// Everything currently queued, without waiting.
pub fn drain(rx: &mut NoticeReceiver) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        out.push(notice);
    }
    out
}
