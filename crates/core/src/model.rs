#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_LOCALE: &str = "id";
pub const DEFAULT_MIN_WITHDRAW: f64 = 50_000.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Ongoing,
    Reviewing,
    Completed,
    Rejected,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Reviewing => "reviewing",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    TaskReward,
    ReferralBonus,
    Withdraw,
    SystemBonus,
    AdminGift,
    VipBonus,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Success,
    Pending,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    #[default]
    Bank,
    Ewallet,
    Crypto,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTask {
    pub id: String,
    pub platform_id: String,
    #[serde(default)]
    pub platform_name: String,
    #[serde(default)]
    pub logo_url: String,
    #[serde(default)]
    pub reward_amount: f64,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TransactionStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_amount: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccount {
    pub id: String,
    pub bank_name: String,
    pub account_name: String,
    pub account_number: String,
    #[serde(rename = "type", default)]
    pub kind: AccountKind,
}

/// Account binding request body; the backend assigns the id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBankAccount {
    pub bank_name: String,
    pub account_name: String,
    pub account_number: String,
    #[serde(rename = "type", default)]
    pub kind: AccountKind,
}

impl NewBankAccount {
    pub fn with_id(&self, id: impl Into<String>) -> BankAccount {
        BankAccount {
            id: id.into(),
            bank_name: self.bank_name.clone(),
            account_name: self.account_name.clone(),
            account_number: self.account_number.clone(),
            kind: self.kind,
        }
    }
}

/// The signed-in account as the backend reports it. Always replaced wholesale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub balance: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub total_earnings: f64,
    #[serde(default = "default_vip_level")]
    pub vip_level: u32,
    #[serde(default)]
    pub referral_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_id: Option<String>,
    #[serde(default)]
    pub invited_count: u32,
    #[serde(default)]
    pub my_tasks: Vec<UserTask>,
    #[serde(default)]
    pub liked_task_ids: Vec<String>,
    #[serde(default)]
    pub registration_date: String,
    #[serde(default)]
    pub bank_accounts: Vec<BankAccount>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default)]
    pub is_banned: bool,
}

fn default_currency() -> String {
    "Rp".to_string()
}

fn default_vip_level() -> u32 {
    1
}

impl Identity {
    pub fn has_liked(&self, platform_id: &str) -> bool {
        self.liked_task_ids.iter().any(|id| id == platform_id)
    }

    pub fn task(&self, task_id: &str) -> Option<&UserTask> {
        self.my_tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_for_platform(&self, platform_id: &str) -> Option<&UserTask> {
        self.my_tasks.iter().find(|t| t.platform_id == platform_id)
    }

    pub fn account(&self, account_id: &str) -> Option<&BankAccount> {
        self.bank_accounts.iter().find(|a| a.id == account_id)
    }

    pub fn has_phone(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    pub fn unread_message_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.read).count()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStep {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformStatus {
    #[default]
    Online,
    Offline,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    Deposit,
    #[default]
    Register,
    Share,
}

/// A task offer shown in the catalog.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_color: Option<String>,
    #[serde(default)]
    pub logo_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc_color: Option<String>,
    #[serde(default)]
    pub download_link: String,
    #[serde(default)]
    pub first_deposit_amount: f64,
    #[serde(default)]
    pub reward_amount: f64,
    #[serde(default)]
    pub launch_date: String,
    #[serde(default)]
    pub is_hot: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub remaining_qty: i64,
    #[serde(default)]
    pub total_qty: i64,
    #[serde(default)]
    pub likes: Option<u64>,
    #[serde(default)]
    pub steps: Vec<TaskStep>,
    #[serde(default)]
    pub rules: String,
    #[serde(default)]
    pub status: PlatformStatus,
    #[serde(rename = "type", default)]
    pub kind: PlatformKind,
    #[serde(default)]
    pub target_countries: Vec<String>,
}

impl Platform {
    pub fn like_count(&self) -> u64 {
        self.likes.unwrap_or(0)
    }

    /// Download links are stored as typed by admins; bare hosts get an https scheme.
    pub fn redirect_url(&self) -> String {
        normalize_link(&self.download_link)
    }
}

pub fn normalize_link(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("http://") || raw.starts_with("https://") {
        return raw.to_string();
    }
    format!("https://{raw}")
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_color: Option<String>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub show_popup: bool,
    #[serde(default)]
    pub target_countries: Vec<String>,
}

/// Platforms and activities, pinned entries first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl Catalog {
    pub fn new(platforms: Vec<Platform>, activities: Vec<Activity>) -> Self {
        let mut catalog = Self {
            platforms,
            activities,
        };
        catalog.sort_pinned_first();
        catalog
    }

    pub fn sort_pinned_first(&mut self) {
        // stable: backend order is kept inside each group
        self.platforms.sort_by_key(|p| !p.is_pinned);
        self.activities.sort_by_key(|a| !a.is_pinned);
    }

    pub fn platform(&self, platform_id: &str) -> Option<&Platform> {
        self.platforms.iter().find(|p| p.id == platform_id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VipTier {
    pub level: u32,
    pub threshold: f64,
    pub reward: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    #[serde(default)]
    pub initial_balance: BTreeMap<String, f64>,
    /// Either a bare number or a locale map such as `{"id": 100000}`.
    #[serde(default)]
    pub min_withdraw_amount: Value,
    #[serde(default)]
    pub telegram_links: BTreeMap<String, String>,
    #[serde(default)]
    pub customer_service_links: BTreeMap<String, String>,
    #[serde(default = "default_hype_level")]
    pub hype_level: u32,
    #[serde(default)]
    pub help_content: String,
    #[serde(default)]
    pub about_content: String,
    #[serde(default)]
    pub vip_config: BTreeMap<String, Vec<VipTier>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_video_url: Option<String>,
}

fn default_hype_level() -> u32 {
    5
}

impl SystemConfig {
    pub fn min_withdraw(&self) -> f64 {
        let positive = |v: &Value| v.as_f64().filter(|n| *n > 0.0);
        let resolved = match &self.min_withdraw_amount {
            Value::Number(_) => positive(&self.min_withdraw_amount),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| *n > 0.0),
            Value::Object(map) => map
                .get(DEFAULT_LOCALE)
                .and_then(positive)
                .or_else(|| map.get("value").and_then(positive)),
            _ => None,
        };
        resolved.unwrap_or(DEFAULT_MIN_WITHDRAW)
    }

    pub fn vip_tiers(&self) -> &[VipTier] {
        self.vip_config
            .get(DEFAULT_LOCALE)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// One page of a paginated listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn has_more(&self, loaded: usize) -> bool {
        (loaded as u64) < self.total
    }
}
