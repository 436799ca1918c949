#![forbid(unsafe_code)]

//! Back-office endpoints. Only the admin console uses these, so they stay inherent on
//! [`HttpBackend`] instead of widening the [`crate::api::Backend`] seam.

use crate::api::HttpBackend;
use crate::error::ApiError;
use reqwest::Method;
use rh_core::model::{Activity, Page, Platform, SystemConfig, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAccount {
    pub id: String,
    pub username: String,
    pub role: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub total_balance: f64,
    #[serde(default)]
    pub pending_withdrawals: u64,
    #[serde(default)]
    pub pending_tasks: u64,
    #[serde(default)]
    pub today_registrations: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskVerdict {
    Approve,
    Reject,
}

impl TaskVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "completed",
            Self::Reject => "rejected",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WithdrawalVerdict {
    Pay,
    Refuse,
}

impl WithdrawalVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pay => "success",
            Self::Refuse => "failed",
        }
    }
}

/// Recipient of an admin message: one user or everybody.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipient {
    All,
    User(String),
}

impl Recipient {
    fn as_str(&self) -> &str {
        match self {
            Self::All => "all",
            Self::User(id) => id,
        }
    }
}

#[derive(Deserialize)]
struct AdminEnvelope {
    admin: AdminAccount,
}

#[derive(Deserialize)]
struct AdminList {
    #[serde(default)]
    admins: Vec<AdminAccount>,
}

#[derive(Deserialize)]
struct ConfigItem {
    #[serde(default)]
    value: Value,
}

impl HttpBackend {
    pub async fn admin_login(&self, username: &str, password: &str) -> Result<AdminAccount, ApiError> {
        let req = self
            .request(Method::POST, "/admin/login")
            .json(&json!({ "username": username, "password": password }));
        let envelope: AdminEnvelope = self.send_json(req).await?;
        Ok(envelope.admin)
    }

    pub async fn list_admins(&self) -> Result<Vec<AdminAccount>, ApiError> {
        let list: AdminList = self.send_json(self.request(Method::GET, "/admin/list")).await?;
        Ok(list.admins)
    }

    pub async fn create_admin(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<AdminAccount, ApiError> {
        let req = self.request(Method::POST, "/admin/create").json(&json!({
            "username": username,
            "password": password,
            "role": role,
        }));
        self.send_json(req).await
    }

    pub async fn change_admin_password(
        &self,
        admin_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let req = self.request(Method::PATCH, "/admin/password").json(&json!({
            "adminId": admin_id,
            "oldPassword": old_password,
            "newPassword": new_password,
        }));
        self.send_unit(req).await
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        self.send_json(self.request(Method::GET, "/admin/dashboard-stats"))
            .await
    }

    /// User rows are a trimmed projection that varies by backend version; kept as raw JSON.
    pub async fn users(
        &self,
        page: u32,
        per_page: u32,
        search: Option<&str>,
    ) -> Result<Page<Value>, ApiError> {
        let mut req = self
            .request(Method::GET, "/admin/users")
            .query(&[("page", page.max(1)), ("per_page", per_page.max(1))]);
        if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
            req = req.query(&[("search", search)]);
        }
        self.send_page(req, "users").await
    }

    pub async fn pending_tasks(&self) -> Result<Page<Value>, ApiError> {
        self.send_page(self.request(Method::GET, "/admin/pending-tasks"), "tasks")
            .await
    }

    pub async fn audit_history(&self, page: u32, per_page: u32) -> Result<Page<Value>, ApiError> {
        let req = self
            .request(Method::GET, "/admin/audit-history")
            .query(&[("page", page.max(1)), ("per_page", per_page.max(1))]);
        self.send_page(req, "tasks").await
    }

    pub async fn pending_withdrawals(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Value>, ApiError> {
        let req = self
            .request(Method::GET, "/admin/pending-withdrawals")
            .query(&[("page", page.max(1)), ("per_page", per_page.max(1))]);
        self.send_page(req, "withdrawals").await
    }

    pub async fn audit_task(
        &self,
        user_id: &str,
        task_id: &str,
        verdict: TaskVerdict,
    ) -> Result<(), ApiError> {
        let req = self.request(Method::POST, "/admin/audit-task").json(&json!({
            "userId": user_id,
            "taskId": task_id,
            "status": verdict.as_str(),
        }));
        self.send_unit(req).await
    }

    pub async fn audit_withdrawal(
        &self,
        transaction_id: &str,
        verdict: WithdrawalVerdict,
    ) -> Result<(), ApiError> {
        let req = self.request(Method::POST, "/admin/audit-withdrawal").json(&json!({
            "transactionId": transaction_id,
            "status": verdict.as_str(),
        }));
        self.send_unit(req).await
    }

    /// `amount` > 0 credits the recipient alongside the message.
    pub async fn send_message(
        &self,
        recipient: &Recipient,
        title: &str,
        content: &str,
        amount: f64,
    ) -> Result<(), ApiError> {
        let req = self.request(Method::POST, "/admin/send-message").json(&json!({
            "userId": recipient.as_str(),
            "title": title,
            "content": content,
            "amount": amount,
        }));
        self.send_unit(req).await
    }

    pub async fn set_user_banned(&self, user_id: &str, banned: bool) -> Result<(), ApiError> {
        let req = self
            .request(Method::PATCH, &format!("/admin/users/{user_id}/ban"))
            .query(&[("is_banned", banned)]);
        self.send_unit(req).await
    }

    pub async fn reset_user_password(&self, user_id: &str, new_password: &str) -> Result<(), ApiError> {
        let req = self
            .request(Method::PATCH, &format!("/admin/users/{user_id}/password"))
            .json(&json!({ "newPassword": new_password }));
        self.send_unit(req).await
    }

    pub async fn add_task(&self, platform: &Platform) -> Result<Platform, ApiError> {
        self.send_json(self.request(Method::POST, "/tasks").json(platform))
            .await
    }

    /// `updates` is a partial camelCase platform object.
    pub async fn update_task(&self, platform_id: &str, updates: &Value) -> Result<Platform, ApiError> {
        let req = self
            .request(Method::PATCH, &format!("/tasks/{platform_id}"))
            .json(updates);
        self.send_json(req).await
    }

    pub async fn delete_task(&self, platform_id: &str) -> Result<(), ApiError> {
        self.send_unit(self.request(Method::DELETE, &format!("/tasks/{platform_id}")))
            .await
    }

    pub async fn add_activity(&self, activity: &Activity) -> Result<Activity, ApiError> {
        self.send_json(self.request(Method::POST, "/activities").json(activity))
            .await
    }

    pub async fn update_activity(
        &self,
        activity_id: &str,
        updates: &Value,
    ) -> Result<Activity, ApiError> {
        let req = self
            .request(Method::PATCH, &format!("/activities/{activity_id}"))
            .json(updates);
        self.send_json(req).await
    }

    pub async fn delete_activity(&self, activity_id: &str) -> Result<(), ApiError> {
        self.send_unit(self.request(Method::DELETE, &format!("/activities/{activity_id}")))
            .await
    }

    pub async fn update_config(&self, config: &SystemConfig) -> Result<SystemConfig, ApiError> {
        self.send_json(self.request(Method::POST, "/config").json(config))
            .await
    }

    pub async fn config_item(&self, key: &str) -> Result<Value, ApiError> {
        let item: ConfigItem = self
            .send_json(self.request(Method::GET, &format!("/config/{key}")))
            .await?;
        Ok(item.value)
    }

    pub async fn admin_messages(
        &self,
        page: u32,
        page_size: u32,
        search: Option<&str>,
    ) -> Result<Page<Value>, ApiError> {
        let mut req = self
            .request(Method::GET, "/admin/messages")
            .query(&[("page", page.max(1)), ("pageSize", page_size.max(1))]);
        if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
            req = req.query(&[("search", search)]);
        }
        self.send_page(req, "messages").await
    }

    pub async fn admin_user_transactions(
        &self,
        user_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Transaction>, ApiError> {
        let req = self
            .request(Method::GET, &format!("/admin/users/{user_id}/transactions"))
            .query(&[("page", page.max(1)), ("per_page", per_page.max(1))]);
        self.send_page(req, "transactions").await
    }
}
