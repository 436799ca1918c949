#![forbid(unsafe_code)]

//! Remote data client for the reward backend's JSON API.

use crate::config::ClientConfig;
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use rh_core::model::{
    Activity, Catalog, Identity, Message, NewBankAccount, Page, Platform, SystemConfig,
    Transaction, UserTask,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// User-facing backend calls. Everything the coordinator and engine need goes through here so
/// tests can script the backend.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<Identity, ApiError>;

    async fn register(
        &self,
        email: &str,
        password: &str,
        invite_code: Option<&str>,
    ) -> Result<Identity, ApiError>;

    async fn get_user(&self, user_id: &str) -> Result<Identity, ApiError>;

    async fn initial_data(&self) -> Result<Catalog, ApiError>;

    async fn config(&self) -> Result<SystemConfig, ApiError>;

    async fn like_task(&self, user_id: &str, platform_id: &str) -> Result<Identity, ApiError>;

    async fn start_task(&self, user_id: &str, platform_id: &str) -> Result<UserTask, ApiError>;

    async fn submit_task_proof(
        &self,
        user_id: &str,
        task_id: &str,
        proof_image_url: &str,
    ) -> Result<(), ApiError>;

    async fn bind_phone(&self, user_id: &str, phone: &str) -> Result<Identity, ApiError>;

    async fn bind_account(
        &self,
        user_id: &str,
        account: &NewBankAccount,
    ) -> Result<Identity, ApiError>;

    async fn withdraw(
        &self,
        user_id: &str,
        amount: f64,
        account_id: &str,
    ) -> Result<Identity, ApiError>;

    async fn mark_all_messages_read(&self, user_id: &str) -> Result<(), ApiError>;

    async fn user_transactions(
        &self,
        user_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Transaction>, ApiError>;

    async fn user_tasks(
        &self,
        user_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<UserTask>, ApiError>;

    async fn user_messages(
        &self,
        user_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Message>, ApiError>;

    async fn task_detail(&self, platform_id: &str) -> Result<Platform, ApiError>;

    async fn activity_detail(&self, activity_id: &str) -> Result<Activity, ApiError>;
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: Identity,
}

#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ApiError::network(format!("failed to create http client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{endpoint}", self.base_url);
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = check(req.send().await?).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|err| ApiError::decode(format!("failed to parse response: {err}")))
    }

    pub(crate) async fn send_unit(&self, req: RequestBuilder) -> Result<(), ApiError> {
        check(req.send().await?).await?;
        Ok(())
    }

    pub(crate) async fn send_page<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        key: &str,
    ) -> Result<Page<T>, ApiError> {
        let body: Value = self.send_json(req).await?;
        take_page(body, key)
    }
}

async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::status(status.as_u16(), error_detail(&body)))
}

/// Error bodies look like `{"detail": "..."}`; validation failures carry a list instead.
pub(crate) fn error_detail(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(detail)) if !detail.trim().is_empty() => detail.clone(),
            Some(Value::Null) | None => "Request failed".to_string(),
            Some(other) => other.to_string(),
        },
        _ => "Request failed".to_string(),
    }
}

pub(crate) fn take_page<T: DeserializeOwned>(mut body: Value, key: &str) -> Result<Page<T>, ApiError> {
    let total = body.get("total").and_then(Value::as_u64).unwrap_or(0);
    let items = match body.get_mut(key).map(Value::take) {
        Some(Value::Null) | None => Vec::new(),
        Some(rows) => serde_json::from_value(rows)
            .map_err(|err| ApiError::decode(format!("failed to parse {key}: {err}")))?,
    };
    Ok(Page { items, total })
}

fn page_query(page: u32, per_page: u32) -> [(&'static str, u32); 2] {
    [("page", page.max(1)), ("per_page", per_page.max(1))]
}

#[async_trait]
impl Backend for HttpBackend {
    async fn login(&self, email: &str, password: &str) -> Result<Identity, ApiError> {
        let req = self
            .request(Method::POST, "/auth/login")
            .json(&json!({ "email": email, "password": password }));
        let envelope: UserEnvelope = self.send_json(req).await?;
        Ok(envelope.user)
    }

    async fn register(
        &self,
        email: &str,
        password: &str,
        invite_code: Option<&str>,
    ) -> Result<Identity, ApiError> {
        let req = self.request(Method::POST, "/auth/register").json(&json!({
            "email": email,
            "password": password,
            "inviteCode": invite_code,
        }));
        let envelope: UserEnvelope = self.send_json(req).await?;
        Ok(envelope.user)
    }

    async fn get_user(&self, user_id: &str) -> Result<Identity, ApiError> {
        self.send_json(self.request(Method::GET, &format!("/users/{user_id}")))
            .await
    }

    async fn initial_data(&self) -> Result<Catalog, ApiError> {
        let catalog: Catalog = self
            .send_json(self.request(Method::GET, "/initial-data"))
            .await?;
        Ok(Catalog::new(catalog.platforms, catalog.activities))
    }

    async fn config(&self) -> Result<SystemConfig, ApiError> {
        self.send_json(self.request(Method::GET, "/config")).await
    }

    async fn like_task(&self, user_id: &str, platform_id: &str) -> Result<Identity, ApiError> {
        let req = self
            .request(Method::POST, &format!("/tasks/{platform_id}/like"))
            .query(&[("user_id", user_id)]);
        self.send_json(req).await
    }

    async fn start_task(&self, user_id: &str, platform_id: &str) -> Result<UserTask, ApiError> {
        let req = self
            .request(Method::POST, &format!("/tasks/{platform_id}/start"))
            .query(&[("user_id", user_id)]);
        self.send_json(req).await
    }

    async fn submit_task_proof(
        &self,
        user_id: &str,
        task_id: &str,
        proof_image_url: &str,
    ) -> Result<(), ApiError> {
        let req = self.request(Method::POST, "/tasks/submit-proof").json(&json!({
            "userId": user_id,
            "taskId": task_id,
            "proofImageUrl": proof_image_url,
        }));
        self.send_unit(req).await
    }

    async fn bind_phone(&self, user_id: &str, phone: &str) -> Result<Identity, ApiError> {
        let req = self
            .request(Method::POST, &format!("/users/{user_id}/bind-phone"))
            .json(&json!({ "phone": phone }));
        self.send_json(req).await
    }

    async fn bind_account(
        &self,
        user_id: &str,
        account: &NewBankAccount,
    ) -> Result<Identity, ApiError> {
        let req = self
            .request(Method::POST, &format!("/users/{user_id}/bind-bank"))
            .json(account);
        self.send_json(req).await
    }

    async fn withdraw(
        &self,
        user_id: &str,
        amount: f64,
        account_id: &str,
    ) -> Result<Identity, ApiError> {
        let req = self
            .request(Method::POST, &format!("/users/{user_id}/withdraw"))
            .json(&json!({ "amount": amount, "accountId": account_id }));
        self.send_json(req).await
    }

    async fn mark_all_messages_read(&self, user_id: &str) -> Result<(), ApiError> {
        self.send_unit(self.request(Method::PATCH, &format!("/users/{user_id}/messages/read")))
            .await
    }

    async fn user_transactions(
        &self,
        user_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Transaction>, ApiError> {
        let req = self
            .request(Method::GET, &format!("/users/{user_id}/transactions"))
            .query(&page_query(page, per_page));
        self.send_page(req, "transactions").await
    }

    async fn user_tasks(
        &self,
        user_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<UserTask>, ApiError> {
        let req = self
            .request(Method::GET, &format!("/users/{user_id}/tasks"))
            .query(&page_query(page, per_page));
        self.send_page(req, "tasks").await
    }

    async fn user_messages(
        &self,
        user_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Message>, ApiError> {
        let req = self
            .request(Method::GET, &format!("/users/{user_id}/messages"))
            .query(&page_query(page, per_page));
        self.send_page(req, "messages").await
    }

    async fn task_detail(&self, platform_id: &str) -> Result<Platform, ApiError> {
        self.send_json(self.request(Method::GET, &format!("/tasks/{platform_id}")))
            .await
    }

    async fn activity_detail(&self, activity_id: &str) -> Result<Activity, ApiError> {
        self.send_json(self.request(Method::GET, &format!("/activities/{activity_id}")))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_detail_shapes() {
        assert_eq!(error_detail(r#"{"detail":"Task already taken"}"#), "Task already taken");
        assert_eq!(error_detail("<html>oops</html>"), "Request failed");
        assert_eq!(error_detail(r#"{"detail":null}"#), "Request failed");
        assert_eq!(
            error_detail(r#"{"detail":[{"msg":"field required"}]}"#),
            r#"[{"msg":"field required"}]"#
        );
    }

    #[test]
    fn pages_are_read_from_named_key() {
        let body = json!({
            "transactions": [
                {"id": "T1", "type": "task_reward", "amount": 15000, "date": "2024-05-01T00:00:00", "status": "success"}
            ],
            "total": 7
        });
        let page: Page<Transaction> = take_page(body, "transactions").expect("page");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total, 7);
        assert!(page.has_more(1));

        let empty: Page<Transaction> = take_page(json!({"total": 0}), "transactions").expect("page");
        assert!(empty.items.is_empty());
        assert!(take_page::<Transaction>(json!({"transactions": [1]}), "transactions").is_err());
    }

    #[test]
    fn base_url_is_trimmed() {
        let cfg = ClientConfig {
            api_base: "http://localhost:8000/api/".to_string(),
            ..ClientConfig::default()
        };
        let backend = HttpBackend::new(&cfg).expect("backend");
        assert_eq!(backend.base_url(), "http://localhost:8000/api");
    }
}
