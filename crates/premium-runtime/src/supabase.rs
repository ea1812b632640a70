//! Supabase User Store
//!
//! `UserStore` over Supabase's PostgREST API. Expected table:
//!
//! ```text
//! users (
//!   id                 text primary key,
//!   email              text unique not null,
//!   name               text,
//!   picture            text,
//!   plan               text not null default 'free',
//!   stripe_customer_id text unique
//! )
//! ```

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;

use premium_core::{
    CoreError, EntitlementUpdate, NewUser, ReferenceChange, Result, User, UserStore,
};

const COLUMNS: &str = "id,email,name,picture,plan,stripe_customer_id";

/// Supabase connection settings
#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,

    /// Service-role key (bypasses row-level security)
    pub service_key: String,

    pub table: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_key: service_key.into(),
            table: "users".into(),
            timeout_secs: 10,
        }
    }

    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| CoreError::Config("SUPABASE_URL not set".into()))?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .map_err(|_| CoreError::Config("SUPABASE_SERVICE_ROLE_KEY not set".into()))?;

        let mut config = Self::new(url, service_key);
        if let Ok(table) = std::env::var("SUPABASE_USERS_TABLE") {
            config.table = table;
        }
        Ok(config)
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.url.trim_end_matches('/'), self.table)
    }
}

/// PostgREST-backed user store
pub struct SupabaseUserStore {
    http: reqwest::Client,
    config: SupabaseConfig,
}

impl SupabaseUserStore {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(SupabaseConfig::from_env()?)
    }

    fn request(&self, method: Method) -> RequestBuilder {
        self.http
            .request(method, self.config.endpoint())
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
    }

    async fn select_one(&self, column: &str, value: &str) -> Result<Option<User>> {
        let response = self
            .request(Method::GET)
            .query(&[
                ("select", COLUMNS.to_string()),
                (column, format!("eq.{value}")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await
            .map_err(unavailable)?;

        Ok(rows(response).await?.into_iter().next())
    }
}

/// PostgREST filter matching rows *not* already in the update's target state.
///
/// Mirrors `EntitlementUpdate::is_satisfied_by`. `neq` never matches NULL,
/// so a missing reference needs its own `is.null` arm.
fn change_guard(update: &EntitlementUpdate) -> (&'static str, String) {
    match update.billing_reference() {
        ReferenceChange::Set(reference) => (
            "or",
            format!(
                "(stripe_customer_id.is.null,stripe_customer_id.neq.{})",
                quote(reference)
            ),
        ),
        ReferenceChange::Clear => (
            "or",
            format!("(plan.neq.{},stripe_customer_id.not.is.null)", update.plan()),
        ),
        ReferenceChange::Keep => ("plan", format!("neq.{}", update.plan())),
    }
}

/// Double-quote a value inside a PostgREST logic tree, where `,` `(` `)` are reserved
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn patch_body(update: &EntitlementUpdate) -> Value {
    match update.billing_reference() {
        ReferenceChange::Keep => json!({ "plan": update.plan() }),
        ReferenceChange::Set(reference) => {
            json!({ "plan": update.plan(), "stripe_customer_id": reference })
        }
        ReferenceChange::Clear => json!({ "plan": update.plan(), "stripe_customer_id": null }),
    }
}

fn unavailable(err: reqwest::Error) -> CoreError {
    CoreError::Unavailable(err.to_string())
}

async fn rows(response: Response) -> Result<Vec<User>> {
    let status = response.status();
    if status.is_success() {
        let body = response.bytes().await.map_err(unavailable)?;
        return Ok(serde_json::from_slice(&body)?);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::CONFLICT {
        Err(CoreError::Conflict(body))
    } else {
        Err(CoreError::Unavailable(format!("supabase returned {status}: {body}")))
    }
}

#[async_trait]
impl UserStore for SupabaseUserStore {
    async fn get(&self, id: &str) -> Result<Option<User>> {
        self.select_one("id", id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.select_one("email", email).await
    }

    async fn find_by_billing_reference(&self, reference: &str) -> Result<Option<User>> {
        self.select_one("stripe_customer_id", reference).await
    }

    async fn update_entitlement(
        &self,
        id: &str,
        update: &EntitlementUpdate,
    ) -> Result<Option<User>> {
        let (guard_key, guard_value) = change_guard(update);
        let response = self
            .request(Method::PATCH)
            .query(&[
                ("id", format!("eq.{id}")),
                (guard_key, guard_value),
                ("select", COLUMNS.to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(&patch_body(update))
            .send()
            .await
            .map_err(unavailable)?;

        Ok(rows(response).await?.into_iter().next())
    }

    async fn create_if_absent(&self, new_user: NewUser) -> Result<User> {
        let id = new_user.id.clone();
        let row = new_user.into_user();
        let response = self
            .request(Method::POST)
            .query(&[("on_conflict", "id"), ("select", COLUMNS)])
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(&row)
            .send()
            .await
            .map_err(unavailable)?;

        if let Some(created) = rows(response).await?.into_iter().next() {
            tracing::info!(user_id = %created.id, email = %created.email, "Created user");
            return Ok(created);
        }

        self.get(&id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {id} vanished after insert")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use premium_core::Plan;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn row(plan: &str, reference: Option<&str>) -> Value {
        json!({
            "id": "u1",
            "email": "maria@example.com",
            "name": "Maria",
            "picture": null,
            "plan": plan,
            "stripe_customer_id": reference
        })
    }

    fn store(server: &MockServer) -> SupabaseUserStore {
        SupabaseUserStore::new(SupabaseConfig::new(server.uri(), "service-key")).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = SupabaseConfig::new("https://xyz.supabase.co/", "k");
        assert_eq!(config.table, "users");
        assert_eq!(config.endpoint(), "https://xyz.supabase.co/rest/v1/users");
    }

    #[test]
    fn test_change_guards() {
        assert_eq!(
            change_guard(&EntitlementUpdate::premium("cus_1")),
            (
                "or",
                r#"(stripe_customer_id.is.null,stripe_customer_id.neq."cus_1")"#.into()
            )
        );
        assert_eq!(
            change_guard(&EntitlementUpdate::downgrade()),
            ("plan", "neq.free".into())
        );
        assert_eq!(
            change_guard(&EntitlementUpdate::detach()),
            ("or", "(plan.neq.free,stripe_customer_id.not.is.null)".into())
        );
    }

    #[test]
    fn test_guard_quotes_reserved_characters() {
        let (_, guard) = change_guard(&EntitlementUpdate::premium(r#"cus_1),plan.eq."x"#));
        assert_eq!(
            guard,
            r#"(stripe_customer_id.is.null,stripe_customer_id.neq."cus_1),plan.eq.\"x")"#
        );
    }

    #[test]
    fn test_detach_body_nulls_reference() {
        assert_eq!(
            patch_body(&EntitlementUpdate::detach()),
            json!({ "plan": "free", "stripe_customer_id": null })
        );
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("id", "eq.u1"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row("free", None)])))
            .mount(&server)
            .await;

        let user = store(&server).get("u1").await.unwrap().unwrap();
        assert_eq!(user.plan, Plan::Free);
        assert_eq!(user.email, "maria@example.com");
    }

    #[tokio::test]
    async fn test_lookup_miss_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("stripe_customer_id", "eq.cus_404"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        assert!(store(&server).find_by_billing_reference("cus_404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conditional_update_returns_changed_row() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(query_param("id", "eq.u1"))
            .and(query_param(
                "or",
                r#"(stripe_customer_id.is.null,stripe_customer_id.neq."cus_1")"#,
            ))
            .and(header("prefer", "return=representation"))
            .and(body_json(json!({ "plan": "premium", "stripe_customer_id": "cus_1" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([row("premium", Some("cus_1"))])),
            )
            .mount(&server)
            .await;

        let updated = store(&server)
            .update_entitlement("u1", &EntitlementUpdate::premium("cus_1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.billing_reference.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn test_conditional_update_no_match_is_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let result = store(&server)
            .update_entitlement("u1", &EntitlementUpdate::downgrade())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_unique_violation_is_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
            .mount(&server)
            .await;

        let err = store(&server)
            .update_entitlement("u1", &EntitlementUpdate::premium("cus_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = store(&server).find_by_email("maria@example.com").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_undecodable_row_is_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{ "id": "u1", "plan": "gold" }])),
            )
            .mount(&server)
            .await;

        let err = store(&server).get("u1").await.unwrap_err();
        assert!(matches!(err, CoreError::Json(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_create_if_absent_falls_back_to_existing_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("on_conflict", "id"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("id", "eq.u1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([row("premium", Some("cus_1"))])),
            )
            .mount(&server)
            .await;

        let user = store(&server)
            .create_if_absent(NewUser {
                id: "u1".into(),
                email: "maria@example.com".into(),
                name: Some("Maria".into()),
                picture: None,
            })
            .await
            .unwrap();
        assert_eq!(user.plan, Plan::Premium);
    }
}
