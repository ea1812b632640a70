//! Resend Email Notifier

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use premium_billing::{Notification, Notifier, PaymentError, Result};

const DEFAULT_FROM: &str = "LottoMestre <contato@lottomestre.com.br>";

/// Resend configuration
#[derive(Clone, Debug)]
pub struct ResendConfig {
    pub api_key: String,

    /// Sender, must belong to a verified domain
    pub from: String,

    pub base_url: String,

    pub timeout_secs: u64,
}

impl ResendConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            from: DEFAULT_FROM.into(),
            base_url: "https://api.resend.com".into(),
            timeout_secs: 10,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("RESEND_API_KEY")
            .map_err(|_| PaymentError::Config("RESEND_API_KEY not set".into()))?;

        let mut config = Self::new(api_key);
        if let Ok(from) = std::env::var("EMAIL_FROM") {
            config.from = from;
        }
        Ok(config)
    }
}

#[derive(Serialize)]
struct SendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Sends notifications through the Resend API
pub struct ResendNotifier {
    http: reqwest::Client,
    config: ResendConfig,
}

impl ResendNotifier {
    pub fn new(config: ResendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaymentError::Config(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ResendConfig::from_env()?)
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let email = notification.render();
        let url = format!("{}/emails", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&SendEmail {
                from: &self.config.from,
                to: [notification.to_email.as_str()],
                subject: &email.subject,
                html: &email.html,
            })
            .send()
            .await
            .map_err(|e| PaymentError::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Notification(format!(
                "resend returned {status}: {body}"
            )));
        }

        tracing::info!(
            to = %notification.to_email,
            template = notification.template.id(),
            "Email sent"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "resend"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use premium_billing::Template;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server: &MockServer) -> ResendNotifier {
        let mut config = ResendConfig::new("re_test");
        config.base_url = server.uri();
        ResendNotifier::new(config).unwrap()
    }

    fn welcome() -> Notification {
        Notification {
            to_email: "maria@example.com".into(),
            to_name: "Maria".into(),
            template: Template::WelcomePremium,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = ResendConfig::new("re_test");
        assert_eq!(config.from, DEFAULT_FROM);
        assert_eq!(config.base_url, "https://api.resend.com");
    }

    #[tokio::test]
    async fn test_send_posts_rendered_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_test"))
            .and(body_partial_json(json!({
                "from": DEFAULT_FROM,
                "to": ["maria@example.com"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "email_1" })))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server).send(&welcome()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_send_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid from"))
            .mount(&server)
            .await;

        let err = notifier(&server).send(&welcome()).await.unwrap_err();
        assert!(matches!(err, PaymentError::Notification(_)));
    }
}
