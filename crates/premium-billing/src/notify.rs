//! Transactional Email
//!
//! The reconciler only describes *what* to send; a `Notifier` delivers it.
//! Delivery is best effort: callers log failures and move on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

const WELCOME_HTML: &str = include_str!("../templates/welcome_premium.html");
const CANCELLATION_HTML: &str = include_str!("../templates/cancellation_premium.html");

/// Shown when Stripe did not report when the paid period ends
pub const UNKNOWN_END_DATE: &str = "o fim do período atual";

/// Email templates
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Template {
    WelcomePremium,
    Cancellation { period_end: Option<DateTime<Utc>> },
}

impl Template {
    pub fn id(&self) -> &'static str {
        match self {
            Template::WelcomePremium => "welcome_premium",
            Template::Cancellation { .. } => "cancellation_premium",
        }
    }
}

/// A message addressed to one user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub to_email: String,
    pub to_name: String,
    pub template: Template,
}

/// Subject and body ready for an email API
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

impl Notification {
    pub fn render(&self) -> RenderedEmail {
        let name = escape_html(&self.to_name);
        match &self.template {
            Template::WelcomePremium => RenderedEmail {
                subject: format!("✨ Bem-vindo ao LottoMestre Premium, {}!", self.to_name),
                html: WELCOME_HTML.replace("{{name}}", &name),
            },
            Template::Cancellation { period_end } => {
                let end_date = period_end.map_or_else(
                    || UNKNOWN_END_DATE.to_string(),
                    |d| d.format("%d/%m/%Y").to_string(),
                );
                RenderedEmail {
                    subject: "Sua assinatura LottoMestre Premium foi cancelada".into(),
                    html: CANCELLATION_HTML
                        .replace("{{name}}", &name)
                        .replace("{{end_date}}", &end_date),
                }
            }
        }
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Notification sink trait
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;

    fn name(&self) -> &str;
}

/// Logs instead of sending (email not configured)
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            to = %notification.to_email,
            template = notification.template.id(),
            "Email disabled - notification dropped"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(template: Template) -> Notification {
        Notification {
            to_email: "maria@example.com".into(),
            to_name: "Maria <3".into(),
            template,
        }
    }

    #[test]
    fn test_welcome_substitutes_escaped_name() {
        let email = notification(Template::WelcomePremium).render();
        assert!(email.html.contains("Olá Maria &lt;3,"));
        assert_eq!(email.subject, "✨ Bem-vindo ao LottoMestre Premium, Maria <3!");
        assert!(!email.html.contains("{{name}}"));
    }

    #[test]
    fn test_cancellation_formats_end_date() {
        let end = DateTime::from_timestamp(1_714_000_000, 0);
        let email = notification(Template::Cancellation { period_end: end }).render();
        assert!(email.html.contains("até 24/04/2024"));
        assert_eq!(email.subject, "Sua assinatura LottoMestre Premium foi cancelada");
    }

    #[test]
    fn test_cancellation_without_date_uses_placeholder() {
        let email = notification(Template::Cancellation { period_end: None }).render();
        assert!(email.html.contains(UNKNOWN_END_DATE));
        assert!(!email.html.contains("{{end_date}}"));
    }
}
