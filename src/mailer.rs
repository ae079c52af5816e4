use std::sync::{Arc, Mutex};

use serde::Serialize;

// 1. Mailer Contract
/// Mailer
///
/// Outbound delivery of confirmation codes. Dispatch is fire-and-forget: the signup
/// handler never waits on delivery and never fails because of it.
pub trait Mailer: Send + Sync {
    /// Queues a message carrying `code` to `to`.
    fn send_confirmation_code(&self, to: &str, code: &str);
}

/// OutgoingMail
///
/// The message as handed to a transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

impl OutgoingMail {
    pub fn confirmation(from: &str, to: &str, code: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: "Your confirmation code".to_string(),
            text: format!(
                "Use this confirmation code to obtain an access token: {code}"
            ),
        }
    }
}

// 2. The Real Implementation (HTTP mail relay)
/// HttpMailer
///
/// Posts each message as JSON to a mail relay. The request runs on a spawned task,
/// so it must be used from inside a tokio runtime.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
    from: String,
}

impl HttpMailer {
    pub fn new(relay_url: &str, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url: relay_url.to_string(),
            from: from.to_string(),
        }
    }
}

impl Mailer for HttpMailer {
    fn send_confirmation_code(&self, to: &str, code: &str) {
        let mail = OutgoingMail::confirmation(&self.from, to, code);
        let client = self.client.clone();
        let url = self.relay_url.clone();

        tokio::spawn(async move {
            match client.post(&url).json(&mail).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(to = %mail.to, "confirmation mail relayed");
                }
                Ok(resp) => {
                    tracing::warn!(to = %mail.to, status = %resp.status(), "mail relay refused message");
                }
                Err(e) => {
                    tracing::warn!(to = %mail.to, error = %e, "mail relay unreachable");
                }
            }
        });
    }
}

// 3. Local Implementation
/// LogMailer
///
/// Writes the message to the log instead of sending it. Used by local runs without a
/// relay so the code can be read from the console.
#[derive(Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: &str) -> Self {
        Self {
            from: from.to_string(),
        }
    }
}

impl Mailer for LogMailer {
    fn send_confirmation_code(&self, to: &str, code: &str) {
        let mail = OutgoingMail::confirmation(&self.from, to, code);
        tracing::info!(from = %mail.from, to = %mail.to, subject = %mail.subject, "{}", mail.text);
    }
}

// 4. The Mock Implementation (For Tests)
/// MockMailer
///
/// Records every message in memory so tests can read back the code that was "mailed".
#[derive(Clone, Default)]
pub struct MockMailer {
    outbox: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(to, code)` pairs sent so far, oldest first.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The most recent code sent to `to`.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|(addr, _)| addr == to)
            .map(|(_, code)| code)
    }
}

impl Mailer for MockMailer {
    fn send_confirmation_code(&self, to: &str, code: &str) {
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((to.to_string(), code.to_string()));
    }
}

/// MailerState
///
/// The concrete type used to share the mailer across the application state.
pub type MailerState = Arc<dyn Mailer>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_mailer_returns_latest_code_per_address() {
        let mailer = MockMailer::new();
        mailer.send_confirmation_code("a@x.com", "first");
        mailer.send_confirmation_code("b@x.com", "other");
        mailer.send_confirmation_code("a@x.com", "second");

        assert_eq!(mailer.last_code_for("a@x.com").as_deref(), Some("second"));
        assert_eq!(mailer.last_code_for("b@x.com").as_deref(), Some("other"));
        assert_eq!(mailer.last_code_for("c@x.com"), None);
        assert_eq!(mailer.sent().len(), 3);
    }

    #[test]
    fn confirmation_mail_embeds_code() {
        let mail = OutgoingMail::confirmation("noreply@x.com", "bob@x.com", "XYZ");
        assert_eq!(mail.to, "bob@x.com");
        assert!(mail.text.contains("XYZ"));
    }
}
