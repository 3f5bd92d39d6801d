//! Verification code delivery.
//!
//! Delivery never fails from the caller's point of view: if the relay is
//! missing or broken the code is logged for the operator instead.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn deliver(&self, email: &str, code: &str);
}

/// Logs codes for the operator. Used when no mail relay is configured and
/// as the fallback when the relay fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleDelivery;

impl ConsoleDelivery {
    fn announce(email: &str, code: &str) {
        info!(
            target: "chatd::verification",
            email,
            code,
            "verification code (console delivery)"
        );
    }
}

#[async_trait]
impl CodeDelivery for ConsoleDelivery {
    async fn deliver(&self, email: &str, code: &str) {
        Self::announce(email, code);
    }
}

#[derive(Debug, Serialize)]
struct RelayMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: String,
}

/// POSTs a mail request to an HTTP mail relay.
pub struct RelayDelivery {
    client: reqwest::Client,
    url: String,
    from: String,
}

impl RelayDelivery {
    pub fn new(url: impl Into<String>, from: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!("mail relay client build failed, using defaults: {e}");
                reqwest::Client::new()
            });
        Self {
            client,
            url: url.into(),
            from: from.into(),
        }
    }

    async fn post(&self, email: &str, code: &str) -> Result<(), reqwest::Error> {
        let mail = RelayMail {
            from: &self.from,
            to: email,
            subject: "Chat verification code",
            body: format!("Your verification code is: {code}"),
        };
        self.client
            .post(&self.url)
            .json(&mail)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl CodeDelivery for RelayDelivery {
    async fn deliver(&self, email: &str, code: &str) {
        match self.post(email, code).await {
            Ok(()) => info!(email, "verification code sent via mail relay"),
            Err(e) => {
                warn!(email, "mail relay failed, falling back to console: {e}");
                ConsoleDelivery::announce(email, code);
            }
        }
    }
}
