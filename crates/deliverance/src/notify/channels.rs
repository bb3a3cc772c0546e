//! Remote message channels.

use anyhow::Context;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

/// A destination for operator messages. Sends may run on any thread.
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;
    fn send(&self, message: &str) -> anyhow::Result<()>;
}

#[derive(Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API `sendMessage`.
pub struct Telegram {
    client: Client,
    base_url: String,
    chat_id: String,
}

impl Telegram {
    pub fn new(token: &str, chat_id: &str) -> Self {
        Self::with_base_url(token, chat_id, "https://api.telegram.org")
    }

    pub fn with_base_url(token: &str, chat_id: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: format!("{}/bot{}", base_url.trim_end_matches('/'), token),
            chat_id: chat_id.to_string(),
        }
    }
}

impl Channel for Telegram {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn send(&self, message: &str) -> anyhow::Result<()> {
        log::info!(
            "Sending Telegram message (chat_id: {}, len: {})",
            self.chat_id,
            message.len()
        );
        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });
        let resp: TelegramResponse = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&body)
            .send()
            .context("telegram request failed")?
            .json()
            .context("telegram returned an unreadable response")?;
        if !resp.ok {
            anyhow::bail!(
                "telegram sendMessage failed: {}",
                resp.description.unwrap_or_default()
            );
        }
        Ok(())
    }
}

/// Twilio SMS via the Messages resource.
pub struct Twilio {
    client: Client,
    url: String,
    sid: String,
    token: String,
    from_num: String,
    to_num: String,
}

impl Twilio {
    pub fn new(sid: &str, token: &str, from_num: &str, to_num: &str) -> Self {
        Self {
            client: Client::new(),
            url: format!("https://api.twilio.com/2010-04-01/Accounts/{sid}/Messages.json"),
            sid: sid.to_string(),
            token: token.to_string(),
            from_num: from_num.to_string(),
            to_num: to_num.to_string(),
        }
    }
}

impl Channel for Twilio {
    fn name(&self) -> &'static str {
        "sms"
    }

    fn send(&self, message: &str) -> anyhow::Result<()> {
        log::info!("Sending SMS (num: {}, len: {})", self.to_num, message.len());
        let resp = self
            .client
            .post(&self.url)
            .basic_auth(&self.sid, Some(&self.token))
            .form(&[
                ("Body", message),
                ("From", self.from_num.as_str()),
                ("To", self.to_num.as_str()),
            ])
            .send()
            .context("twilio request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            anyhow::bail!("twilio returned {}: {}", status, text);
        }
        Ok(())
    }
}
