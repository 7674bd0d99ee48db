//! Outbound SMS and WhatsApp notifications
//!
//! Channels are independent: each one is sent concurrently and a failure
//! on one never blocks the other.

use crate::AlertError;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Free Mobile SMS API credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeMobileConfig {
    pub user: String,
    pub pass: String,
    #[serde(default = "default_free_mobile_endpoint")]
    pub endpoint: String,
}

fn default_free_mobile_endpoint() -> String {
    "https://smsapi.free-mobile.fr/sendmsg".to_string()
}

/// Twilio WhatsApp credentials; numbers without the `whatsapp:` prefix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
    pub to: String,
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}

/// Notification channels; a missing section disables that channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub sms: Option<FreeMobileConfig>,
    pub whatsapp: Option<TwilioConfig>,
    /// Per-request timeout (milliseconds)
    pub timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            sms: None,
            whatsapp: None,
            timeout_ms: 10_000,
        }
    }
}

/// What the notification is about
#[derive(Debug, Clone)]
pub struct AlertNotice {
    pub slot: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl AlertNotice {
    pub fn sms_text(&self) -> String {
        format!("FALL DETECTED camera {}", self.slot)
    }

    pub fn chat_text(&self) -> String {
        match self.timestamp {
            Some(ts) => format!(
                "Alert: fall detected on camera {} at {}",
                self.slot,
                ts.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            None => format!("Alert: fall detected on camera {}", self.slot),
        }
    }
}

/// Result of one channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelResult {
    Sent,
    Failed(String),
    Disabled,
}

impl ChannelResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, ChannelResult::Sent)
    }

    fn from_result(channel: &str, result: Result<(), AlertError>) -> Self {
        match result {
            Ok(()) => {
                info!("{} notification sent", channel);
                ChannelResult::Sent
            }
            Err(e) => {
                warn!("{} notification failed: {}", channel, e);
                metrics::counter!("fallwatch_notifications_failed_total", "channel" => channel.to_string())
                    .increment(1);
                ChannelResult::Failed(e.to_string())
            }
        }
    }
}

/// Per-channel outcome of a broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationReport {
    pub sms: ChannelResult,
    pub whatsapp: ChannelResult,
}

/// Configured notification channels
pub struct Notifiers {
    client: Client,
    config: NotifierConfig,
}

impl Notifiers {
    pub fn new(config: NotifierConfig) -> Result<Self, AlertError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AlertError::Config(e.to_string()))?;

        info!(
            "Notifiers: sms {}, whatsapp {}",
            if config.sms.is_some() { "on" } else { "off" },
            if config.whatsapp.is_some() { "on" } else { "off" }
        );
        Ok(Self { client, config })
    }

    /// Send on every enabled channel at once
    pub async fn broadcast(&self, notice: &AlertNotice) -> NotificationReport {
        let sms = async {
            match &self.config.sms {
                Some(sms) => ChannelResult::from_result("sms", self.send_sms(sms, notice).await),
                None => ChannelResult::Disabled,
            }
        };
        let whatsapp = async {
            match &self.config.whatsapp {
                Some(twilio) => {
                    ChannelResult::from_result("whatsapp", self.send_whatsapp(twilio, notice).await)
                }
                None => ChannelResult::Disabled,
            }
        };

        let (sms, whatsapp) = tokio::join!(sms, whatsapp);
        NotificationReport { sms, whatsapp }
    }

    async fn send_sms(&self, sms: &FreeMobileConfig, notice: &AlertNotice) -> Result<(), AlertError> {
        let text = notice.sms_text();
        debug!("Sending SMS: {}", text);

        let response = self
            .client
            .get(&sms.endpoint)
            .query(&[("user", sms.user.as_str()), ("pass", sms.pass.as_str()), ("msg", text.as_str())])
            .send()
            .await
            .map_err(|e| AlertError::Transport(e.to_string()))?;

        check_status(response).await
    }

    async fn send_whatsapp(&self, twilio: &TwilioConfig, notice: &AlertNotice) -> Result<(), AlertError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            twilio.api_base.trim_end_matches('/'),
            twilio.account_sid
        );
        let from = format!("whatsapp:{}", twilio.from);
        let to = format!("whatsapp:{}", twilio.to);
        let body = notice.chat_text();

        let response = self
            .client
            .post(url)
            .basic_auth(&twilio.account_sid, Some(&twilio.auth_token))
            .form(&[("From", from.as_str()), ("To", to.as_str()), ("Body", body.as_str())])
            .send()
            .await
            .map_err(|e| AlertError::Transport(e.to_string()))?;

        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), AlertError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(AlertError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::reply_once;

    fn notice() -> AlertNotice {
        AlertNotice {
            slot: "2".to_string(),
            timestamp: None,
        }
    }

    #[test]
    fn test_message_texts() {
        assert_eq!(notice().sms_text(), "FALL DETECTED camera 2");
        assert_eq!(notice().chat_text(), "Alert: fall detected on camera 2");
    }

    #[tokio::test]
    async fn test_all_channels_disabled() {
        let notifiers = Notifiers::new(NotifierConfig::default()).unwrap();
        let report = notifiers.broadcast(&notice()).await;
        assert_eq!(report.sms, ChannelResult::Disabled);
        assert_eq!(report.whatsapp, ChannelResult::Disabled);
    }

    #[tokio::test]
    async fn test_sms_sent_as_query() {
        let (base, server) = reply_once("HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        let notifiers = Notifiers::new(NotifierConfig {
            sms: Some(FreeMobileConfig {
                user: "12345678".to_string(),
                pass: "secret".to_string(),
                endpoint: format!("{}/sendmsg", base),
            }),
            ..Default::default()
        })
        .unwrap();

        let report = notifiers.broadcast(&notice()).await;
        assert!(report.sms.is_sent());
        assert_eq!(report.whatsapp, ChannelResult::Disabled);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /sendmsg?user=12345678&pass=secret&msg=FALL"));
    }

    #[tokio::test]
    async fn test_sms_failure_does_not_block_whatsapp() {
        let (base, server) = reply_once(
            "HTTP/1.1 201 Created\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}",
        )
        .await;
        let notifiers = Notifiers::new(NotifierConfig {
            sms: Some(FreeMobileConfig {
                user: "u".to_string(),
                pass: "p".to_string(),
                endpoint: "http://127.0.0.1:9/sendmsg".to_string(),
            }),
            whatsapp: Some(TwilioConfig {
                account_sid: "AC123".to_string(),
                auth_token: "token".to_string(),
                from: "+14155238886".to_string(),
                to: "+33600000000".to_string(),
                api_base: base,
            }),
            timeout_ms: 2000,
        })
        .unwrap();

        let report = notifiers.broadcast(&notice()).await;
        assert!(matches!(report.sms, ChannelResult::Failed(_)));
        assert!(report.whatsapp.is_sent());

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /2010-04-01/Accounts/AC123/Messages.json"));
        assert!(request.to_lowercase().contains("authorization: basic"));
    }

    #[tokio::test]
    async fn test_rejected_status_is_failure() {
        let (base, _server) = reply_once(
            "HTTP/1.1 402 Payment Required\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let notifiers = Notifiers::new(NotifierConfig {
            sms: Some(FreeMobileConfig {
                user: "u".to_string(),
                pass: "p".to_string(),
                endpoint: format!("{}/sendmsg", base),
            }),
            ..Default::default()
        })
        .unwrap();

        let report = notifiers.broadcast(&notice()).await;
        assert!(matches!(report.sms, ChannelResult::Failed(_)));
    }
}
