use anyhow::Result;
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use uuid::Uuid;

/// Outbound notification seam. Implementations deliver however they like
/// (push, queue, nothing); callers fire after a successful mutation and log
/// failures without failing the request.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn order_claimed(&self, order_id: Uuid, client_id: Uuid) -> Result<()>;

    async fn plan_uploaded(&self, order_id: Uuid, client_id: Uuid) -> Result<()>;

    async fn message_posted(&self, order_id: Uuid, sender_id: Uuid) -> Result<()>;
}

/// Default production implementation: structured log lines only. Real
/// delivery channels hang off these events in the surrounding deployment.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn order_claimed(&self, order_id: Uuid, client_id: Uuid) -> Result<()> {
        tracing::info!(%order_id, %client_id, "notify: order claimed");
        Ok(())
    }

    async fn plan_uploaded(&self, order_id: Uuid, client_id: Uuid) -> Result<()> {
        tracing::info!(%order_id, %client_id, "notify: plan uploaded");
        Ok(())
    }

    async fn message_posted(&self, order_id: Uuid, sender_id: Uuid) -> Result<()> {
        tracing::info!(%order_id, %sender_id, "notify: message posted");
        Ok(())
    }
}

/// Deep link that opens a WhatsApp conversation with `phone` and a prefilled
/// message. `phone` is expected in international format without `+`.
pub fn whatsapp_link(phone: &str, text: &str) -> String {
    let phone: String = phone.chars().filter(|ch| ch.is_ascii_digit()).collect();
    let encoded = utf8_percent_encode(text, NON_ALPHANUMERIC);
    format!("https://wa.me/{phone}?text={encoded}")
}
