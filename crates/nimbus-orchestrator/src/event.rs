use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported inbound `EventKind` values.
pub enum EventKind {
    Text,
    Voice,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One inbound transport event, already tagged by the transport layer.
pub struct InboundEvent {
    pub sender_id: String,
    pub kind: EventKind,
    pub body: String,
    pub caption: Option<String>,
    pub media: Vec<u8>,
}

impl InboundEvent {
    pub fn text(sender_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            kind: EventKind::Text,
            body: body.into(),
            caption: None,
            media: Vec::new(),
        }
    }

    pub fn voice(sender_id: impl Into<String>, media: Vec<u8>) -> Self {
        Self {
            sender_id: sender_id.into(),
            kind: EventKind::Voice,
            body: String::new(),
            caption: None,
            media,
        }
    }

    pub fn image(
        sender_id: impl Into<String>,
        media: Vec<u8>,
        caption: Option<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            kind: EventKind::Image,
            body: String::new(),
            caption,
            media,
        }
    }
}

#[async_trait]
/// Outbound side of the transport: delivers one reply to one user.
pub trait ReplySink: Send + Sync {
    async fn send_reply(&self, sender_id: &str, text: &str) -> anyhow::Result<()>;
}
