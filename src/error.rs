#[derive(Debug, thiserror::Error)]
pub enum WgwatchError {
    #[error("{0}")]
    InsufficientPermission(String),
    #[error("capture device error: {0}")]
    Capture(String),
    #[error("netlink error: {0}")]
    Netlink(String),
    #[error("wireguard snapshot error: {0}")]
    Snapshot(String),
    #[error("webhook transport error: {0}")]
    Webhook(#[from] reqwest::Error),
    #[error("webhook returned status {0}")]
    WebhookStatus(u16),
    #[error("fatal: {0}")]
    Fatal(String),
}
