// Webhook delivery of packet and state-change events.
//
// Every post is fire-and-forget from the caller's perspective: errors are
// logged by the posting thread and never propagated into the tracker.

use std::time::Duration;

use crate::error::WgwatchError;
use crate::packet::PacketSummary;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn state_message(id: &str, endpoint: &str, state: &str) -> String {
    format!("Connection {id} on endpoint {endpoint} is {state}")
}

fn packet_message(summary: &PacketSummary) -> String {
    format!(
        "{}\nReceived packet\n{}\n{}{{{}}} {}\n",
        summary.time.format("%Y-%m-%d %H:%M:%S UTC"),
        summary.protocol,
        summary.l5_proto,
        summary.remote_addr(),
        summary.destination(),
    )
}

/// Report a captured packet (the first-packet-of-a-burst notification).
pub fn post_packet(webhook_url: &str, summary: &PacketSummary) -> Result<(), WgwatchError> {
    log::info!("packet received: {summary:?}");
    if webhook_url.is_empty() {
        return Ok(());
    }

    post(webhook_url, &packet_message(summary))
}

/// Report a peer connection state change.
pub fn post_state(
    webhook_url: &str,
    endpoint: &str,
    id: &str,
    state: &str,
) -> Result<(), WgwatchError> {
    log::info!("client state change: endpoint={endpoint} id={id} state={state}");
    if webhook_url.is_empty() {
        return Ok(());
    }

    post(webhook_url, &state_message(id, endpoint, state))
}

/// POST `content` as a form-encoded body to the webhook URL.
pub fn post(webhook_url: &str, content: &str) -> Result<(), WgwatchError> {
    log::info!("webhook post: webhook={webhook_url} content={content}");

    let client = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent("")
        .build()?;

    let response = client
        .post(webhook_url)
        .form(&[("content", content)])
        .send()?;

    let status = response.status();
    if !status.is_success() {
        return Err(WgwatchError::WebhookStatus(status.as_u16()));
    }

    Ok(())
}
