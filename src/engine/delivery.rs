//! Scheduled broadcast delivery engine.
//!
//! One polling pass fetches due messages, resolves the audience, fans the
//! payload out to every recipient concurrently, and commits a terminal
//! status exactly once per message. Per-recipient failures are captured in
//! the delivery report and never fail the message; only payload construction
//! does.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::gateway::MessagingGateway;
use crate::engine::targeting::resolve_recipients;
use crate::error::AppError;
use crate::models::broadcast::{
    BroadcastMessage, BroadcastStatus, DeliveryFailure, DeliveryReport, MessagePayload, MsgType,
    TargetDescriptor,
};
use crate::state::AppState;

#[derive(Debug, Default)]
pub struct PassSummary {
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    pub reports: Vec<(Uuid, DeliveryReport)>,
}

pub async fn run_delivery_engine(
    state: Arc<AppState>,
    gateway: Arc<dyn MessagingGateway>,
    poll_interval: Duration,
) {
    info!("broadcast delivery engine started");

    let mut ticker = interval(poll_interval);
    loop {
        ticker.tick().await;

        let start = Instant::now();
        let summary = process_due(&state, gateway.as_ref(), Utc::now()).await;
        state
            .metrics
            .delivery_pass_seconds
            .observe(start.elapsed().as_secs_f64());

        if summary.processed > 0 {
            info!(
                processed = summary.processed,
                sent = summary.sent,
                failed = summary.failed,
                "broadcast pass complete"
            );
        }
    }
}

/// One polling pass. Messages are processed sequentially; recipients within
/// a message are delivered concurrently.
pub async fn process_due(
    state: &AppState,
    gateway: &dyn MessagingGateway,
    now: DateTime<Utc>,
) -> PassSummary {
    let due = fetch_due(state, now, state.broadcast_batch_size);
    let mut summary = PassSummary::default();

    for message in due {
        if !claim(state, message.id) {
            continue;
        }
        let (status, report) = process_message(state, gateway, &message, now).await;
        let transitioned = mark_terminal(state, message.id, status);
        release(state, message.id);

        if !transitioned {
            warn!(
                broadcast_id = %message.id,
                "broadcast already finalized; dropping status write"
            );
            continue;
        }

        state.metrics.broadcasts_in_queue.dec();
        summary.processed += 1;
        let outcome = if status == BroadcastStatus::Sent {
            summary.sent += 1;
            "sent"
        } else {
            summary.failed += 1;
            "failed"
        };
        state
            .metrics
            .broadcasts_total
            .with_label_values(&[outcome])
            .inc();
        state
            .metrics
            .broadcast_recipients_total
            .with_label_values(&["ok"])
            .inc_by(report.succeeded.len() as u64);
        state
            .metrics
            .broadcast_recipients_total
            .with_label_values(&["err"])
            .inc_by(report.failed.len() as u64);

        info!(
            broadcast_id = %message.id,
            target = %message.target,
            outcome,
            delivered = report.succeeded.len(),
            undeliverable = report.failed.len(),
            "broadcast processed"
        );
        summary.reports.push((message.id, report));
    }

    summary
}

/// Due = still scheduled and past its scheduled time, oldest first, capped.
fn fetch_due(state: &AppState, now: DateTime<Utc>, limit: usize) -> Vec<BroadcastMessage> {
    let mut due: Vec<BroadcastMessage> = state
        .broadcasts
        .iter()
        .filter(|entry| entry.status == BroadcastStatus::Scheduled && entry.scheduled_at <= now)
        .map(|entry| entry.value().clone())
        .collect();
    due.sort_by_key(|message| message.scheduled_at);
    due.truncate(limit);
    due
}

/// Claim a message before processing so overlapping passes cannot double-send
/// it. A claim that loses the race (already in flight, or already finalized)
/// is skipped silently.
fn claim(state: &AppState, id: Uuid) -> bool {
    if !state.in_flight_broadcasts.insert(id) {
        return false;
    }
    let still_scheduled = state
        .broadcasts
        .get(&id)
        .map(|message| message.status == BroadcastStatus::Scheduled)
        .unwrap_or(false);
    if !still_scheduled {
        state.in_flight_broadcasts.remove(&id);
    }
    still_scheduled
}

fn release(state: &AppState, id: Uuid) {
    state.in_flight_broadcasts.remove(&id);
}

/// Conditional terminal transition: only a `scheduled` message may move to
/// `sent` or `failed`, and only once.
fn mark_terminal(state: &AppState, id: Uuid, status: BroadcastStatus) -> bool {
    let Some(mut message) = state.broadcasts.get_mut(&id) else {
        return false;
    };
    if message.status != BroadcastStatus::Scheduled {
        return false;
    }
    message.status = status;
    message.updated_at = Utc::now();
    true
}

async fn process_message(
    state: &AppState,
    gateway: &dyn MessagingGateway,
    message: &BroadcastMessage,
    now: DateTime<Utc>,
) -> (BroadcastStatus, DeliveryReport) {
    let descriptor = TargetDescriptor::parse(&message.target);
    let recipients = resolve_recipients(state, &descriptor, now);

    // An empty audience is a successful no-op, not a failure.
    if recipients.is_empty() {
        info!(
            broadcast_id = %message.id,
            target = %message.target,
            "no recipients for broadcast"
        );
        return (BroadcastStatus::Sent, DeliveryReport::default());
    }

    let payload = match build_payload(message) {
        Ok(payload) => payload,
        Err(err) => {
            error!(
                broadcast_id = %message.id,
                error = %err,
                "broadcast payload construction failed"
            );
            return (BroadcastStatus::Failed, DeliveryReport::default());
        }
    };

    let report = deliver_to_all(gateway, &recipients, &payload).await;
    (BroadcastStatus::Sent, report)
}

/// Build the outbound payload for a message. Flex content is parsed here;
/// a parse failure is the one hard stop that fails the message.
pub fn build_payload(message: &BroadcastMessage) -> Result<MessagePayload, AppError> {
    match message.msg_type {
        MsgType::Text => {
            let text = message
                .message
                .clone()
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| "Message".to_string());
            Ok(MessagePayload::Text { text })
        }
        MsgType::Image => {
            let url = message
                .image_url
                .clone()
                .filter(|url| !url.is_empty())
                .ok_or_else(|| AppError::BadRequest("image broadcast without image_url".to_string()))?;
            Ok(MessagePayload::Image {
                original_content_url: url.clone(),
                preview_image_url: url,
            })
        }
        MsgType::Flex => {
            let raw = message
                .flex_json
                .as_deref()
                .ok_or_else(|| AppError::BadRequest("flex broadcast without flex_json".to_string()))?;
            let contents: serde_json::Value = serde_json::from_str(raw)
                .map_err(|err| AppError::BadRequest(format!("invalid flex json: {err}")))?;
            Ok(MessagePayload::Flex {
                alt_text: "Notification".to_string(),
                contents,
            })
        }
    }
}

/// Settle-all fan-out: every recipient is attempted, results are captured,
/// one failure never cancels the rest.
async fn deliver_to_all(
    gateway: &dyn MessagingGateway,
    recipients: &[String],
    payload: &MessagePayload,
) -> DeliveryReport {
    let sends = recipients.iter().map(|recipient| async move {
        let result = gateway.send_to_recipient(recipient, payload).await;
        (recipient.clone(), result)
    });

    let mut report = DeliveryReport::default();
    for (recipient, result) in join_all(sends).await {
        match result {
            Ok(()) => report.succeeded.push(recipient),
            Err(err) => {
                warn!(recipient = %recipient, error = %err, "recipient delivery failed");
                report.failed.push(DeliveryFailure {
                    recipient_id: recipient,
                    error: err.to_string(),
                });
            }
        }
    }
    report
}
