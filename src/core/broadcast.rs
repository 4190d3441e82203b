//! Broadcast dispatcher - one admin message copied to a computed audience.
//!
//! The audience is resolved once into a snapshot of user ids, shown to the admin for
//! confirmation, and then walked sequentially with a fixed pause between sends. A recipient
//! that cannot be reached is counted and skipped.

use crate::{
    core::{inventory, users},
    errors::Result,
    gateway::{ChatId, MessageRef, MessagingGateway},
};
use sea_orm::DatabaseConnection;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// Who receives a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every registered user
    All,
    /// Explicit ids; unknown ids are dropped
    Users(Vec<i64>),
    /// Users who bought from a category
    CategoryBuyers(i64),
}

/// Totals of a finished broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients reached
    pub sent: u64,
    /// Recipients that failed
    pub failed: u64,
    /// Wall time of the fan-out
    pub duration: Duration,
}

impl BroadcastReport {
    /// Summary shown to the admin.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "✅ **Broadcast Complete!**\n\n- Sent: {}\n- Failed: {}\n- Duration: {:.1}s",
            self.sent,
            self.failed,
            self.duration.as_secs_f64()
        )
    }
}

/// Resolves an audience into a snapshot of recipient ids.
pub async fn resolve_audience(db: &DatabaseConnection, audience: &Audience) -> Result<Vec<i64>> {
    match audience {
        Audience::All => users::all_user_ids(db).await,
        Audience::Users(ids) => users::existing_user_ids(db, ids).await,
        Audience::CategoryBuyers(category_id) => inventory::category_buyers(db, *category_id).await,
    }
}

/// Parses a whitespace or comma separated list of user ids, skipping anything non-numeric.
#[must_use]
pub fn parse_recipient_ids(input: &str) -> Vec<i64> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

/// Copies `source` to every recipient, pausing `delay` between sends.
#[instrument(skip(gateway, recipients), fields(recipients = recipients.len()))]
pub async fn broadcast(
    gateway: &dyn MessagingGateway,
    source: MessageRef,
    recipients: &[i64],
    delay: Duration,
) -> BroadcastReport {
    let started = Instant::now();
    let mut sent = 0;
    let mut failed = 0;

    for (index, recipient) in recipients.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match gateway
            .copy_message(ChatId::User(recipient.unsigned_abs()), source)
            .await
        {
            Ok(_) => sent += 1,
            Err(e) => {
                failed += 1;
                warn!("Broadcast to {} failed: {}", recipient, e);
            }
        }
    }

    let report = BroadcastReport {
        sent,
        failed,
        duration: started.elapsed(),
    };
    info!(
        "Broadcast finished: {} sent, {} failed in {:?}",
        report.sent, report.failed, report.duration
    );
    report
}
