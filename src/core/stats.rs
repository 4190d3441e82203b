//! Store-wide statistics for the admin dashboard.

use crate::{
    core::money,
    entities::{Deposit, DepositStatus, Good, User, deposit, good, user},
    errors::Result,
};
use rust_decimal::Decimal;
use sea_orm::{PaginatorTrait, QuerySelect, prelude::*};
use std::fmt::Write;

/// Snapshot of the store's headline numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Registered users
    pub total_users: u64,
    /// Users registered since midnight UTC
    pub new_users_today: u64,
    /// Sum of approved deposits
    pub approved_income: Decimal,
    /// Goods sold
    pub goods_sold: u64,
    /// Goods known to the store, sold or not
    pub total_goods: u64,
}

/// Collects the current statistics.
///
/// # Errors
/// Returns an error if any of the aggregate queries fail.
pub async fn collect_stats(db: &DatabaseConnection) -> Result<StoreStats> {
    let total_users = User::find().count(db).await?;

    let midnight = chrono::Utc::now()
        .date_naive()
        .and_time(chrono::NaiveTime::MIN)
        .and_utc();
    let new_users_today = User::find()
        .filter(user::Column::RegisteredAt.gte(midnight))
        .count(db)
        .await?;

    let income_cents: Option<Option<i64>> = Deposit::find()
        .select_only()
        .column_as(deposit::Column::AmountCents.sum(), "total")
        .filter(deposit::Column::Status.eq(DepositStatus::Approved))
        .into_tuple()
        .one(db)
        .await?;

    let goods_sold = Good::find()
        .filter(good::Column::IsSold.eq(true))
        .count(db)
        .await?;
    let total_goods = Good::find().count(db).await?;

    Ok(StoreStats {
        total_users,
        new_users_today,
        approved_income: money::from_cents(income_cents.flatten().unwrap_or(0)),
        goods_sold,
        total_goods,
    })
}

/// Renders statistics for the admin.
pub fn format_stats(stats: &StoreStats) -> Result<String> {
    let mut text = String::new();
    writeln!(text, "**📊 Bot Statistics**\n")?;
    writeln!(text, "👥 **Total Users:** `{}`", stats.total_users)?;
    writeln!(text, "✨ **New Users Today:** `{}`", stats.new_users_today)?;
    writeln!(text, "---")?;
    writeln!(
        text,
        "💰 **Total Approved Income:** `${:.2}`",
        stats.approved_income
    )?;
    writeln!(text, "---")?;
    writeln!(text, "🛒 **Accounts Sold:** `{}`", stats.goods_sold)?;
    write!(text, "📦 **Total Accounts in DB:** `{}`", stats.total_goods)?;
    Ok(text)
}
