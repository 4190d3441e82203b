//! Inventory business logic - categories, goods, and reconciliation with the stock directory.
//!
//! The record store is the system of record for sold status, the stock directory for
//! existence. `categories.stock_count` is a cache of unsold goods refreshed by
//! [`resynchronize`] and by [`reserve_and_remove`].

use crate::{
    core::{
        money,
        stock_dir::{self, ScanOutcome, StockDirectory},
    },
    entities::{Category, Good, category, good},
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use sea_orm::{
    QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait, prelude::*, sea_query::Expr,
};
use std::collections::{HashMap, HashSet};
use tracing::{error, info, instrument, warn};

const DELETE_CHUNK: usize = 500;

/// Input for a new category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    /// Country name; must match the stock folder's parsed name
    pub name: String,
    /// Display code such as `+95`
    pub code: String,
    /// Flag emoji; derived from `code` when `None`
    pub flag_emoji: Option<String>,
    /// Unit price
    pub price: Decimal,
}

/// Counts removed by [`delete_category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedCategory {
    /// Sold goods whose records were dropped
    pub sold: u64,
    /// Unsold goods that were dropped
    pub unsold: u64,
}

/// Outcome of a resynchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Goods found on disk and inserted
    pub added: u64,
    /// Unsold goods no longer on disk and removed
    pub removed: u64,
    /// Folders whose parsed country matches no category
    pub unmatched_folders: Vec<String>,
    /// The stock root was missing and has been created
    pub created_root: bool,
}

/// All categories ordered by name.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn list_categories(db: &DatabaseConnection) -> Result<Vec<category::Model>> {
    Category::find()
        .order_by_asc(category::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Active categories that currently have stock, ordered by name.
pub async fn list_available_categories(db: &DatabaseConnection) -> Result<Vec<category::Model>> {
    Category::find()
        .filter(category::Column::IsActive.eq(true))
        .filter(category::Column::StockCount.gt(0))
        .order_by_asc(category::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds a category by id, failing with `NotFound`.
pub async fn get_category<C>(db: &C, category_id: i64) -> Result<category::Model>
where
    C: ConnectionTrait,
{
    Category::find_by_id(category_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "Category",
            key: category_id.to_string(),
        })
}

/// Finds a category by its exact name.
pub async fn get_category_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<category::Model>> {
    Category::find()
        .filter(category::Column::Name.eq(name.trim()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a category by name, failing with `NotFound`.
pub async fn require_category_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Result<category::Model> {
    get_category_by_name(db, name)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "Category",
            key: name.to_string(),
        })
}

/// Unsold goods of a category, ordered by id.
pub async fn list_goods(db: &DatabaseConnection, category_id: i64) -> Result<Vec<good::Model>> {
    Good::find()
        .filter(good::Column::CategoryId.eq(category_id))
        .filter(good::Column::IsSold.eq(false))
        .order_by_asc(good::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Creates a category.
///
/// # Errors
/// Returns an error if:
/// - The name is empty or the price is not a positive two-decimal amount
/// - A category with the same name exists (`AlreadyExists`)
/// - The database insert fails
#[instrument(skip(db))]
pub async fn add_category(db: &DatabaseConnection, new: NewCategory) -> Result<category::Model> {
    let name = new.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::Config {
            message: "Category name cannot be empty".to_string(),
        });
    }
    let price_cents = money::to_positive_cents(new.price)?;

    let code = new.code.trim().to_string();
    let flag_emoji = new
        .flag_emoji
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| stock_dir::flag_emoji(&code));

    let model = category::ActiveModel {
        name: Set(name.clone()),
        code: Set(code),
        flag_emoji: Set(flag_emoji),
        price_cents: Set(price_cents),
        stock_count: Set(0),
        is_active: Set(true),
        ..Default::default()
    };

    match model.insert(db).await {
        Ok(created) => {
            info!("Category '{}' created at {}", created.name, created.price());
            Ok(created)
        }
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(Error::AlreadyExists {
                entity: "Category",
                key: name,
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Changes the unit price of a category.
pub async fn set_category_price(
    db: &DatabaseConnection,
    category_id: i64,
    price: Decimal,
) -> Result<category::Model> {
    let price_cents = money::to_positive_cents(price)?;
    let mut active: category::ActiveModel = get_category(db, category_id).await?.into();
    active.price_cents = Set(price_cents);
    active.update(db).await.map_err(Into::into)
}

/// Deletes a category together with all its goods, sold and unsold.
#[instrument(skip(db))]
pub async fn delete_category(db: &DatabaseConnection, category_id: i64) -> Result<DeletedCategory> {
    let txn = db.begin().await?;
    let category = get_category(&txn, category_id).await?;

    let sold = Good::find()
        .filter(good::Column::CategoryId.eq(category_id))
        .filter(good::Column::IsSold.eq(true))
        .count(&txn)
        .await?;
    let unsold = Good::find()
        .filter(good::Column::CategoryId.eq(category_id))
        .filter(good::Column::IsSold.eq(false))
        .count(&txn)
        .await?;

    Good::delete_many()
        .filter(good::Column::CategoryId.eq(category_id))
        .exec(&txn)
        .await?;
    Category::delete_by_id(category_id).exec(&txn).await?;
    txn.commit().await?;

    info!(
        "Category '{}' deleted with {} unsold and {} sold goods",
        category.name, unsold, sold
    );
    Ok(DeletedCategory { sold, unsold })
}

/// Reconciles the store with the stock directory.
///
/// Inserts goods present on disk but unknown to the store, deletes unsold goods that vanished
/// from disk, and recounts every category. Folders whose parsed country name matches no
/// category are reported and otherwise ignored. Sold goods are never touched, so a purchase
/// running concurrently keeps what it reserved.
#[instrument(skip_all, fields(root = %stock.root().display()))]
pub async fn resynchronize(db: &DatabaseConnection, stock: &StockDirectory) -> Result<SyncReport> {
    let folders = match stock.scan().await? {
        ScanOutcome::CreatedRoot => {
            return Ok(SyncReport {
                created_root: true,
                ..SyncReport::default()
            });
        }
        ScanOutcome::Folders(folders) => folders,
    };

    let categories: HashMap<String, category::Model> = Category::find()
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.name.clone(), c))
        .collect();

    let known_phones: HashSet<String> = Good::find()
        .select_only()
        .column(good::Column::PhoneNumber)
        .into_tuple::<String>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    let mut report = SyncReport::default();
    let mut disk_phones = HashSet::new();

    for folder in folders {
        let Some(category) = categories.get(&folder.parsed.country) else {
            report.unmatched_folders.push(folder.folder_name);
            continue;
        };

        for file in folder.files {
            disk_phones.insert(file.phone_number.clone());
            if known_phones.contains(&file.phone_number) {
                continue;
            }

            let payload = match stock.read(&file.relative_path).await {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Error reading file {}: {}", file.relative_path, e);
                    continue;
                }
            };

            let model = good::ActiveModel {
                category_id: Set(category.id),
                phone_number: Set(file.phone_number.clone()),
                payload: Set(payload),
                source_path: Set(file.relative_path),
                is_sold: Set(false),
                buyer_id: Set(None),
                sold_at: Set(None),
                added_at: Set(chrono::Utc::now()),
                ..Default::default()
            };

            match model.insert(db).await {
                Ok(_) => report.added += 1,
                Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                    warn!("Good {} inserted concurrently, skipping", file.phone_number);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    let unsold: Vec<(i64, String)> = Good::find()
        .select_only()
        .column(good::Column::Id)
        .column(good::Column::PhoneNumber)
        .filter(good::Column::IsSold.eq(false))
        .into_tuple()
        .all(db)
        .await?;

    let stale: Vec<i64> = unsold
        .into_iter()
        .filter(|(_, phone)| !disk_phones.contains(phone))
        .map(|(id, _)| id)
        .collect();

    for chunk in stale.chunks(DELETE_CHUNK) {
        // Re-checks is_sold so a good sold since the listing above survives
        let result = Good::delete_many()
            .filter(good::Column::Id.is_in(chunk.iter().copied()))
            .filter(good::Column::IsSold.eq(false))
            .exec(db)
            .await?;
        report.removed += result.rows_affected;
    }

    refresh_stock_counts(db).await?;

    info!(
        "Synchronization complete: {} added, {} removed, {} unmatched folders",
        report.added,
        report.removed,
        report.unmatched_folders.len()
    );
    Ok(report)
}

/// Recomputes the cached stock count of every category.
pub async fn refresh_stock_counts<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let ids: Vec<i64> = Category::find()
        .select_only()
        .column(category::Column::Id)
        .into_tuple()
        .all(db)
        .await?;

    for id in ids {
        recount_category(db, id).await?;
    }
    Ok(())
}

/// Recomputes and stores the cached stock count of one category.
pub async fn recount_category<C>(db: &C, category_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    let unsold = Good::find()
        .filter(good::Column::CategoryId.eq(category_id))
        .filter(good::Column::IsSold.eq(false))
        .count(db)
        .await?;

    Category::update_many()
        .col_expr(
            category::Column::StockCount,
            Expr::value(i64::try_from(unsold).unwrap_or(i64::MAX)),
        )
        .filter(category::Column::Id.eq(category_id))
        .exec(db)
        .await?;

    Ok(unsold)
}

/// Marks the first `count` unsold goods of a category as sold to `buyer_id`.
///
/// Runs in one transaction: candidates are selected by ascending id and each is claimed with
/// a conditional update on `is_sold = false`. A claim that matches no row lost a race with
/// another buyer or a resync, so the remaining pool is selected again. The category's stock
/// count is recomputed before commit.
///
/// # Errors
/// Returns `InsufficientStock` (and changes nothing) when fewer than `count` goods remain.
#[instrument(skip(db))]
pub async fn reserve_and_remove(
    db: &DatabaseConnection,
    category_id: i64,
    count: u64,
    buyer_id: i64,
) -> Result<Vec<good::Model>> {
    if count == 0 {
        return Err(Error::InvalidQuantity { quantity: count });
    }

    let txn = db.begin().await?;
    get_category(&txn, category_id).await?;

    let mut reserved: Vec<good::Model> = Vec::new();
    let sold_at = chrono::Utc::now();

    while (reserved.len() as u64) < count {
        let needed = count - reserved.len() as u64;
        let candidates = Good::find()
            .filter(good::Column::CategoryId.eq(category_id))
            .filter(good::Column::IsSold.eq(false))
            .order_by_asc(good::Column::Id)
            .limit(needed)
            .all(&txn)
            .await?;

        if (candidates.len() as u64) < needed {
            let available = reserved.len() as u64 + candidates.len() as u64;
            txn.rollback().await?;
            return Err(Error::InsufficientStock {
                available,
                requested: count,
            });
        }

        for candidate in candidates {
            let claimed = Good::update_many()
                .col_expr(good::Column::IsSold, Expr::value(true))
                .col_expr(good::Column::BuyerId, Expr::value(buyer_id))
                .col_expr(good::Column::SoldAt, Expr::value(sold_at))
                .filter(good::Column::Id.eq(candidate.id))
                .filter(good::Column::IsSold.eq(false))
                .exec(&txn)
                .await?;

            if claimed.rows_affected == 1 {
                reserved.push(good::Model {
                    is_sold: true,
                    buyer_id: Some(buyer_id),
                    sold_at: Some(sold_at),
                    ..candidate
                });
            } else {
                warn!("Good {} was taken concurrently, re-selecting", candidate.id);
            }
        }
    }

    recount_category(&txn, category_id).await?;
    txn.commit().await?;

    info!(
        "Reserved {} goods of category {} for user {}",
        reserved.len(),
        category_id,
        buyer_id
    );
    Ok(reserved)
}

/// Distinct users who bought at least one good of a category.
pub async fn category_buyers(db: &DatabaseConnection, category_id: i64) -> Result<Vec<i64>> {
    let buyers: Vec<Option<i64>> = Good::find()
        .select_only()
        .column(good::Column::BuyerId)
        .filter(good::Column::CategoryId.eq(category_id))
        .filter(good::Column::IsSold.eq(true))
        .distinct()
        .order_by_asc(good::Column::BuyerId)
        .into_tuple()
        .all(db)
        .await?;
    Ok(buyers.into_iter().flatten().collect())
}

/// Categories with at least one sold good, ordered by name.
pub async fn categories_with_sales(db: &DatabaseConnection) -> Result<Vec<category::Model>> {
    let sold_category_ids: Vec<i64> = Good::find()
        .select_only()
        .column(good::Column::CategoryId)
        .filter(good::Column::IsSold.eq(true))
        .distinct()
        .into_tuple()
        .all(db)
        .await?;

    Category::find()
        .filter(category::Column::Id.is_in(sold_category_ids))
        .order_by_asc(category::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Number of goods a user has bought.
pub async fn count_purchases(db: &DatabaseConnection, user_id: i64) -> Result<u64> {
    Good::find()
        .filter(good::Column::BuyerId.eq(user_id))
        .filter(good::Column::IsSold.eq(true))
        .count(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_add_category_derives_flag_and_rejects_duplicates() -> Result<()> {
        let db = setup_test_db().await?;

        let created = add_category(
            &db,
            NewCategory {
                name: " Myanmar ".to_string(),
                code: "+95".to_string(),
                flag_emoji: None,
                price: Decimal::new(150, 2),
            },
        )
        .await?;
        assert_eq!(created.name, "Myanmar");
        assert_eq!(created.flag_emoji, "🇲🇲");
        assert_eq!(created.price_cents, 150);

        let duplicate = add_category(
            &db,
            NewCategory {
                name: "Myanmar".to_string(),
                code: "+95".to_string(),
                flag_emoji: Some("🏴".to_string()),
                price: Decimal::ONE,
            },
        )
        .await;
        assert!(matches!(duplicate, Err(Error::AlreadyExists { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_resynchronize_adds_removes_and_reports() -> Result<()> {
        let db = setup_test_db().await?;
        let tmp = tempfile::tempdir()?;
        let myanmar = create_test_category(&db, "Myanmar", 150).await?;
        create_test_category(&db, "Kenya", 300).await?;

        write_session(tmp.path(), "+95 Myanmar", "959111")?;
        write_session(tmp.path(), "+95 Myanmar", "959222")?;
        write_session(tmp.path(), "+33 France", "331111")?;
        // In the store but gone from disk: must be removed
        seed_goods(&db, myanmar.id, &["959999"]).await?;

        let stock = StockDirectory::new(tmp.path());
        let report = resynchronize(&db, &stock).await?;

        assert_eq!(report.added, 2);
        assert_eq!(report.removed, 1);
        assert_eq!(report.unmatched_folders, vec!["+33 France".to_string()]);
        assert!(!report.created_root);

        let goods = list_goods(&db, myanmar.id).await?;
        let phones: Vec<_> = goods.iter().map(|g| g.phone_number.as_str()).collect();
        assert_eq!(phones, vec!["959111", "959222"]);
        assert_eq!(goods[0].payload, b"session-959111");

        let refreshed = get_category(&db, myanmar.id).await?;
        assert_eq!(refreshed.stock_count, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_resynchronize_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let tmp = tempfile::tempdir()?;
        let myanmar = create_test_category(&db, "Myanmar", 150).await?;
        write_session(tmp.path(), "+95 Myanmar", "959111")?;
        write_session(tmp.path(), "+95 Myanmar", "959222")?;

        let stock = StockDirectory::new(tmp.path());
        resynchronize(&db, &stock).await?;
        let before = list_goods(&db, myanmar.id).await?;

        let second = resynchronize(&db, &stock).await?;
        assert_eq!(second.added, 0);
        assert_eq!(second.removed, 0);
        assert_eq!(list_goods(&db, myanmar.id).await?, before);
        assert_eq!(get_category(&db, myanmar.id).await?.stock_count, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_resynchronize_keeps_sold_goods() -> Result<()> {
        let db = setup_test_db().await?;
        let tmp = tempfile::tempdir()?;
        let myanmar = create_test_category(&db, "Myanmar", 150).await?;
        create_test_user(&db, 1, 0).await?;
        seed_goods(&db, myanmar.id, &["959111"]).await?;
        reserve_and_remove(&db, myanmar.id, 1, 1).await?;

        // The file is gone from disk but the record is sold: it stays
        let stock = StockDirectory::new(tmp.path());
        let report = resynchronize(&db, &stock).await?;
        assert_eq!(report.removed, 0);
        assert_eq!(count_purchases(&db, 1).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_resynchronize_creates_missing_root() -> Result<()> {
        let db = setup_test_db().await?;
        let tmp = tempfile::tempdir()?;
        let stock = StockDirectory::new(tmp.path().join("accounts"));

        let report = resynchronize(&db, &stock).await?;
        assert!(report.created_root);
        assert!(stock.root().is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn test_reserve_takes_lowest_ids_and_recounts() -> Result<()> {
        let db = setup_test_db().await?;
        let category = create_test_category(&db, "Myanmar", 150).await?;
        create_test_user(&db, 1, 0).await?;
        let seeded = seed_goods(&db, category.id, &["959111", "959222", "959333"]).await?;

        let reserved = reserve_and_remove(&db, category.id, 2, 1).await?;
        let ids: Vec<_> = reserved.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![seeded[0].id, seeded[1].id]);
        assert!(reserved.iter().all(|g| g.is_sold && g.buyer_id == Some(1)));

        assert_eq!(get_category(&db, category.id).await?.stock_count, 1);
        assert_eq!(category_buyers(&db, category.id).await?, vec![1]);
        assert_eq!(categories_with_sales(&db).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_reserve_insufficient_stock_changes_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let category = create_test_category(&db, "Myanmar", 150).await?;
        create_test_user(&db, 1, 0).await?;
        seed_goods(&db, category.id, &["959111"]).await?;

        let result = reserve_and_remove(&db, category.id, 2, 1).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientStock {
                available: 1,
                requested: 2
            })
        ));
        assert_eq!(list_goods(&db, category.id).await?.len(), 1);

        let result = reserve_and_remove(&db, category.id, 0, 1).await;
        assert!(matches!(result, Err(Error::InvalidQuantity { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_share_goods() -> Result<()> {
        let db = setup_test_db().await?;
        let category = create_test_category(&db, "Myanmar", 150).await?;
        for id in 1..=6 {
            create_test_user(&db, id, 0).await?;
        }
        seed_goods(&db, category.id, &["1", "2", "3", "4"]).await?;

        let attempts = (1..=6).map(|buyer| reserve_and_remove(&db, category.id, 1, buyer));
        let results = futures::future::join_all(attempts).await;

        let mut sold: Vec<i64> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .flat_map(|goods| goods.iter().map(|g| g.id))
            .collect();
        sold.sort_unstable();
        sold.dedup();

        assert_eq!(sold.len(), 4);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 2);
        assert_eq!(get_category(&db, category.id).await?.stock_count, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_category_cascades() -> Result<()> {
        let db = setup_test_db().await?;
        let category = create_test_category(&db, "Myanmar", 150).await?;
        create_test_user(&db, 1, 0).await?;
        seed_goods(&db, category.id, &["1", "2", "3"]).await?;
        reserve_and_remove(&db, category.id, 1, 1).await?;

        let deleted = delete_category(&db, category.id).await?;
        assert_eq!(deleted, DeletedCategory { sold: 1, unsold: 2 });
        assert!(get_category_by_name(&db, "Myanmar").await?.is_none());
        assert_eq!(count_purchases(&db, 1).await?, 0);
        Ok(())
    }
}
