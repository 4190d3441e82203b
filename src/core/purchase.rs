//! Purchase transaction: debit, reserve, package, deliver, relocate.
//!
//! Money moves before stock so a failed reservation can always be undone with a compensating
//! credit. Once goods are reserved the sale is final: delivery problems are escalated to the
//! admin channel and recorded on the receipt, never rolled back.

use crate::{
    core::{inventory, ledger, localization::Translator, money, stock_dir::StockDirectory},
    entities::{category, good},
    errors::{Error, Result},
    gateway::{ChatId, MessageRef, MessagingGateway},
};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use std::io::{Cursor, Write};
use tracing::{error, info, instrument, warn};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

/// A buyer's order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseRequest {
    /// Buyer
    pub user_id: i64,
    /// Category to buy from
    pub category_id: i64,
    /// Number of goods, at least one
    pub quantity: u64,
}

/// Whether the archive reached the buyer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Archive sent
    Delivered(MessageRef),
    /// Archive could not be sent; the sale stands and admins were alerted
    Failed {
        /// Transport or packaging error
        reason: String,
    },
}

/// Result of a completed sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    /// Order label used in logs and escalations
    pub order_id: String,
    /// Category bought from
    pub category: category::Model,
    /// Number of goods sold
    pub quantity: u64,
    /// Amount debited
    pub total: Decimal,
    /// Balance after the debit
    pub balance_after: Decimal,
    /// External identifiers of the sold goods
    pub phone_numbers: Vec<String>,
    /// Delivery outcome
    pub delivery: DeliveryStatus,
    /// Files moved into `sold/`
    pub relocated: usize,
}

impl PurchaseReceipt {
    /// True when the archive reached the buyer.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self.delivery, DeliveryStatus::Delivered(_))
    }
}

/// Packs session payloads into one deflated zip archive with `<phone>.session` entries.
pub fn build_archive(goods: &[good::Model]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for good in goods {
        writer.start_file(format!("{}.session", good.phone_number), options)?;
        writer.write_all(&good.payload)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Archive file name shown to the buyer, e.g. `95 Myanmar_x2.zip`.
#[must_use]
pub fn archive_name(category: &category::Model, quantity: u64) -> String {
    let code = category.code.trim_start_matches('+');
    if code.is_empty() {
        format!("{}_x{quantity}.zip", category.name)
    } else {
        format!("{code} {}_x{quantity}.zip", category.name)
    }
}

/// Price of `quantity` goods of a category.
pub fn order_total(category: &category::Model, quantity: u64) -> Result<Decimal> {
    let cents = i64::try_from(quantity)
        .ok()
        .and_then(|q| q.checked_mul(category.price_cents))
        .ok_or(Error::InvalidQuantity { quantity })?;
    Ok(money::from_cents(cents))
}

/// Sells `quantity` goods of a category to a user and delivers them.
///
/// # Errors
/// - `InvalidQuantity` for a zero quantity
/// - `NotFound` for an unknown or inactive category
/// - `InsufficientFunds` when the balance does not cover the total (nothing changes)
/// - `InsufficientStock` when not enough goods remain (the debit is refunded)
///
/// A delivery failure is not an error: it is reported through [`PurchaseReceipt::delivery`].
#[instrument(skip(db, gateway, tr, stock))]
pub async fn purchase(
    db: &DatabaseConnection,
    gateway: &dyn MessagingGateway,
    tr: &Translator,
    stock: &StockDirectory,
    escalation: Option<ChatId>,
    request: PurchaseRequest,
) -> Result<PurchaseReceipt> {
    if request.quantity == 0 {
        return Err(Error::InvalidQuantity {
            quantity: request.quantity,
        });
    }

    let category = inventory::get_category(db, request.category_id).await?;
    if !category.is_active {
        return Err(Error::NotFound {
            entity: "Category",
            key: category.name,
        });
    }
    let total = order_total(&category, request.quantity)?;

    let debited = ledger::debit(db, request.user_id, total).await?;

    let goods = match inventory::reserve_and_remove(
        db,
        request.category_id,
        request.quantity,
        request.user_id,
    )
    .await
    {
        Ok(goods) => goods,
        Err(reservation_error) => {
            if let Err(refund_error) = ledger::credit(db, request.user_id, total).await {
                error!(
                    "Refund of {} to user {} failed after reservation error ({}): {}",
                    total, request.user_id, reservation_error, refund_error
                );
            } else {
                info!(
                    "Refunded {} to user {} after reservation error: {}",
                    total, request.user_id, reservation_error
                );
            }
            return Err(reservation_error);
        }
    };

    let order_id = format!(
        "ORD-{}-{}",
        request.user_id,
        goods.first().map_or(0, |g| g.id)
    );
    let phone_numbers: Vec<String> = goods.iter().map(|g| g.phone_number.clone()).collect();

    let caption = delivery_caption(tr, &debited.language_code, &category, request.quantity, total);
    let delivery = deliver(gateway, &category, &goods, request, &caption).await;
    if let DeliveryStatus::Failed { reason } = &delivery {
        let failure = Error::DeliveryFailed {
            order: order_id.clone(),
            reason: reason.clone(),
        };
        error!("{}", failure);
        escalate(gateway, escalation, &order_id, request, &category, &phone_numbers, reason).await;
    }

    let mut relocated = 0;
    for good in &goods {
        match stock.move_to_sold(&good.source_path).await {
            Ok(true) => relocated += 1,
            Ok(false) => {}
            Err(e) => warn!("Could not relocate {}: {}", good.source_path, e),
        }
    }

    info!(
        "Order {} complete: {} x {} for {}",
        order_id, request.quantity, category.name, total
    );

    Ok(PurchaseReceipt {
        order_id,
        category,
        quantity: request.quantity,
        total,
        balance_after: debited.balance(),
        phone_numbers,
        delivery,
        relocated,
    })
}

async fn deliver(
    gateway: &dyn MessagingGateway,
    category: &category::Model,
    goods: &[good::Model],
    request: PurchaseRequest,
    caption: &str,
) -> DeliveryStatus {
    let archive = match build_archive(goods) {
        Ok(archive) => archive,
        Err(e) => {
            return DeliveryStatus::Failed {
                reason: e.to_string(),
            };
        }
    };

    let recipient = ChatId::User(request.user_id.unsigned_abs());
    match gateway
        .send_document(
            recipient,
            &archive_name(category, request.quantity),
            archive,
            caption,
        )
        .await
    {
        Ok(message) => DeliveryStatus::Delivered(message),
        Err(e) => DeliveryStatus::Failed {
            reason: e.to_string(),
        },
    }
}

fn delivery_caption(
    tr: &Translator,
    language: &str,
    category: &category::Model,
    quantity: u64,
    total: Decimal,
) -> String {
    tr.format(
        language,
        "delivery_caption",
        &[
            ("category", &category.label()),
            ("quantity", &quantity),
            ("total", &format!("{total:.2}")),
        ],
    )
}

async fn escalate(
    gateway: &dyn MessagingGateway,
    escalation: Option<ChatId>,
    order_id: &str,
    request: PurchaseRequest,
    category: &category::Model,
    phone_numbers: &[String],
    reason: &str,
) {
    let Some(chat) = escalation else {
        warn!("No escalation channel configured for order {}", order_id);
        return;
    };

    let text = format!(
        "🚨 **Delivery failed** for order `{}`\nUser: `{}`\nCategory: {}\nGoods: {}\nReason: {}\n\nThe sale is recorded; please deliver manually.",
        order_id,
        request.user_id,
        category.label(),
        phone_numbers.join(", "),
        reason
    );
    if let Err(e) = gateway.send_text(chat, &text).await {
        error!("Could not escalate order {}: {}", order_id, e);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::gateway::GatewayError;
    use crate::test_utils::*;
    use std::io::Read;

    const ADMIN_CHANNEL: ChatId = ChatId::Channel(900);

    fn request(user_id: i64, category_id: i64, quantity: u64) -> PurchaseRequest {
        PurchaseRequest {
            user_id,
            category_id,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_myanmar_purchase_scenario() -> Result<()> {
        let db = setup_test_db().await?;
        let tmp = tempfile::tempdir()?;
        let stock = StockDirectory::new(tmp.path());
        let gateway = RecordingGateway::default();
        let tr = Translator::embedded()?;

        let myanmar = create_test_category(&db, "Myanmar", 150).await?;
        create_test_user(&db, 1, 500).await?;
        for phone in ["959111", "959222", "959333"] {
            write_session(tmp.path(), "+95 Myanmar", phone)?;
        }
        inventory::resynchronize(&db, &stock).await?;

        let receipt = purchase(
            &db,
            &gateway,
            &tr,
            &stock,
            Some(ADMIN_CHANNEL),
            request(1, myanmar.id, 2),
        )
        .await?;

        assert_eq!(receipt.total, Decimal::new(300, 2));
        assert_eq!(receipt.balance_after, Decimal::new(200, 2));
        assert_eq!(receipt.phone_numbers, vec!["959111", "959222"]);
        assert!(receipt.is_delivered());
        assert_eq!(receipt.relocated, 2);
        assert_eq!(ledger::balance(&db, 1).await?, Decimal::new(2, 0));
        assert_eq!(inventory::get_category(&db, myanmar.id).await?.stock_count, 1);

        let documents = gateway.documents();
        assert_eq!(documents.len(), 1);
        let (chat, file_name, bytes) = &documents[0];
        assert_eq!(*chat, ChatId::User(1));
        assert_eq!(file_name, "95 Myanmar_x2.zip");

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.clone()))?;
        assert_eq!(archive.len(), 2);
        let mut content = Vec::new();
        archive.by_name("959111.session")?.read_to_end(&mut content)?;
        assert_eq!(content, b"session-959111");

        assert!(tmp.path().join("+95 Myanmar/sold/959111.session").exists());
        assert!(tmp.path().join("+95 Myanmar/959333.session").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_balance_is_insufficient() -> Result<()> {
        let db = setup_test_db().await?;
        let tmp = tempfile::tempdir()?;
        let stock = StockDirectory::new(tmp.path());
        let gateway = RecordingGateway::default();
        let tr = Translator::embedded()?;
        let category = create_test_category(&db, "Myanmar", 150).await?;
        create_test_user(&db, 1, 0).await?;
        seed_goods(&db, category.id, &["959111"]).await?;

        let result = purchase(&db, &gateway, &tr, &stock, None, request(1, category.id, 1)).await;

        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
        assert_eq!(ledger::balance(&db, 1).await?, Decimal::ZERO);
        assert_eq!(inventory::list_goods(&db, category.id).await?.len(), 1);
        assert!(gateway.documents().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_insufficient_stock_refunds_debit() -> Result<()> {
        let db = setup_test_db().await?;
        let tmp = tempfile::tempdir()?;
        let stock = StockDirectory::new(tmp.path());
        let gateway = RecordingGateway::default();
        let tr = Translator::embedded()?;
        let category = create_test_category(&db, "Myanmar", 150).await?;
        create_test_user(&db, 1, 1000).await?;
        seed_goods(&db, category.id, &["959111"]).await?;

        let result = purchase(&db, &gateway, &tr, &stock, None, request(1, category.id, 3)).await;

        assert!(matches!(
            result,
            Err(Error::InsufficientStock {
                available: 1,
                requested: 3
            })
        ));
        assert_eq!(ledger::balance(&db, 1).await?, Decimal::new(10, 0));
        assert_eq!(inventory::list_goods(&db, category.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_purchases_deliver_exactly_available_goods() -> Result<()> {
        let db = setup_test_db().await?;
        let tmp = tempfile::tempdir()?;
        let stock = StockDirectory::new(tmp.path());
        let gateway = RecordingGateway::default();
        let tr = Translator::embedded()?;
        let category = create_test_category(&db, "Myanmar", 100).await?;
        for user in 1..=5 {
            create_test_user(&db, user, 100).await?;
        }
        seed_goods(&db, category.id, &["1", "2", "3"]).await?;

        let attempts = (1..=5).map(|user| {
            purchase(&db, &gateway, &tr, &stock, None, request(user, category.id, 1))
        });
        let results = futures::future::join_all(attempts).await;

        let receipts: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(receipts.len(), 3);
        let mut phones: Vec<_> = receipts.iter().flat_map(|r| r.phone_numbers.clone()).collect();
        phones.sort();
        phones.dedup();
        assert_eq!(phones.len(), 3);
        assert_eq!(gateway.documents().len(), 3);

        // Losers got their money back
        let mut total_balance = Decimal::ZERO;
        for user in 1..=5 {
            total_balance += ledger::balance(&db, user).await?;
        }
        assert_eq!(total_balance, Decimal::new(2, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_sale_and_escalates() -> Result<()> {
        let db = setup_test_db().await?;
        let tmp = tempfile::tempdir()?;
        let stock = StockDirectory::new(tmp.path());
        let gateway = RecordingGateway::default();
        let tr = Translator::embedded()?;
        gateway.fail_for(ChatId::User(1), GatewayError::Unreachable { recipient: 1 });

        let category = create_test_category(&db, "Myanmar", 150).await?;
        create_test_user(&db, 1, 500).await?;
        seed_goods(&db, category.id, &["959111"]).await?;

        let receipt = purchase(
            &db,
            &gateway,
            &tr,
            &stock,
            Some(ADMIN_CHANNEL),
            request(1, category.id, 1),
        )
        .await?;

        assert!(!receipt.is_delivered());
        assert_eq!(ledger::balance(&db, 1).await?, Decimal::new(350, 2));
        assert_eq!(inventory::count_purchases(&db, 1).await?, 1);

        let escalations = gateway.texts_to(ADMIN_CHANNEL);
        assert_eq!(escalations.len(), 1);
        assert!(escalations[0].contains(&receipt.order_id));
        assert!(escalations[0].contains("959111"));
        Ok(())
    }

    #[tokio::test]
    async fn test_purchase_after_resync_removed_only_good_refunds() -> Result<()> {
        let db = setup_test_db().await?;
        let tmp = tempfile::tempdir()?;
        let stock = StockDirectory::new(tmp.path());
        let gateway = RecordingGateway::default();
        let tr = Translator::embedded()?;
        let category = create_test_category(&db, "Myanmar", 150).await?;
        create_test_user(&db, 1, 500).await?;
        write_session(tmp.path(), "+95 Myanmar", "959111")?;
        inventory::resynchronize(&db, &stock).await?;

        std::fs::remove_file(tmp.path().join("+95 Myanmar/959111.session"))?;
        let report = inventory::resynchronize(&db, &stock).await?;
        assert_eq!(report.removed, 1);

        let result = purchase(&db, &gateway, &tr, &stock, None, request(1, category.id, 1)).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientStock {
                available: 0,
                requested: 1
            })
        ));
        assert_eq!(ledger::balance(&db, 1).await?, Decimal::new(5, 0));
        assert!(gateway.documents().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_resync_racing_purchase_reselects_and_keeps_sold_row() -> Result<()> {
        let db = setup_test_db().await?;
        let tmp = tempfile::tempdir()?;
        let stock = StockDirectory::new(tmp.path());
        let gateway = RecordingGateway::default();
        let tr = Translator::embedded()?;
        let category = create_test_category(&db, "Myanmar", 150).await?;
        create_test_user(&db, 1, 500).await?;
        write_session(tmp.path(), "+95 Myanmar", "959111")?;
        write_session(tmp.path(), "+95 Myanmar", "959222")?;
        inventory::resynchronize(&db, &stock).await?;

        // The lowest-id candidate vanishes from disk while the purchase runs
        std::fs::remove_file(tmp.path().join("+95 Myanmar/959111.session"))?;
        let (bought, synced) = tokio::join!(
            purchase(&db, &gateway, &tr, &stock, None, request(1, category.id, 1)),
            inventory::resynchronize(&db, &stock)
        );
        let receipt = bought?;
        let report = synced?;

        assert_eq!(receipt.phone_numbers.len(), 1);
        assert_eq!(ledger::balance(&db, 1).await?, Decimal::new(350, 2));
        // Whatever was sold is still recorded as sold
        assert_eq!(inventory::count_purchases(&db, 1).await?, 1);

        let unsold: Vec<_> = inventory::list_goods(&db, category.id)
            .await?
            .into_iter()
            .map(|g| g.phone_number)
            .collect();
        if receipt.phone_numbers == ["959111"] {
            // Sold before the resync deleted it
            assert_eq!(report.removed, 0);
            assert_eq!(unsold, vec!["959222".to_string()]);
        } else {
            // Deleted first, the purchase re-selected the next good
            assert_eq!(receipt.phone_numbers, vec!["959222".to_string()]);
            assert_eq!(report.removed, 1);
            assert!(unsold.is_empty());
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_resync_racing_purchase_of_last_good_nets_zero() -> Result<()> {
        let db = setup_test_db().await?;
        let tmp = tempfile::tempdir()?;
        let stock = StockDirectory::new(tmp.path());
        let gateway = RecordingGateway::default();
        let tr = Translator::embedded()?;
        let category = create_test_category(&db, "Myanmar", 150).await?;
        create_test_user(&db, 1, 500).await?;
        write_session(tmp.path(), "+95 Myanmar", "959111")?;
        inventory::resynchronize(&db, &stock).await?;

        std::fs::remove_file(tmp.path().join("+95 Myanmar/959111.session"))?;
        let (bought, synced) = tokio::join!(
            purchase(&db, &gateway, &tr, &stock, None, request(1, category.id, 1)),
            inventory::resynchronize(&db, &stock)
        );
        synced?;

        let sold = inventory::count_purchases(&db, 1).await?;
        match bought {
            Ok(receipt) => {
                assert_eq!(sold, 1);
                assert_eq!(receipt.phone_numbers, vec!["959111".to_string()]);
                assert_eq!(ledger::balance(&db, 1).await?, Decimal::new(350, 2));
            }
            Err(e) => {
                assert!(matches!(e, Error::InsufficientStock { .. }));
                assert_eq!(sold, 0);
                assert_eq!(ledger::balance(&db, 1).await?, Decimal::new(5, 0));
            }
        }
        assert!(inventory::list_goods(&db, category.id).await?.is_empty());
        Ok(())
    }

    #[test]
    fn test_order_total_overflow() {
        let category = category::Model {
            id: 1,
            name: "Myanmar".to_string(),
            code: "+95".to_string(),
            flag_emoji: "🇲🇲".to_string(),
            price_cents: i64::MAX,
            stock_count: 0,
            is_active: true,
        };
        assert!(order_total(&category, 2).is_err());
        assert_eq!(order_total(&category, 1).unwrap(), money::from_cents(i64::MAX));
    }

    #[test]
    fn test_delivery_caption_uses_buyer_language() {
        let tr = Translator::embedded().unwrap();
        let category = category::Model {
            id: 1,
            name: "Myanmar".to_string(),
            code: "+95".to_string(),
            flag_emoji: "🇲🇲".to_string(),
            price_cents: 150,
            stock_count: 3,
            is_active: true,
        };
        let total = Decimal::new(300, 2);

        let english = delivery_caption(&tr, "en", &category, 2, total);
        assert!(english.contains("Purchase Complete"));
        assert!(english.contains("$3.00"));

        let russian = delivery_caption(&tr, "ru", &category, 2, total);
        assert!(russian.contains("Покупка завершена"));
        assert!(russian.contains("Myanmar"));
        assert!(russian.contains("$3.00"));
    }
}
