//! User business logic - registration, preferences, and moderation.
//!
//! Users are created lazily the first time they interact with the bot. Registration is
//! idempotent: two concurrent first contacts race on the primary key and the loser re-reads
//! the winner's row instead of failing.

use crate::{
    core::localization::{DEFAULT_LANGUAGE, SUPPORTED_LANGUAGES},
    entities::{User, user},
    errors::{Error, Result},
};
use sea_orm::{PaginatorTrait, Set, SqlErr, prelude::*};
use tracing::{info, instrument, warn};

/// Display currencies a balance can be shown in.
pub const SUPPORTED_CURRENCIES: [&str; 3] = ["USD", "RUB", "CNY"];

/// Identity of a user as reported by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Platform user id
    pub user_id: i64,
    /// Platform username
    pub username: Option<String>,
    /// Display name
    pub first_name: String,
    /// Platform locale, if known
    pub language_code: Option<String>,
}

/// Finds a user by id.
pub async fn get_user(db: &DatabaseConnection, user_id: i64) -> Result<Option<user::Model>> {
    User::find_by_id(user_id).one(db).await.map_err(Into::into)
}

/// Finds a user by id, failing with `NotFound` when missing.
pub async fn require_user<C>(db: &C, user_id: i64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "User",
            key: user_id.to_string(),
        })
}

/// Finds a user by username, with or without the leading `@`.
pub async fn get_user_by_username(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<user::Model>> {
    User::find()
        .filter(user::Column::Username.eq(username.trim_start_matches('@')))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Returns the stored user, creating it on first contact.
///
/// A unique-constraint violation means another request registered the same user between our
/// lookup and insert; the existing row is returned in that case.
#[instrument(skip(db, new_user), fields(user_id = new_user.user_id))]
pub async fn get_or_create_user(db: &DatabaseConnection, new_user: NewUser) -> Result<user::Model> {
    if let Some(existing) = get_user(db, new_user.user_id).await? {
        return Ok(existing);
    }

    let language = new_user
        .language_code
        .as_deref()
        .map(|code| code.split('-').next().unwrap_or(code).to_lowercase())
        .filter(|code| SUPPORTED_LANGUAGES.contains(&code.as_str()))
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

    let model = user::ActiveModel {
        user_id: Set(new_user.user_id),
        username: Set(new_user.username.clone()),
        first_name: Set(new_user.first_name.clone()),
        balance_cents: Set(0),
        language_code: Set(language),
        currency: Set("USD".to_string()),
        is_banned: Set(false),
        registered_at: Set(chrono::Utc::now()),
    };

    match model.insert(db).await {
        Ok(created) => {
            info!("New user created: {} ({})", created.user_id, created.mention());
            Ok(created)
        }
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            warn!(
                "Race condition on user creation for ID {}. Fetching existing user.",
                new_user.user_id
            );
            require_user(db, new_user.user_id).await
        }
        Err(err) => Err(err.into()),
    }
}

/// Changes the interface language.
pub async fn set_language(
    db: &DatabaseConnection,
    user_id: i64,
    language_code: &str,
) -> Result<user::Model> {
    if !SUPPORTED_LANGUAGES.contains(&language_code) {
        return Err(Error::Config {
            message: format!("Unsupported language '{language_code}'"),
        });
    }
    let mut active: user::ActiveModel = require_user(db, user_id).await?.into();
    active.language_code = Set(language_code.to_string());
    active.update(db).await.map_err(Into::into)
}

/// Changes the display currency.
pub async fn set_currency(
    db: &DatabaseConnection,
    user_id: i64,
    currency: &str,
) -> Result<user::Model> {
    let currency = currency.to_uppercase();
    if !SUPPORTED_CURRENCIES.contains(&currency.as_str()) {
        return Err(Error::Config {
            message: format!("Unsupported currency '{currency}'"),
        });
    }
    let mut active: user::ActiveModel = require_user(db, user_id).await?.into();
    active.currency = Set(currency);
    active.update(db).await.map_err(Into::into)
}

/// Bans or unbans a user.
#[instrument(skip(db))]
pub async fn set_banned(db: &DatabaseConnection, user_id: i64, banned: bool) -> Result<user::Model> {
    let mut active: user::ActiveModel = require_user(db, user_id).await?.into();
    active.is_banned = Set(banned);
    let updated = active.update(db).await?;
    info!("User {} ban status set to {}", user_id, banned);
    Ok(updated)
}

/// All user ids in registration order.
pub async fn all_user_ids(db: &DatabaseConnection) -> Result<Vec<i64>> {
    use sea_orm::{QueryOrder, QuerySelect};

    User::find()
        .select_only()
        .column(user::Column::UserId)
        .order_by_asc(user::Column::RegisteredAt)
        .into_tuple::<i64>()
        .all(db)
        .await
        .map_err(Into::into)
}

/// Keeps only the ids that belong to registered users, preserving input order.
pub async fn existing_user_ids(db: &DatabaseConnection, ids: &[i64]) -> Result<Vec<i64>> {
    use sea_orm::QuerySelect;

    let found: Vec<i64> = User::find()
        .select_only()
        .column(user::Column::UserId)
        .filter(user::Column::UserId.is_in(ids.iter().copied()))
        .into_tuple::<i64>()
        .all(db)
        .await?;

    let mut result = Vec::new();
    for id in ids {
        if found.contains(id) && !result.contains(id) {
            result.push(*id);
        }
    }
    Ok(result)
}

/// Number of registered users.
pub async fn count_users(db: &DatabaseConnection) -> Result<u64> {
    User::find().count(db).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    fn new_user(id: i64) -> NewUser {
        NewUser {
            user_id: id,
            username: Some(format!("user{id}")),
            first_name: format!("User {id}"),
            language_code: Some("ru-RU".to_string()),
        }
    }

    #[tokio::test]
    async fn test_get_or_create_user_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;

        let first = get_or_create_user(&db, new_user(7)).await?;
        let second = get_or_create_user(&db, new_user(7)).await?;

        assert_eq!(first, second);
        assert_eq!(first.language_code, "ru");
        assert_eq!(first.currency, "USD");
        assert_eq!(first.balance_cents, 0);
        assert_eq!(count_users(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_first_contact_creates_one_row() -> Result<()> {
        let db = setup_test_db().await?;

        let (a, b) = tokio::join!(
            get_or_create_user(&db, new_user(11)),
            get_or_create_user(&db, new_user(11))
        );

        assert_eq!(a?.user_id, 11);
        assert_eq!(b?.user_id, 11);
        assert_eq!(count_users(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unsupported_language_falls_back_to_english() -> Result<()> {
        let db = setup_test_db().await?;
        let mut user = new_user(3);
        user.language_code = Some("de".to_string());

        let created = get_or_create_user(&db, user).await?;
        assert_eq!(created.language_code, "en");
        Ok(())
    }

    #[tokio::test]
    async fn test_preferences_and_ban() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_user(&db, 5, 0).await?;

        assert_eq!(set_currency(&db, 5, "rub").await?.currency, "RUB");
        assert!(set_currency(&db, 5, "EUR").await.is_err());
        assert_eq!(set_language(&db, 5, "zh").await?.language_code, "zh");
        assert!(set_banned(&db, 5, true).await?.is_banned);
        assert!(!set_banned(&db, 5, false).await?.is_banned);

        let missing = set_banned(&db, 404, true).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_lookup_by_username_and_existing_ids() -> Result<()> {
        let db = setup_test_db().await?;
        get_or_create_user(&db, new_user(1)).await?;
        get_or_create_user(&db, new_user(2)).await?;

        let found = get_user_by_username(&db, "@user2").await?.unwrap();
        assert_eq!(found.user_id, 2);

        let ids = existing_user_ids(&db, &[2, 99, 1, 2]).await?;
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(all_user_ids(&db).await?.len(), 2);
        Ok(())
    }
}
