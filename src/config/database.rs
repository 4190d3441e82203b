//! Database configuration module.
//!
//! Handles the `SQLite` connection and table creation using `SeaORM`. Tables are generated from
//! the entity definitions with `Schema::create_table_from_entity`, so the schema always matches
//! the Rust structs without hand-written SQL.

use crate::entities::{Category, Deposit, Good, User, Withdrawal};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/storefront.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    Database::connect(get_database_url())
        .await
        .map_err(Into::into)
}

/// Creates all tables that do not exist yet.
///
/// Users come first so the foreign keys of goods, deposits and withdrawals resolve.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut user_table = schema.create_table_from_entity(User);
    let mut category_table = schema.create_table_from_entity(Category);
    let mut good_table = schema.create_table_from_entity(Good);
    let mut deposit_table = schema.create_table_from_entity(Deposit);
    let mut withdrawal_table = schema.create_table_from_entity(Withdrawal);

    for table in [
        &mut user_table,
        &mut category_table,
        &mut good_table,
        &mut deposit_table,
        &mut withdrawal_table,
    ] {
        table.if_not_exists();
        db.execute(builder.build(&*table)).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{CategoryModel, DepositModel, GoodModel, UserModel, WithdrawalModel};
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<UserModel> = User::find().limit(1).all(&db).await?;
        let _: Vec<CategoryModel> = Category::find().limit(1).all(&db).await?;
        let _: Vec<GoodModel> = Good::find().limit(1).all(&db).await?;
        let _: Vec<DepositModel> = Deposit::find().limit(1).all(&db).await?;
        let _: Vec<WithdrawalModel> = Withdrawal::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }
}
