//! Entity module - Contains all SeaORM entity definitions for the database.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod category;
pub mod deposit;
pub mod good;
pub mod user;
pub mod withdrawal;

// Re-export specific types to avoid conflicts
pub use category::{Column as CategoryColumn, Entity as Category, Model as CategoryModel};
pub use deposit::{
    Column as DepositColumn, DepositStatus, Entity as Deposit, Model as DepositModel,
};
pub use good::{Column as GoodColumn, Entity as Good, Model as GoodModel};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
pub use withdrawal::{
    Column as WithdrawalColumn, Entity as Withdrawal, Model as WithdrawalModel, WithdrawalStatus,
};
