mod account;
mod account_repository;

pub use account::*;
pub use account_repository::*;
