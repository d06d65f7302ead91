mod pg_account_repository;

pub use pg_account_repository::*;
