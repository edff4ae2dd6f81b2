pub mod health;
pub mod vault;
