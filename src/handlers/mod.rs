pub mod advanced;
pub mod balance;
pub mod events;
pub mod health;
pub mod stats;
pub mod transaction;
pub mod users;
