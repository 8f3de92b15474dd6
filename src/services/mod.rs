pub mod batch_service;
pub mod cache_service;
pub mod event_publisher;
pub mod ledger_service;
pub mod replay_service;
pub mod scheduled_service;
pub mod user_service;
