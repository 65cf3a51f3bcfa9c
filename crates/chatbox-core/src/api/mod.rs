pub mod client;
pub mod schema;

pub use client::ApiClient;
pub use schema::{HistoryRecord, messages_from_history};
