pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;
pub mod storage;
pub mod store;
pub mod sync;

// Re-export main types for convenience
pub use api::ApiClient;
pub use auth::{AuthContext, Credentials};
pub use config::Config;
pub use error::ApiError;
pub use state::{ChatMessage, MessageKind, Sender, Session};
pub use storage::LocalStorage;
pub use store::{MessageStore, SessionStore};
pub use sync::{Applied, ChatSync, Job, Outcome};
