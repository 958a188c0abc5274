pub mod chat;
pub mod database;
pub mod export;
pub mod settings;

pub use chat::{ChatService, TurnUpdate};
pub use database::Database;
pub use settings::{Settings, SettingsService};
