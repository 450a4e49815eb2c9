pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod redis;
pub mod schema;
pub mod types;

pub use config::Config;
pub use context::AppContext;
pub use db::DbPool;
pub use error::Error;
pub use redis::{user_channel, RedisPool};
