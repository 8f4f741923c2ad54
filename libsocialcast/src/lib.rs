//! Socialcast - connect social accounts, then publish and schedule image posts
//!
//! The library holds the coordination layer shared by the `social-*`
//! binaries: an OAuth correlation engine that turns a browser redirect into
//! the answer to a waiting connect request, sliding-window rate limiters for
//! outbound platform calls, a due-post scheduler, and an encrypted SQLite
//! credential store.

pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod logging;
pub mod oauth;
pub mod platforms;
pub mod rate_limiter;
pub mod scheduler;
pub mod scheduling;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{Result, SocialcastError};
pub use scheduler::{Scheduler, TickReport};
pub use types::{
    Account, NewAccount, NewPost, Platform, PostAnalytics, PostContent, PostStatus, RemoteMedia,
    ScheduledPost,
};
