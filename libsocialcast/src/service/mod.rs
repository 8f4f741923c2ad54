//! Service layer for Socialcast
//!
//! A facade the binaries share, so the connect, post, and schedule flows are
//! written once. `SocialcastService` owns the shared resources (database,
//! configuration, rate limiters, publishers) and hands out sub-services:
//!
//! - `AccountService`: connect, disconnect, and list accounts
//! - `PostingService`: publish now, schedule, list recent posts, and list,
//!   inspect, or delete posts already live on a platform
//!
//! # Example
//!
//! ```no_run
//! use libsocialcast::service::SocialcastService;
//! use libsocialcast::Platform;
//!
//! # async fn example() -> libsocialcast::Result<()> {
//! let service = SocialcastService::new().await?;
//!
//! let receipt = service
//!     .posting()
//!     .schedule_post(
//!         "42",
//!         Platform::Instagram,
//!         "https://cdn.example.com/latte.jpg",
//!         Some("Latte art"),
//!         "tomorrow 9am",
//!     )
//!     .await?;
//! println!("Scheduled {} for {}", receipt.post_id, receipt.scheduled_at);
//! # Ok(())
//! # }
//! ```

pub mod accounts;
pub mod posting;

pub use accounts::{AccountService, PendingConnect};
pub use posting::{PostingService, PublishReceipt, ScheduleReceipt};

use std::sync::Arc;

use crate::platforms::{PostManagers, PublisherRegistry};
use crate::rate_limiter::RateLimiters;
use crate::scheduler::Scheduler;
use crate::{Config, Database, Result};

pub struct SocialcastService {
    db: Database,
    config: Arc<Config>,
    limiters: RateLimiters,
    publishers: PublisherRegistry,
    accounts: AccountService,
    posting: PostingService,
}

impl SocialcastService {
    /// Load configuration from the default location and open the database
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Open the database named by `config` and set up the Graph publishers
    ///
    /// # Errors
    ///
    /// Fails if the encryption key is missing or malformed, the database
    /// cannot be opened, or the rate limit groups conflict.
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Database::open(&config.database.path, config.encryption_key()?).await?;
        let limiters = RateLimiters::from_config(&config)?;
        let publishers = PublisherRegistry::graph(&config, &limiters);
        Ok(Self::with_parts(config, db, limiters, publishers))
    }

    /// Assemble a service from already-built parts
    pub fn with_parts(
        config: Config,
        db: Database,
        limiters: RateLimiters,
        publishers: PublisherRegistry,
    ) -> Self {
        let config = Arc::new(config);
        let accounts = AccountService::new(db.clone(), Arc::clone(&config));
        let posting = PostingService::new(db.clone(), publishers.clone())
            .with_post_managers(PostManagers::graph(&config, &limiters));

        Self {
            db,
            config,
            limiters,
            publishers,
            accounts,
            posting,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    pub fn posting(&self) -> &PostingService {
        &self.posting
    }

    /// A scheduler sharing this service's database, rate limiters, and
    /// publishers, polling at the configured interval
    pub fn scheduler(&self) -> Arc<Scheduler> {
        let scheduler = Scheduler::new(
            self.db.clone(),
            self.limiters.clone(),
            self.config.scheduler.poll_interval(),
        );
        scheduler.register_all(&self.publishers);
        Arc::new(scheduler)
    }
}
