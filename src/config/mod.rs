//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → shared by value with each subsystem at construction
//!
//! Strategy preference (mutable at runtime):
//!     preference.rs reads/writes the persisted value
//!     → watcher.rs detects external rewrites
//!     → router context applies the new strategy
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the strategy preference changes
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod preference;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::ClientConfig;
pub use schema::HttpConfig;
pub use schema::HealthCheckConfig;
pub use schema::TimeoutConfig;
pub use schema::RetryConfig;
pub use schema::RealtimeConfig;
pub use schema::ObservabilityConfig;
pub use loader::ConfigError;
pub use preference::StrategyStore;
