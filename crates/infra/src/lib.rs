//! Infrastructure for the authoritative blocklist: storage, event routing,
//! transports, background expiry and configuration.
//!
//! ```text
//! BlocklistService ─→ BlockStore (commit) ─→ EventRouter ─┬─ LocalSubscriber
//!                                                         └─ RetryingPublisher → EventBus
//! ExpiryReconciler ─→ BlockStore (expired) ─→ EventRouter
//! ```

pub mod block_store;
pub mod config;
pub mod event_bus;
pub mod event_router;
pub mod name_index;
pub mod publisher;
pub mod reconciler;
pub mod retry;
pub mod service;
pub mod shutdown;


pub use block_store::{BlockStore, StoreStats};
pub use config::Config;
pub use event_router::{EventRouter, FnSubscriber, LocalSubscriber, PropagationError};
pub use publisher::{PublishError, RetryingPublisher};
pub use reconciler::{ExpiryReconciler, ReconcileReport, ReconcilerConfig, ReconcilerHandle};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use service::{BlocklistService, CommandError, UnblockOutcome};
pub use shutdown::ShutdownSignal;
