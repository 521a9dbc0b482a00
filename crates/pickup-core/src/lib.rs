//! Core order lifecycle engine for the pickup system.
//!
//! Coordinates catalog pricing, pickup token issuance, verification at the
//! counter, background expiry and account penalties. Components are built
//! from configuration through [`builder::PickupBuilder`].

pub mod builder;
pub mod engine;
pub mod monitoring;
pub mod recovery;
pub mod state;

pub use builder::{BuilderError, PickupBuilder, PickupFactories};
pub use engine::event_bus::EventBus;
pub use engine::token_issuer::TokenIssuer;
pub use engine::{EngineError, PickupEngine};
pub use monitoring::{ExpiryReaper, SweepReport};
pub use state::{ExpiryOutcome, LifecycleError, OrderLifecycleManager, OrderLimits};
