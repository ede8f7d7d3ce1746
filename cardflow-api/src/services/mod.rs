//! Card lifecycle services built on the provider seams

pub mod cards;
pub mod conversion;
pub mod currency;
pub mod fulfillment;
pub mod health;
pub mod polling;

pub use cards::CardService;
pub use conversion::{ConversionExecutor, ConversionHandle, ConversionRunner, TimedExecutor};
pub use currency::{format_money, CurrencyContext};
pub use fulfillment::{FulfillmentOutcome, FulfillmentService};
pub use health::HealthMonitor;
pub use polling::{spawn_poller, PollHandle, PollState};
