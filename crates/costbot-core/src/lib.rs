//! Cost report bot core: trigger classification, spend aggregation, report rendering, dispatch.
//!
//! Providers (cost source, rate quoter, message poster) are traits; HTTP implementations live in
//! `costbot-clients`.

pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod observability;
pub mod report;
pub mod signature;
pub mod trigger;

pub use config::{CostbotConfig, ReportSettings, Secret};
pub use delivery::{DeliveryError, Destination, MessagePoster};
pub use dispatch::{Collaborators, Dispatcher, InvocationResult, Outcome};
pub use error::ReportError;
pub use observability::{LogSettings, LogSink, init_observability, init_with};
pub use report::{
    AggregateReport, CostSource, CostSourceError, ExchangeRate, FALLBACK_USD_TO_INR, QuoteError,
    RateQuoter, SpendRecord,
};
pub use trigger::{Classified, Trigger, classify};
