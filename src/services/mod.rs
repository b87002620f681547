pub mod delivery;
pub mod insights;
pub mod pacing;
pub mod pipeline;
pub mod providers;
pub mod ranking;
pub mod resolver;
pub mod signals;

pub use delivery::{
    BatchDeliveryController, ChannelObserver, DeliveryObserver, PipelineRunState, RunEvent,
};
pub use insights::InsightsFetcher;
pub use pacing::{FixedInterval, Pacer, TokenBucket, Unpaced};
pub use pipeline::{GiftPipeline, RecommendationOutcome, RecommendationQuery, RunReport, RunStatus};
pub use resolver::{Resolution, TermResolver};
pub use signals::SignalBuilder;
