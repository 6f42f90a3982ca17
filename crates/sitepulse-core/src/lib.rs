pub mod analytics;
pub mod attribution;
pub mod clock;
pub mod config;
pub mod consent;
pub mod device;
pub mod error;
pub mod event;
pub mod model;
pub mod recorder;
pub mod session;
pub mod storage;
pub mod store;
pub mod tracker;
pub mod visitor;

pub use analytics::{AggregationService, DateRange};
pub use recorder::EventRecorder;
pub use store::{MemoryStore, SiteStore};
pub use tracker::Tracker;
