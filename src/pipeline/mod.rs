//! Download pipeline.
//!
//! - `DownloadPipeline`: one run from listing to written files
//! - `ListingProducer`: feeds the bounded record queue
//! - `PoolScaler`: grows the fetch worker pool to the requested rate

pub mod download;
pub mod producer;
pub mod queue;
pub mod scaler;
pub mod worker;

pub use download::{DownloadPipeline, DownloadSummary};
pub use producer::{ListingProducer, ListingSignal, ListingStatus};
pub use queue::{RecordQueue, record_queue};
pub use scaler::{PoolScaler, ScalerSettings, WorkerPool};
pub use worker::run_worker;
