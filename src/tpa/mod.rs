//! Traffic performance analyzer.
//!
//! Observes the packets of one simulation run, keeps per-packet send and
//! receive events and turns them into the run's result record.

pub mod classifier;
pub mod context;
pub mod control;
pub mod headers;
pub mod metrics;
pub mod record;
pub mod trace;
pub mod types;

pub use classifier::{AnalyzerConfig, Classifier, ClassifierError, TrafficProfile};
pub use context::{RunContext, RunOutputs, RunReport};
pub use control::{ControlMatch, ControlRules};
pub use metrics::{MetricError, MetricValue, RunMetrics};
pub use record::{RecordError, ResultRecord};
pub use types::{ControlEvents, ReceivedEvent, SentEvent, SimTimeMs, TrafficType};
