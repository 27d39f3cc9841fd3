pub mod error;
pub mod runtime;
pub mod metrics;
pub mod collector;
pub mod events;
pub mod profiler;

pub use error::{MonitorError, MonitorResult};
pub use runtime::{ContainerRuntime, DockerRuntime, LifecycleControl};
pub use metrics::ContainerMetrics;
pub use collector::{CollectionBatch, MetricsCollector, MetricsStream};
pub use profiler::{Profiler, Recommendation};
