pub mod breaker;
pub mod monitor;

pub use breaker::{Admission, ResilientGateway, RetryPolicy};
pub use monitor::{
    HealthMonitor, HealthSnapshot, HealthStatus, HealthSummary, HealthThresholds, UnhealthyReason,
};
