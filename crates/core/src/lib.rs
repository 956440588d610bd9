pub mod activity;
pub mod config;
pub mod errors;
pub mod expiry;

pub use activity::{
    ActivityEvent, Alert, AlertItem, AlertSeverity, RangePreset, SummaryMetrics, TimeRange,
};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use errors::{ApplicationError, InterfaceError};
pub use expiry::ExpiringMap;
