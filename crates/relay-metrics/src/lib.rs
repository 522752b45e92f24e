pub mod billing;
pub mod cost;
pub mod error;
pub mod quota;

pub use billing::{BillingContext, BillingRecord, BillingSink, LogBillingSink, UsageOwner, UsageRecorder};
pub use cost::{CostEstimate, CostEstimator, ModelPrice};
pub use error::{MetricsError, MetricsResult};
pub use quota::{evaluate, QuotaCounters, QuotaGauge, QuotaLedger, QuotaStatus, QuotaStores};
