use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_llm::{Provider, UsageRecord};
use serde::{Deserialize, Serialize};

use crate::error::MetricsResult;
use crate::quota::{QuotaCounters, QuotaLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingContext {
    Message,
    Title,
}

impl BillingContext {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Title => "title",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingRecord {
    pub context: BillingContext,
    pub user: Option<String>,
    pub conversation_id: Option<String>,
    pub model: String,
    pub provider: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait BillingSink: Send + Sync {
    async fn record(&self, record: &BillingRecord) -> MetricsResult<()>;
}

/// Writes each record to the log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBillingSink;

#[async_trait]
impl BillingSink for LogBillingSink {
    async fn record(&self, record: &BillingRecord) -> MetricsResult<()> {
        log::info!(
            "[Billing] context={} model={} provider={} prompt={} completion={} user={} conversation={}",
            record.context.as_str(),
            record.model,
            record.provider,
            record.prompt_tokens,
            record.completion_tokens,
            record.user.as_deref().unwrap_or("-"),
            record.conversation_id.as_deref().unwrap_or("-"),
        );
        Ok(())
    }
}

/// Who a completion is billed to.
#[derive(Debug, Clone, Default)]
pub struct UsageOwner {
    pub user: Option<String>,
    pub conversation_id: Option<String>,
}

/// Bills every finished call and, for the cloud backend, feeds the quota
/// ledger. Neither step can fail the caller.
#[derive(Clone)]
pub struct UsageRecorder {
    billing: Arc<dyn BillingSink>,
    ledger: Option<Arc<QuotaLedger>>,
}

impl UsageRecorder {
    pub fn new(billing: Arc<dyn BillingSink>) -> Self {
        Self {
            billing,
            ledger: None,
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<QuotaLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn ledger(&self) -> Option<&Arc<QuotaLedger>> {
        self.ledger.as_ref()
    }

    /// Returns the updated quota counters when the call was tracked.
    pub async fn record(
        &self,
        context: BillingContext,
        owner: &UsageOwner,
        provider: &Provider,
        model: &str,
        usage: UsageRecord,
    ) -> Option<QuotaCounters> {
        let record = BillingRecord {
            context,
            user: owner.user.clone(),
            conversation_id: owner.conversation_id.clone(),
            model: model.to_string(),
            provider: provider.name().to_string(),
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            recorded_at: Utc::now(),
        };

        if let Err(e) = self.billing.record(&record).await {
            log::warn!("[UsageRecorder] Failed to record billing: {}", e);
        }

        match (provider, &self.ledger) {
            (Provider::Cloud { project_id, .. }, Some(ledger)) => {
                ledger
                    .record_usage(project_id, model, usage.input_tokens, usage.output_tokens)
                    .await
            }
            _ => None,
        }
    }
}
