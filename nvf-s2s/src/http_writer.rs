//! HTTP audit writer: delivers WAL batches to the audit ingestion endpoint
//! through the S2S client.
//!
//! 5xx and transport failures retry in place with a fixed backoff; 4xx is a
//! permanent rejection and surfaces immediately.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use tracing::warn;

use nvf_wal::{AuditBlob, Writer, WriterError};

use crate::client::{CallParams, SvcClient};
use crate::error::S2sError;

const DEFAULT_ATTEMPTS: usize = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

pub struct HttpWriter {
    client: Arc<SvcClient>,
    env: String,
    slug: String,
    major_version: u16,
    dto_type: String,
    op: String,
    attempts: usize,
    backoff: Duration,
}

impl HttpWriter {
    /// Writer posting to `<slug>@v<version>` via the structured path
    /// `/<dto_type>/<op>`.
    pub fn new(
        client: Arc<SvcClient>,
        env: impl Into<String>,
        slug: impl Into<String>,
        major_version: u16,
    ) -> Self {
        Self {
            client,
            env: env.into(),
            slug: slug.into(),
            major_version,
            dto_type: "entries".to_string(),
            op: "ingest".to_string(),
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_operation(mut self, dto_type: impl Into<String>, op: impl Into<String>) -> Self {
        self.dto_type = dto_type.into();
        self.op = op.into();
        self
    }

    pub fn with_retry(mut self, attempts: usize, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    async fn post_once(&self, batch: &[AuditBlob]) -> Result<(), S2sError> {
        let params = CallParams::get(&self.env, &self.slug, self.major_version)
            .structured(&self.dto_type, &self.op)
            .method(Method::POST)
            .json_body(serde_json::json!({ "entries": batch }));
        self.client.call(params).await.map(|_| ())
    }
}

impl Writer for HttpWriter {
    fn write_batch<'a>(
        &'a self,
        batch: &'a [AuditBlob],
    ) -> Pin<Box<dyn Future<Output = Result<(), WriterError>> + Send + 'a>> {
        Box::pin(async move {
            let mut last = String::new();
            for attempt in 1..=self.attempts {
                match self.post_once(batch).await {
                    Ok(()) => return Ok(()),
                    Err(S2sError::UpstreamNon2xx { status, snippet, .. })
                        if (400..500).contains(&status) =>
                    {
                        return Err(WriterError::Permanent(format!(
                            "audit ingestion rejected batch with {status}: {snippet}"
                        )));
                    }
                    Err(err) => {
                        warn!(attempt, error = %err, "audit ingestion attempt failed");
                        last = err.to_string();
                        if attempt < self.attempts {
                            tokio::time::sleep(self.backoff).await;
                        }
                    }
                }
            }
            Err(WriterError::Transient(last))
        })
    }
}
