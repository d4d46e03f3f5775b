//! FIFO executor serializing LLM completion calls across the whole process (§4.2).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{LlmClient, LlmRequest, StreamChunk};
use crate::error::WorldError;

const TIMEOUT: Duration = Duration::from_secs(15 * 60);
const WARNING_FRACTION: f64 = 0.5;

struct Job {
    client: Arc<dyn LlmClient>,
    request: LlmRequest,
    cancel: CancellationToken,
    out: mpsc::UnboundedSender<StreamChunk>,
}

/// A single FIFO executor per process. Requests submitted via [`LlmQueue::enqueue`]
/// run strictly in submission order; a request cancelled before its turn is skipped
/// without affecting downstream requests.
pub struct LlmQueue {
    jobs_tx: mpsc::UnboundedSender<Job>,
    // Kept alive only so the worker task's receiver isn't dropped when the last
    // `LlmQueue` clone goes away mid-shutdown; the worker owns the actual receiver.
    _worker: Arc<Mutex<()>>,
}

impl LlmQueue {
    pub fn new() -> Self {
        let (jobs_tx, mut jobs_rx) = mpsc::unbounded_channel::<Job>();
        let worker_guard = Arc::new(Mutex::new(()));

        tokio::spawn(async move {
            while let Some(job) = jobs_rx.recv().await {
                if job.cancel.is_cancelled() {
                    let _ = job.out.send(StreamChunk::Error {
                        message: "cancelled before execution".to_string(),
                    });
                    continue;
                }
                run_job(job).await;
            }
        });

        LlmQueue {
            jobs_tx,
            _worker: worker_guard,
        }
    }

    /// Enqueues `request`; returns a receiver of `StreamChunk`s in `start, chunk*,
    /// (end|error)` order.
    pub fn enqueue(
        &self,
        client: Arc<dyn LlmClient>,
        request: LlmRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamChunk>, WorldError> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let job = Job {
            client,
            request,
            cancel,
            out: out_tx,
        };
        self.jobs_tx
            .send(job)
            .map_err(|_| WorldError::Fatal("llm queue worker not running".to_string()))?;
        Ok(out_rx)
    }
}

impl Default for LlmQueue {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_job(job: Job) {
    let Job {
        client,
        request,
        cancel,
        out,
    } = job;

    let stream_result = client.invoke_stream(request, cancel.clone()).await;
    let mut upstream = match stream_result {
        Ok(rx) => rx,
        Err(e) => {
            let _ = out.send(StreamChunk::Error { message: e.to_string() });
            return;
        }
    };

    let started = tokio::time::Instant::now();
    let warn_after = Duration::from_secs_f64(TIMEOUT.as_secs_f64() * WARNING_FRACTION);
    let deadline = started + TIMEOUT;
    let mut warning = Box::pin(tokio::time::sleep_until(started + warn_after));
    let mut warned = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = out.send(StreamChunk::Error { message: "cancelled".to_string() });
                return;
            }
            _ = tokio::time::sleep_until(deadline) => {
                let _ = out.send(StreamChunk::Error { message: "llm request timed out after 15 minutes".to_string() });
                return;
            }
            _ = &mut warning, if !warned => {
                warned = true;
                warn!(elapsed_secs = started.elapsed().as_secs(), "llm request at 50% of its 15-minute timeout");
            }
            chunk = upstream.recv() => {
                match chunk {
                    Some(c) => {
                        let is_terminal = matches!(c, StreamChunk::End { .. } | StreamChunk::Error { .. });
                        if out.send(c).is_err() {
                            return;
                        }
                        if is_terminal {
                            return;
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::mock::MockLlmClient;
    use crate::llm::{LlmMessage, ToolChoiceMode};
    use crate::model::Role;

    fn req(content: &str) -> LlmRequest {
        LlmRequest {
            provider: "mock".into(),
            model: "mock-1".into(),
            messages: vec![LlmMessage {
                role: Role::User,
                content: content.into(),
                tool_calls: vec![],
                tool_call_id: None,
            }],
            tools: vec![],
            tool_choice: ToolChoiceMode::Auto,
            temperature: None,
            max_tokens: None,
            stream: true,
        }
    }

    #[tokio::test]
    async fn enqueue_streams_start_chunk_end() {
        let queue = LlmQueue::new();
        let client: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_reply("hello"));
        let mut rx = queue
            .enqueue(client, req("hi"), CancellationToken::new())
            .unwrap();

        let mut chunks = Vec::new();
        while let Some(c) = rx.recv().await {
            let is_end = matches!(c, StreamChunk::End { .. } | StreamChunk::Error { .. });
            chunks.push(c);
            if is_end {
                break;
            }
        }
        assert!(matches!(chunks[0], StreamChunk::Start));
        assert!(matches!(chunks.last().unwrap(), StreamChunk::End { .. }));
    }

    #[tokio::test]
    async fn cancelled_before_execution_yields_error() {
        let queue = LlmQueue::new();
        let client: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_reply("hello"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rx = queue.enqueue(client, req("hi"), cancel).unwrap();
        let chunk = rx.recv().await.unwrap();
        assert!(matches!(chunk, StreamChunk::Error { .. }));
    }

    #[tokio::test]
    async fn requests_complete_in_enqueue_order() {
        let queue = LlmQueue::new();
        let client: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_reply("x"));
        let mut rx1 = queue
            .enqueue(client.clone(), req("first"), CancellationToken::new())
            .unwrap();
        let mut rx2 = queue
            .enqueue(client, req("second"), CancellationToken::new())
            .unwrap();

        // Both complete; order of completion for a single-worker FIFO matches
        // enqueue order because the worker processes one job to completion at a
        // time.
        while rx1.recv().await.is_some() {}
        assert!(rx2.recv().await.is_some());
    }
}
