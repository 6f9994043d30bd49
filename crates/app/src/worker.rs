use lammy_core::{AnalysisError, AnalysisResult, EssayRequest, FeedbackPipeline};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

struct Job {
    request: EssayRequest,
    reply: oneshot::Sender<Result<AnalysisResult, AnalysisError>>,
}

/// Queue in front of the single task that owns the pipeline. Jobs run one at a time.
#[derive(Clone)]
pub struct PipelineHandle {
    sender: mpsc::Sender<Job>,
}

impl PipelineHandle {
    pub fn spawn(pipeline: FeedbackPipeline, queue_depth: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Job>(queue_depth.max(1));

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let result = pipeline.run(job.request).await;
                if let Err(error) = &result {
                    warn!(error = %error, "analysis failed");
                }
                if job.reply.send(result).is_err() {
                    warn!("submitter went away before the analysis finished");
                }
            }
            info!("pipeline worker stopped");
        });

        Self { sender }
    }

    pub async fn submit(&self, request: EssayRequest) -> Result<AnalysisResult, AnalysisError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Job { request, reply })
            .await
            .map_err(|_| AnalysisError::Worker("pipeline worker has stopped".to_string()))?;

        response
            .await
            .map_err(|_| AnalysisError::Worker("pipeline worker dropped the job".to_string()))?
    }
}
