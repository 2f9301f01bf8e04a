//! Encrypt → upload and fetch → decrypt flows with an observable state.

use std::sync::Arc;

use tokio::sync::watch;

use crate::access::AccessPolicy;
use crate::encryption::{DecodedBlob, EncryptedContainer, EncryptionProvider, FileInput};
use crate::error::{Result, ToolkitError};
use crate::gateway::Gateway;
use crate::node::StorageNode;
use crate::receipt::UploadReceipt;
use crate::tags;
use crate::uploader::Uploader;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Uploaded(UploadReceipt),
    Decoded(DecodedBlob),
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Encrypting,
    Uploading,
    Fetching,
    Decrypting,
    Done(Outcome),
    /// Message of the error that ended the run.
    Failed(String),
}

impl PipelineState {
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            PipelineState::Encrypting
                | PipelineState::Uploading
                | PipelineState::Fetching
                | PipelineState::Decrypting
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Encrypting => "encrypting",
            PipelineState::Uploading => "uploading",
            PipelineState::Fetching => "fetching",
            PipelineState::Decrypting => "decrypting",
            PipelineState::Done(_) => "done",
            PipelineState::Failed(_) => "failed",
        }
    }
}

pub struct Pipeline {
    provider: Arc<dyn EncryptionProvider>,
    uploader: Uploader,
    gateway: Arc<dyn Gateway>,
    state: watch::Sender<PipelineState>,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn EncryptionProvider>,
        node: Arc<dyn StorageNode>,
        gateway: Arc<dyn Gateway>,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            provider,
            uploader: Uploader::new(node),
            gateway,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    /// Encrypt `file` (under the provider's default policy unless one is
    /// given), fund the node if needed and upload the container.
    pub async fn encrypt_and_upload(
        &self,
        file: &FileInput,
        policy: Option<&AccessPolicy>,
    ) -> Result<UploadReceipt> {
        self.begin(PipelineState::Encrypting)?;
        let default_policy;
        let policy = match policy {
            Some(policy) => policy,
            None => {
                default_policy = self.provider.default_policy();
                &default_policy
            }
        };
        let result = async {
            let container = self.provider.encrypt(file, policy).await?;
            self.transition(PipelineState::Uploading);
            let tags = tags::encrypted_upload_tags(&file.content_type);
            self.uploader
                .upload_funded(container.as_bytes(), &tags)
                .await
        }
        .await;
        self.settle(result, Outcome::Uploaded)
    }

    /// Fetch `content_id` from the gateway and decrypt it. `content_type` is
    /// the original type recorded in the upload's tags.
    pub async fn fetch_and_decrypt(&self, content_id: &str, content_type: &str) -> Result<DecodedBlob> {
        self.begin(PipelineState::Fetching)?;
        let result = async {
            let blob = self.gateway.fetch(content_id).await?;
            self.transition(PipelineState::Decrypting);
            self.provider
                .decrypt(&EncryptedContainer::new(blob.bytes), content_type)
                .await
        }
        .await;
        self.settle(result, Outcome::Decoded)
    }

    fn begin(&self, first: PipelineState) -> Result<()> {
        let mut started = false;
        self.state.send_if_modified(|state| {
            if state.is_busy() {
                return false;
            }
            *state = first.clone();
            started = true;
            true
        });
        if !started {
            return Err(ToolkitError::validation(
                "another operation is already running",
            ));
        }
        tracing::info!(state = first.label(), provider = %self.provider.kind(), "pipeline started");
        Ok(())
    }

    fn transition(&self, next: PipelineState) {
        tracing::info!(state = next.label(), "pipeline stage");
        self.state.send_replace(next);
    }

    fn settle<T: Clone>(&self, result: Result<T>, wrap: fn(T) -> Outcome) -> Result<T> {
        match &result {
            Ok(value) => {
                self.state
                    .send_replace(PipelineState::Done(wrap(value.clone())));
                tracing::info!("pipeline done");
            }
            Err(err) => {
                tracing::warn!(error = %err, "pipeline failed");
                self.state.send_replace(PipelineState::Failed(err.to_string()));
            }
        }
        result
    }
}
