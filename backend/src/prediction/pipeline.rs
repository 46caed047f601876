use actix_web::web;
use chrono::Utc;
use shared::PredictResponse;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::ingest::{ImageSource, MaterializedImage, SourceKind, grouping_prefix};
use super::publish::AnnotationPublisher;
use super::PredictionError;
use crate::auth::Identity;
use crate::db::models::NewSession;
use crate::db::session_repository::SessionRepository;
use crate::inference::{Detection, InferenceEngine};
use crate::storage::{ImageLocator, LocalStore, ObjectStore};

#[derive(Debug, Clone)]
pub struct PredictRequest {
    pub source: ImageSource,
    pub chat_id: Option<String>,
    pub identity: Option<Identity>,
}

/// resolve source -> infer -> publish annotation -> persist.
#[derive(Clone)]
pub struct PredictionPipeline {
    engine: InferenceEngine,
    local: LocalStore,
    remote: Option<Arc<dyn ObjectStore>>,
    publisher: AnnotationPublisher,
    sessions: SessionRepository,
}

impl PredictionPipeline {
    pub fn new(
        engine: InferenceEngine,
        local: LocalStore,
        remote: Option<Arc<dyn ObjectStore>>,
        sessions: SessionRepository,
    ) -> Self {
        let publisher = AnnotationPublisher::new(local.clone(), remote.clone());
        Self {
            engine,
            local,
            remote,
            publisher,
            sessions,
        }
    }

    pub async fn predict(&self, request: PredictRequest) -> Result<PredictResponse, PredictionError> {
        let start = Instant::now();
        let uid = Uuid::new_v4().to_string();
        let prefix = grouping_prefix(request.chat_id.as_deref(), request.identity.as_ref());
        let owner_user_id = request.identity.as_ref().map(|i| i.user_id);

        let image = request
            .source
            .materialize(&uid, &self.local, self.remote.as_deref())
            .await?;

        let detections = match self.process(&image, &prefix, owner_user_id).await {
            Ok(detections) => detections,
            Err(e) => {
                log::error!("Prediction {} failed: {}", uid, e);
                LocalStore::remove_quietly(&image.local_path).await;
                return Err(e);
            }
        };

        let time_took = (start.elapsed().as_secs_f64() * 100.0).round() / 100.0;
        log::info!(
            "Prediction {} finished with {} detections in {:.2}s",
            uid,
            detections.len(),
            time_took
        );
        Ok(PredictResponse {
            prediction_uid: uid,
            detection_count: detections.len(),
            labels: detections.into_iter().map(|d| d.label).collect(),
            time_took,
        })
    }

    async fn process(
        &self,
        image: &MaterializedImage,
        prefix: &str,
        owner_user_id: Option<i64>,
    ) -> Result<Vec<Detection>, PredictionError> {
        let engine = self.engine.clone();
        let path = image.local_path.clone();
        let output = web::block(move || engine.run(&path))
            .await
            .map_err(|e| PredictionError::Blocking(e.to_string()))??;

        let annotated_ref = self.publisher.publish(&output.annotated, image, prefix).await?;
        let original_ref = match &image.source {
            SourceKind::Local => image.local_path.to_string_lossy().into_owned(),
            SourceKind::Remote { key } => match self.remote.as_deref() {
                Some(store) => ImageLocator::remote_uri(store.bucket(), key),
                None => key.clone(),
            },
        };

        let session = NewSession {
            uid: image.uid.clone(),
            created_at: Utc::now(),
            original_image_ref: original_ref,
            annotated_image_ref: annotated_ref,
            owner_user_id,
        };
        self.sessions
            .record_prediction(&session, &output.detections)
            .await?;
        Ok(output.detections)
    }
}
