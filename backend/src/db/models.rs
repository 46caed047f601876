use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{DetectionRecord, PredictionDetail, PredictionSummary};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub credential_secret: String,
}

/// Corresponds to the `prediction_sessions` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PredictionSession {
    pub uid: String,
    pub created_at: DateTime<Utc>,
    pub original_image_ref: String,
    pub annotated_image_ref: String,
    pub owner_user_id: Option<i64>,
}

/// Corresponds to the `detection_objects` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DetectionObject {
    pub id: i64,
    pub prediction_uid: String,
    pub label: String,
    pub score: f64,
    pub bbox: String,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub uid: String,
    pub created_at: DateTime<Utc>,
    pub original_image_ref: String,
    pub annotated_image_ref: String,
    pub owner_user_id: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionSummaryRow {
    pub uid: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct LabelCountRow {
    pub label: String,
    pub count: i64,
}

impl From<DetectionObject> for DetectionRecord {
    fn from(obj: DetectionObject) -> Self {
        Self {
            label: obj.label,
            score: obj.score,
            bbox: obj.bbox,
            prediction_uid: obj.prediction_uid,
        }
    }
}

impl From<SessionSummaryRow> for PredictionSummary {
    fn from(row: SessionSummaryRow) -> Self {
        Self {
            uid: row.uid,
            timestamp: row.created_at,
        }
    }
}

impl From<LabelCountRow> for shared::LabelCount {
    fn from(row: LabelCountRow) -> Self {
        Self {
            label: row.label,
            count: row.count,
        }
    }
}

impl PredictionSession {
    pub fn into_detail(self, detections: Vec<DetectionObject>) -> PredictionDetail {
        PredictionDetail {
            uid: self.uid,
            timestamp: self.created_at,
            original_image: self.original_image_ref,
            predicted_image: self.annotated_image_ref,
            detection_objects: detections.into_iter().map(DetectionRecord::from).collect(),
        }
    }
}
