use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Storage area an image lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Original,
    Predicted,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictResponse {
    pub prediction_uid: String,
    pub detection_count: usize,
    pub labels: Vec<String>,
    pub time_took: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectionRecord {
    pub label: String,
    pub score: f64,
    #[serde(rename = "box")]
    pub bbox: String,
    pub prediction_uid: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictionDetail {
    pub uid: String,
    pub timestamp: DateTime<Utc>,
    pub original_image: String,
    pub predicted_image: String,
    pub detection_objects: Vec<DetectionRecord>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictionSummary {
    pub uid: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeleteResponse {
    pub detail: String,
    pub uid: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}
