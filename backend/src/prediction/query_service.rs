use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use shared::{DetectionRecord, LabelCount, PredictionDetail, PredictionSummary};

use super::{PredictionError, authorize};
use crate::auth::Identity;
use crate::db::session_repository::SessionRepository;
use crate::inference::labels::is_known_label;

/// Read-side filters over the prediction history.
#[derive(Clone)]
pub struct QueryService {
    sessions: SessionRepository,
    recent_window_days: i64,
}

impl QueryService {
    pub fn new(sessions: SessionRepository, recent_window_days: i64) -> Self {
        Self {
            sessions,
            recent_window_days,
        }
    }

    /// Sessions created inside the configured trailing window, across all owners.
    pub async fn count_recent(&self) -> Result<i64, PredictionError> {
        self.count_recent_days(self.recent_window_days).await
    }

    pub async fn count_recent_days(&self, window_days: i64) -> Result<i64, PredictionError> {
        let since = Utc::now() - Duration::days(window_days);
        Ok(self.sessions.count_since(since).await?)
    }

    pub async fn get_detail(
        &self,
        uid: &str,
        identity: &Identity,
    ) -> Result<PredictionDetail, PredictionError> {
        let session = authorize(self.sessions.get_by_uid(uid).await?, identity)?;
        let detections = self.sessions.detections_for(uid).await?;
        Ok(session.into_detail(detections))
    }

    pub async fn labels_for_owner(&self, owner_user_id: i64) -> Result<Vec<LabelCount>, PredictionError> {
        let rows = self.sessions.label_counts_for_owner(owner_user_id).await?;
        Ok(rows.into_iter().map(LabelCount::from).collect())
    }

    /// Inclusive on both ends; an inverted range is empty.
    pub async fn by_time_range(
        &self,
        owner_user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PredictionSummary>, PredictionError> {
        if end < start {
            return Ok(Vec::new());
        }
        let rows = self
            .sessions
            .sessions_in_range(owner_user_id, start, end)
            .await?;
        Ok(rows.into_iter().map(PredictionSummary::from).collect())
    }

    pub async fn by_label(
        &self,
        owner_user_id: i64,
        label: &str,
    ) -> Result<Vec<PredictionSummary>, PredictionError> {
        if !is_known_label(label) {
            return Err(PredictionError::Validation("Invalid label".to_string()));
        }
        let rows = self.sessions.sessions_with_label(owner_user_id, label).await?;
        Ok(rows.into_iter().map(PredictionSummary::from).collect())
    }

    pub async fn by_min_score(
        &self,
        owner_user_id: i64,
        min_score: f64,
    ) -> Result<Vec<DetectionRecord>, PredictionError> {
        if !min_score.is_finite() || !(0.0..=1.0).contains(&min_score) {
            return Err(PredictionError::Validation("Invalid score".to_string()));
        }
        let rows = self
            .sessions
            .detections_min_score(owner_user_id, min_score)
            .await?;
        Ok(rows.into_iter().map(DetectionRecord::from).collect())
    }
}

/// Accepts RFC 3339, or naive ISO-8601 date/date-time interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, PredictionError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(PredictionError::Validation(format!(
        "Invalid ISO-8601 timestamp: {}",
        raw
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_supported_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T12:30:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-05-01T14:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-05-01T12:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-05-01 12:30:00").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2024-05-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(PredictionError::Validation(_))
        ));
    }
}
