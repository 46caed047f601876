use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use super::models::{
    DetectionObject, LabelCountRow, NewSession, PredictionSession, SessionSummaryRow,
};
use super::{RepositoryError, db_time};
use crate::inference::Detection;

/// Persistence boundary for prediction sessions and their detection objects.
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_session(
        conn: &mut SqliteConnection,
        session: &NewSession,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO prediction_sessions (uid, created_at, original_image_ref, annotated_image_ref, owner_user_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.uid)
        .bind(db_time(&session.created_at))
        .bind(&session.original_image_ref)
        .bind(&session.annotated_image_ref)
        .bind(session.owner_user_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn add_detection(
        conn: &mut SqliteConnection,
        uid: &str,
        detection: &Detection,
    ) -> Result<(), RepositoryError> {
        let bbox = bbox_text(&detection.bbox);
        sqlx::query(
            r#"
            INSERT INTO detection_objects (prediction_uid, label, score, bbox)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(uid)
        .bind(&detection.label)
        .bind(detection.score)
        .bind(bbox)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Writes the session row and all of its detections in one transaction.
    pub async fn record_prediction(
        &self,
        session: &NewSession,
        detections: &[Detection],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        Self::create_session(&mut tx, session).await?;
        for detection in detections {
            Self::add_detection(&mut tx, &session.uid, detection).await?;
        }
        tx.commit().await?;
        log::info!(
            "Stored prediction session {} with {} detections",
            session.uid,
            detections.len()
        );
        Ok(())
    }

    pub async fn get_by_uid(&self, uid: &str) -> Result<Option<PredictionSession>, RepositoryError> {
        let rec = sqlx::query_as::<_, PredictionSession>(
            r#"
            SELECT uid, created_at, original_image_ref, annotated_image_ref, owner_user_id
            FROM prediction_sessions WHERE uid = ?
            "#,
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    pub async fn detections_for(&self, uid: &str) -> Result<Vec<DetectionObject>, RepositoryError> {
        let rows = sqlx::query_as::<_, DetectionObject>(
            r#"
            SELECT id, prediction_uid, label, score, bbox
            FROM detection_objects WHERE prediction_uid = ?
            ORDER BY id
            "#,
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Removes the detections and then the session. Returns whether a session row was deleted.
    pub async fn delete_session_cascade(&self, uid: &str) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM detection_objects WHERE prediction_uid = ?")
            .bind(uid)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM prediction_sessions WHERE uid = ?")
            .bind(uid)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_since(&self, since: DateTime<Utc>) -> Result<i64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(uid) FROM prediction_sessions WHERE created_at >= ?")
                .bind(db_time(&since))
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn label_counts_for_owner(
        &self,
        owner_user_id: i64,
    ) -> Result<Vec<LabelCountRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, LabelCountRow>(
            r#"
            SELECT d.label AS label, COUNT(d.id) AS count
            FROM detection_objects d
            JOIN prediction_sessions s ON d.prediction_uid = s.uid
            WHERE s.owner_user_id = ?
            GROUP BY d.label
            ORDER BY d.label
            "#,
        )
        .bind(owner_user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn sessions_in_range(
        &self,
        owner_user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SessionSummaryRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, SessionSummaryRow>(
            r#"
            SELECT uid, created_at
            FROM prediction_sessions
            WHERE owner_user_id = ? AND created_at BETWEEN ? AND ?
            ORDER BY created_at
            "#,
        )
        .bind(owner_user_id)
        .bind(db_time(&start))
        .bind(db_time(&end))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn sessions_with_label(
        &self,
        owner_user_id: i64,
        label: &str,
    ) -> Result<Vec<SessionSummaryRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, SessionSummaryRow>(
            r#"
            SELECT DISTINCT s.uid AS uid, s.created_at AS created_at
            FROM prediction_sessions s
            JOIN detection_objects d ON d.prediction_uid = s.uid
            WHERE s.owner_user_id = ? AND d.label = ?
            ORDER BY s.created_at
            "#,
        )
        .bind(owner_user_id)
        .bind(label)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn detections_min_score(
        &self,
        owner_user_id: i64,
        min_score: f64,
    ) -> Result<Vec<DetectionObject>, RepositoryError> {
        let rows = sqlx::query_as::<_, DetectionObject>(
            r#"
            SELECT d.id AS id, d.prediction_uid AS prediction_uid, d.label AS label,
                   d.score AS score, d.bbox AS bbox
            FROM detection_objects d
            JOIN prediction_sessions s ON d.prediction_uid = s.uid
            WHERE s.owner_user_id = ? AND d.score >= ?
            ORDER BY d.id
            "#,
        )
        .bind(owner_user_id)
        .bind(min_score)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// `[x1, y1, x2, y2]`, each coordinate written with at least one decimal place.
fn bbox_text(bbox: &[f32; 4]) -> String {
    format!("{:?}", bbox)
}

#[cfg(test)]
mod tests {
    use super::bbox_text;

    #[test]
    fn bbox_is_stored_as_bracketed_list() {
        assert_eq!(bbox_text(&[10.0, 10.0, 60.0, 60.0]), "[10.0, 10.0, 60.0, 60.0]");
        assert_eq!(bbox_text(&[0.5, 12.25, 100.0, 7.0]), "[0.5, 12.25, 100.0, 7.0]");
    }
}
