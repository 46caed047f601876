use actix_web::web;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::auth::CredentialVerifier;
use crate::db::session_repository::SessionRepository;
use crate::db::user_repository::UserRepository;
use crate::inference::InferenceEngine;
use crate::prediction::{DeletionService, ImageService, PredictionPipeline, QueryService};
use crate::routes::configure_routes;
use crate::storage::{LocalStore, ObjectStore};

/// Every service a worker needs, built once and cloned into each `App`.
#[derive(Clone)]
pub struct AppServices {
    pub credentials: web::Data<CredentialVerifier>,
    pub pipeline: web::Data<PredictionPipeline>,
    pub queries: web::Data<QueryService>,
    pub deletions: web::Data<DeletionService>,
    pub images: web::Data<ImageService>,
}

impl AppServices {
    pub fn new(
        pool: SqlitePool,
        engine: InferenceEngine,
        local: LocalStore,
        remote: Option<Arc<dyn ObjectStore>>,
        recent_window_days: i64,
    ) -> Self {
        let sessions = SessionRepository::new(pool.clone());
        let users = UserRepository::new(pool);
        Self {
            credentials: web::Data::new(CredentialVerifier::new(users)),
            pipeline: web::Data::new(PredictionPipeline::new(
                engine,
                local.clone(),
                remote.clone(),
                sessions.clone(),
            )),
            queries: web::Data::new(QueryService::new(sessions.clone(), recent_window_days)),
            deletions: web::Data::new(DeletionService::new(
                sessions.clone(),
                local.clone(),
                remote.clone(),
            )),
            images: web::Data::new(ImageService::new(sessions, local, remote)),
        }
    }

    /// Registers the shared services and all routes on an `App`.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.credentials.clone())
            .app_data(self.pipeline.clone())
            .app_data(self.queries.clone())
            .app_data(self.deletions.clone())
            .app_data(self.images.clone())
            .configure(configure_routes);
    }
}
