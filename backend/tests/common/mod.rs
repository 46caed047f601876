#![allow(dead_code)]

use actix_web::body::BoxBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, Error};
use backend::auth::CredentialVerifier;
use backend::db;
use backend::db::user_repository::UserRepository;
use backend::inference::annotate::encode_image;
use backend::inference::labels::coco_vocabulary;
use backend::inference::{Detector, InferenceEngine, InferenceError, RawDetection};
use backend::state::AppServices;
use backend::storage::{LocalStore, ObjectStore, StorageError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::future::BoxFuture;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const BUCKET: &str = "test-bucket";
pub const BOUNDARY: &str = "----detectd-test-boundary";

pub const PERSON: usize = 0;
pub const CAT: usize = 15;
pub const DOG: usize = 16;

/// Returns the same detections for every image.
pub struct StubDetector {
    vocabulary: Vec<String>,
    detections: Vec<RawDetection>,
}

impl StubDetector {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self {
            vocabulary: coco_vocabulary(),
            detections,
        }
    }
}

impl Detector for StubDetector {
    fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    fn detect(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>, InferenceError> {
        Ok(self.detections.clone())
    }
}

pub fn raw(class_index: usize, confidence: f32) -> RawDetection {
    RawDetection {
        class_index,
        confidence,
        bbox: [10.0, 10.0, 60.0, 60.0],
    }
}

/// In-process bucket. Keys registered with `fail_on` answer with a transport error.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryObjectStore {
    pub fn put(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn fail_on(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(StorageError::Upstream(format!("connection reset while reading {}", key)));
        }
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        BUCKET
    }

    fn download_to<'a>(&'a self, key: &'a str, dest: &'a Path) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let bytes = self.fetch(key)?;
            tokio::fs::write(dest, bytes).await?;
            Ok(())
        })
    }

    fn upload_from<'a>(
        &'a self,
        src: &'a Path,
        key: &'a str,
        _content_type: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let bytes = tokio::fs::read(src).await?;
            self.put(key, bytes);
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>> {
        Box::pin(async move { self.fetch(key) })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        })
    }
}

pub struct TestContext {
    pub services: AppServices,
    pub pool: SqlitePool,
    pub local: LocalStore,
    pub remote: Arc<MemoryObjectStore>,
    pub upload_dir: TempDir,
}

impl TestContext {
    /// Fresh database with users `user:pass` and `other:secret`.
    pub async fn new(detections: Vec<RawDetection>) -> Self {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let verifier = CredentialVerifier::new(UserRepository::new(pool.clone()));
        verifier.ensure_seed_user("user", "pass").await.unwrap();
        verifier.register("other", "secret").await.unwrap();

        let upload_dir = tempfile::tempdir().unwrap();
        let local = LocalStore::new(upload_dir.path());
        local.init().await.unwrap();

        let remote = Arc::new(MemoryObjectStore::default());
        let engine = InferenceEngine::new(Box::new(StubDetector::new(detections)));
        let services = AppServices::new(
            pool.clone(),
            engine,
            local.clone(),
            Some(remote.clone() as Arc<dyn ObjectStore>),
            7,
        );
        Self {
            services,
            pool,
            local,
            remote,
            upload_dir,
        }
    }

    pub fn app(
        &self,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<BoxBody>,
            Error = Error,
            InitError = (),
        > + use<>,
    > {
        let services = self.services.clone();
        App::new().configure(move |cfg| services.configure(cfg))
    }

    pub async fn session_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM prediction_sessions")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub async fn detection_rows(&self, uid: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM detection_objects WHERE prediction_uid = ?")
            .bind(uid)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub async fn owner_of(&self, uid: &str) -> Option<i64> {
        sqlx::query_scalar("SELECT owner_user_id FROM prediction_sessions WHERE uid = ?")
            .bind(uid)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub async fn image_refs(&self, uid: &str) -> (String, String) {
        sqlx::query_as(
            "SELECT original_image_ref, annotated_image_ref FROM prediction_sessions WHERE uid = ?",
        )
        .bind(uid)
        .fetch_one(&self.pool)
        .await
        .unwrap()
    }
}

pub fn basic(username: &str, password: &str) -> (&'static str, String) {
    (
        "Authorization",
        format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password))),
    )
}

pub fn solid_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([40, 120, 200]));
    encode_image(&image, ImageFormat::Jpeg).unwrap()
}

pub fn solid_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([220, 180, 20]));
    encode_image(&image, ImageFormat::Png).unwrap()
}

pub fn multipart_body(filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> (&'static str, String) {
    ("Content-Type", format!("multipart/form-data; boundary={BOUNDARY}"))
}
