use actix_files::NamedFile;
use actix_multipart::Multipart;
use actix_web::http::header::{self, Accept, Header};
use actix_web::{HttpRequest, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use shared::{CountResponse, DeleteResponse, HealthResponse, ImageKind};
use std::str::FromStr;

use crate::auth::{AuthenticatedUser, MaybeUser};
use crate::error::ApiError;
use crate::prediction::query_service::parse_timestamp;
use crate::prediction::{
    DeletionService, ImageBody, ImageService, ImageSource, PredictRequest, PredictionError,
    PredictionPipeline, QueryService,
};

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    pub img: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TimeRangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Static paths under `/prediction/` are registered before `/prediction/{uid}`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/prediction/count").route(web::get().to(count_recent)))
        .service(web::resource("/prediction/labels").route(web::get().to(labels_for_caller)))
        .service(web::resource("/prediction/time").route(web::get().to(by_time_range)))
        .service(
            web::resource("/prediction/{uid}")
                .route(web::get().to(get_prediction))
                .route(web::delete().to(delete_prediction)),
        )
        .service(web::resource("/prediction/{uid}/image").route(web::get().to(annotated_image)))
        .service(web::resource("/predictions/label/{label}").route(web::get().to(by_label)))
        .service(web::resource("/predictions/score/{min_score}").route(web::get().to(by_min_score)))
        .service(web::resource("/image/{kind}/{filename}").route(web::get().to(stored_image)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn predict(
    pipeline: web::Data<PredictionPipeline>,
    user: MaybeUser,
    query: web::Query<PredictQuery>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let PredictQuery { img, chat_id } = query.into_inner();
    let source = match img.filter(|key| !key.is_empty()) {
        Some(key) => ImageSource::RemoteObject { key },
        None => read_upload(payload).await?,
    };
    log::info!(
        "Prediction requested by {} from {}",
        user.0
            .as_ref()
            .map(|identity| identity.username.as_str())
            .unwrap_or("anonymous"),
        match &source {
            ImageSource::LocalUpload { filename, .. } => format!("upload {}", filename),
            ImageSource::RemoteObject { key } => format!("remote key {}", key),
        }
    );

    let response = pipeline
        .predict(PredictRequest {
            source,
            chat_id,
            identity: user.0,
        })
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Reads the first multipart field carrying a file name.
async fn read_upload(mut payload: Multipart) -> Result<ImageSource, PredictionError> {
    loop {
        let mut field = match payload.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(PredictionError::MissingInput),
            Err(e) => {
                log::debug!("No readable multipart body: {}", e);
                return Err(PredictionError::MissingInput);
            }
        };
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let Some(filename) = filename else {
            continue;
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| {
                PredictionError::Validation(format!("Failed to read upload: {}", e))
            })?;
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(PredictionError::Validation("Uploaded file is empty".to_string()));
        }
        return Ok(ImageSource::LocalUpload { filename, bytes });
    }
}

async fn count_recent(
    queries: web::Data<QueryService>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let count = queries.count_recent().await?;
    Ok(HttpResponse::Ok().json(CountResponse { count }))
}

async fn labels_for_caller(
    queries: web::Data<QueryService>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let labels = queries.labels_for_owner(user.0.user_id).await?;
    Ok(HttpResponse::Ok().json(labels))
}

async fn by_time_range(
    queries: web::Data<QueryService>,
    user: AuthenticatedUser,
    query: web::Query<TimeRangeQuery>,
) -> Result<HttpResponse, ApiError> {
    let TimeRangeQuery { start, end } = query.into_inner();
    let (Some(start), Some(end)) = (start, end) else {
        return Err(ApiError::Validation(
            "Both start and end query parameters are required".to_string(),
        ));
    };
    let start = parse_timestamp(&start)?;
    let end = parse_timestamp(&end)?;
    let sessions = queries.by_time_range(user.0.user_id, start, end).await?;
    Ok(HttpResponse::Ok().json(sessions))
}

async fn get_prediction(
    queries: web::Data<QueryService>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let detail = queries.get_detail(&path.into_inner(), &user.0).await?;
    Ok(HttpResponse::Ok().json(detail))
}

async fn delete_prediction(
    deletions: web::Data<DeletionService>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let uid = path.into_inner();
    deletions.delete(&uid, &user.0).await?;
    Ok(HttpResponse::Ok().json(DeleteResponse {
        detail: "Successfully deleted".to_string(),
        uid,
    }))
}

async fn by_label(
    queries: web::Data<QueryService>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let sessions = queries.by_label(user.0.user_id, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(sessions))
}

async fn by_min_score(
    queries: web::Data<QueryService>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let min_score = path
        .into_inner()
        .parse::<f64>()
        .map_err(|_| ApiError::Validation("Invalid score".to_string()))?;
    let detections = queries.by_min_score(user.0.user_id, min_score).await?;
    Ok(HttpResponse::Ok().json(detections))
}

async fn stored_image(
    images: web::Data<ImageService>,
    user: AuthenticatedUser,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let (kind, filename) = path.into_inner();
    let kind = ImageKind::from_str(&kind)
        .map_err(|_| ApiError::Validation("Invalid image type".to_string()))?;
    let file = images.stored_image(kind, &filename, &user.0).await?;
    let file = NamedFile::open_async(&file).await.map_err(|e| {
        log::error!("Failed to open {}: {}", file.display(), e);
        ApiError::NotFound("Image not found".to_string())
    })?;
    Ok(file.into_response(&req))
}

async fn annotated_image(
    images: web::Data<ImageService>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let accept = Accept::parse(&req).ok();
    let served = images
        .annotated_image(&path.into_inner(), &user.0, accept.as_ref())
        .await?;

    match served.body {
        ImageBody::File(file) => {
            let file = NamedFile::open_async(&file).await.map_err(|e| {
                log::error!("Failed to open {}: {}", file.display(), e);
                ApiError::NotFound("Image not found".to_string())
            })?;
            let mut response = file.into_response(&req);
            if let Ok(value) = header::HeaderValue::from_str(served.content_type) {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            Ok(response)
        }
        ImageBody::Bytes(bytes) => Ok(HttpResponse::Ok()
            .content_type(served.content_type)
            .body(bytes)),
    }
}
