use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use super::types::{
    AppendUpdateRequest, CommentRequest, CreatePostRequest, DiagnoseRequest, DiagnoseResponse,
    ErrorResponse, LikeRequest, LikesResponse, SaveAnalysisRequest, SaveAnalysisResponse,
    ShareRequest,
};
use crate::diagnosis::{Analyzer, DiagnosisContext, DiagnosisSession, ImageInput};
use crate::model::Moderator;
use crate::store::{Comment, Post, SavedAnalysis, Store};
use crate::{Error, Result};

/// Sessions a client never finished are dropped after this long.
const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

pub struct SessionEntry {
    session: Arc<Mutex<DiagnosisSession>>,
    created_at: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub analyzer: Arc<dyn Analyzer>,
    pub moderator: Arc<dyn Moderator>,
    pub sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

type HandlerResult<T> = std::result::Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

pub async fn diagnose(
    State(state): State<AppState>,
    Json(request): Json<DiagnoseRequest>,
) -> HandlerResult<DiagnoseResponse> {
    let image = decode_image(&request.image, &request.mime_type).map_err(error_response)?;

    // Clone the session handle out of the map so the map lock is never held
    // across the model call; other sessions keep moving while this one
    // analyzes.
    let (session_id, session) = {
        let mut sessions = state.sessions.lock().await;
        sessions.retain(|_, entry| entry.created_at.elapsed() < SESSION_TTL);

        match &request.session_id {
            Some(id) => {
                let entry = sessions.get(id).ok_or_else(|| {
                    error_response(Error::SessionNotFound {
                        session_id: id.clone(),
                    })
                })?;
                (id.clone(), entry.session.clone())
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let context = DiagnosisContext {
                    language: request.language,
                    plant_hint: request.plant_type.clone(),
                };
                let entry = SessionEntry {
                    session: Arc::new(Mutex::new(DiagnosisSession::new(context))),
                    created_at: Instant::now(),
                };
                let session = entry.session.clone();
                sessions.insert(id.clone(), entry);
                info!("diagnosis session started: {}", id);
                (id, session)
            }
        }
    };

    let mut session = session.lock().await;
    let outcome = session
        .submit_image(image, state.analyzer.as_ref())
        .await
        .map_err(error_response)?;
    let phase = session.phase().as_str();

    if session.is_done() {
        state.sessions.lock().await.remove(&session_id);
        info!("diagnosis session finished: {}", session_id);
    }

    Ok(Json(DiagnoseResponse {
        session_id,
        phase,
        outcome,
    }))
}

pub async fn save_analysis(
    State(state): State<AppState>,
    Json(request): Json<SaveAnalysisRequest>,
) -> HandlerResult<SaveAnalysisResponse> {
    let id = state
        .store
        .save_analysis(
            &request.user_id,
            request.plant_type,
            request.main_image,
            request.macro_image,
            &request.diagnosis,
        )
        .await
        .map_err(error_response)?;

    Ok(Json(SaveAnalysisResponse { id }))
}

pub async fn list_analyses(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> HandlerResult<Vec<SavedAnalysis>> {
    let analyses = state
        .store
        .list_by_user(&user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(analyses))
}

pub async fn delete_analysis(
    State(state): State<AppState>,
    Path(analysis_id): Path<String>,
) -> std::result::Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .store
        .delete_analysis(&analysis_id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn append_update(
    State(state): State<AppState>,
    Path(analysis_id): Path<String>,
    Json(request): Json<AppendUpdateRequest>,
) -> HandlerResult<SavedAnalysis> {
    state
        .store
        .append_update(&analysis_id, request.note, request.image)
        .await
        .map_err(error_response)?;

    let analysis = state
        .store
        .get_analysis(&analysis_id)
        .await
        .map_err(error_response)?;
    Ok(Json(analysis))
}

pub async fn share_analysis(
    State(state): State<AppState>,
    Path(analysis_id): Path<String>,
    Json(request): Json<ShareRequest>,
) -> HandlerResult<Post> {
    let post = state
        .store
        .share_analysis(&analysis_id, &request.author_name)
        .await
        .map_err(error_response)?;
    Ok(Json(post))
}

pub async fn list_posts(State(state): State<AppState>) -> HandlerResult<Vec<Post>> {
    let posts = state.store.list_posts().await.map_err(error_response)?;
    Ok(Json(posts))
}

pub async fn create_post(
    State(state): State<AppState>,
    Json(request): Json<CreatePostRequest>,
) -> HandlerResult<Post> {
    let image = match &request.image {
        Some(payload) => Some(decode_image(payload, "image/jpeg").map_err(error_response)?),
        None => None,
    };

    let moderated_text = format!("{}\n{}", request.title, request.content);
    if !state
        .moderator
        .check_safety(&moderated_text, image.as_ref())
        .await
    {
        return Err(error_response(Error::ContentRejected));
    }

    let post = Post {
        id: Uuid::new_v4().to_string(),
        user_id: request.user_id,
        author_name: request.author_name,
        title: request.title,
        content: request.content,
        image: request.image,
        plant_type: request.plant_type,
        likes: Vec::new(),
        comments: Vec::new(),
        related_analysis_id: None,
        created_at: chrono::Utc::now(),
    };
    state.store.insert_post(&post).await.map_err(error_response)?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> std::result::Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .store
        .delete_post(&post_id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(request): Json<LikeRequest>,
) -> HandlerResult<LikesResponse> {
    let likes = state
        .store
        .toggle_like(&post_id, &request.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(LikesResponse { likes }))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(request): Json<CommentRequest>,
) -> HandlerResult<Post> {
    let comment = Comment::new(request.user_id, request.user_name, request.text);
    let post = state
        .store
        .add_comment(&post_id, comment)
        .await
        .map_err(error_response)?;
    Ok(Json(post))
}

/// Accepts bare base64 or a `data:image/...;base64,` URL, the two shapes
/// clients actually send.
fn decode_image(payload: &str, mime_type: &str) -> Result<ImageInput> {
    let encoded = match payload.split_once(',') {
        Some((_, rest)) => rest,
        None => payload,
    };
    let data = BASE64
        .decode(encoded.trim())
        .map_err(|err| Error::invalid_image(err.to_string()))?;
    if data.is_empty() {
        return Err(Error::invalid_image("empty image payload"));
    }
    Ok(ImageInput::new(data, mime_type))
}

fn error_response(err: Error) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        Error::SessionNotFound { .. }
        | Error::AnalysisNotFound { .. }
        | Error::PostNotFound { .. } => StatusCode::NOT_FOUND,
        Error::InvalidImage(_) => StatusCode::BAD_REQUEST,
        Error::InvalidTransition { .. } => StatusCode::CONFLICT,
        Error::ContentRejected => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("request failed: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
