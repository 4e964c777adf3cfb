use crate::app_state::SharedState;
use crate::library::{discover, LibraryError};
use crate::stream::stream_video;
use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lockstep_core::{Video, VideoId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct VideoQuery {
    #[serde(rename = "videoID")]
    pub video_id: Option<u64>,
}

/// `GET /videos` lists the library; `GET /videos?videoID=N` streams one file.
pub async fn videos(
    State(state): State<SharedState>,
    Query(query): Query<VideoQuery>,
    req: Request,
) -> Response {
    let Some(id) = query.video_id.map(VideoId) else {
        return Json(state.library.read().await.videos()).into_response();
    };

    let path = state.library.read().await.path_of(id).map(|p| p.to_path_buf());
    match path {
        Some(path) => stream_video(&path, req).await,
        None => (StatusCode::NOT_FOUND, "Unknown video").into_response(),
    }
}

/// `GET /scan` rediscovers the media directory and returns the new list.
pub async fn scan(State(state): State<SharedState>) -> Response {
    match rescan(&state).await {
        Ok(videos) => Json(videos).into_response(),
        Err(err) => {
            tracing::error!("Scan failed: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Scan failed").into_response()
        }
    }
}

pub async fn rescan(state: &SharedState) -> Result<Vec<Video>, LibraryError> {
    let root = state.library.read().await.root().to_path_buf();
    let found = discover(&root).await?;

    let mut library = state.library.write().await;
    library.merge(found);
    let videos = library.videos();
    tracing::info!("Scan of {} found {} videos", root.display(), videos.len());
    Ok(videos)
}
