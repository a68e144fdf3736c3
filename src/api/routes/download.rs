//! Published snapshot downloads.
//!
//! The nested `{release: {study: {entity: records}}}` document is returned
//! gzipped as an attachment.

use super::{DownloadQuery, StudyPath};
use crate::api::AppState;
use crate::error::{Error, Result};
use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;

const DEFAULT_FILE_FORMAT: &str = "gz";

/// GET /download/:release_id - Published snapshot of a release
#[utoipa::path(
    get,
    path = "/download/{release_id}",
    tag = "downloads",
    params(
        ("release_id" = String, Path, description = "Release identifier"),
        ("file_format" = Option<String>, Query, description = "Attachment suffix (default: gz)")
    ),
    responses(
        (status = 200, description = "Gzipped JSON named {release_id}.json.{file_format}", content_type = "application/gzip"),
        (status = 400, description = "Invalid file_format", body = crate::error::ApiError),
        (status = 404, description = "Nothing published for the release", body = crate::error::ApiError)
    )
)]
pub async fn download_release(
    State(state): State<AppState>,
    Path(release_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    respond(&state, &release_id, None, query).await
}

/// GET /download/:release_id/:study_id - Published snapshot of one study
#[utoipa::path(
    get,
    path = "/download/{release_id}/{study_id}",
    tag = "downloads",
    params(
        ("release_id" = String, Path, description = "Release identifier"),
        ("study_id" = String, Path, description = "Study identifier"),
        ("file_format" = Option<String>, Query, description = "Attachment suffix (default: gz)")
    ),
    responses(
        (status = 200, description = "Gzipped JSON named {study_id}.json.{file_format}", content_type = "application/gzip"),
        (status = 400, description = "Invalid file_format", body = crate::error::ApiError),
        (status = 404, description = "Nothing published for the study", body = crate::error::ApiError)
    )
)]
pub async fn download_study(
    State(state): State<AppState>,
    Path(path): Path<StudyPath>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    respond(&state, &path.release_id, Some(&path.study_id), query).await
}

async fn respond(
    state: &AppState,
    release_id: &str,
    study_id: Option<&str>,
    query: DownloadQuery,
) -> Response {
    match gzipped(state, release_id, study_id, query).await {
        Ok((filename, bytes)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/gzip".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Collect the document and gzip it as `{id}.json.{file_format}`
async fn gzipped(
    state: &AppState,
    release_id: &str,
    study_id: Option<&str>,
    query: DownloadQuery,
) -> Result<(String, Vec<u8>)> {
    let file_format = query
        .file_format
        .unwrap_or_else(|| DEFAULT_FILE_FORMAT.to_string());
    // Lands in a header value
    if file_format.is_empty() || !file_format.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::Validation(format!(
            "file_format must be alphanumeric, got {:?}",
            file_format
        )));
    }

    let doc = state.snapshotter.download(release_id, study_id).await?;
    let json = serde_json::to_vec(&doc)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let bytes = encoder.finish()?;

    let filename = format!("{}.json.{}", study_id.unwrap_or(release_id), file_format);
    Ok((filename, bytes))
}
