use crate::error::AppError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path as AxumPath, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// Received files live in one flat directory: a name is a single segment
fn validate_name(name: &str) -> Result<(), AppError> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name == "."
        || name == ".."
    {
        return Err(AppError::BadRequest(format!("Invalid file name: {name:?}")));
    }
    Ok(())
}

fn content_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("heic") => "image/heic",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

async fn file_len(path: &Path) -> Result<Option<u64>, AppError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Internal(anyhow::anyhow!("Stat error: {}", e))),
    }
}

pub async fn head_file(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
) -> Result<Response, AppError> {
    validate_name(&name)?;

    match file_len(&state.file_path(&name)).await? {
        Some(len) => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_LENGTH, len.to_string()),
                (header::CONTENT_TYPE, content_type_for(&name).to_string()),
            ],
        )
            .into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
) -> Result<Response, AppError> {
    validate_name(&name)?;

    let path = state.file_path(&name);
    let len = file_len(&path)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{name} not found")))?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Open error: {}", e)))?;

    Ok((
        [
            (header::CONTENT_LENGTH, len.to_string()),
            (header::CONTENT_TYPE, content_type_for(&name).to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// Store the request body under `name`.
///
/// The body is written to a scratch file and renamed into place, so readers
/// never see a partial file.
pub async fn put_file(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
    headers: HeaderMap,
    request: Request,
) -> Result<StatusCode, AppError> {
    validate_name(&name)?;

    let dest_path = state.file_path(&name);
    let existed = file_len(&dest_path).await?.is_some();
    if existed && state.config.no_overwrite {
        return Err(AppError::Forbidden(
            "Overwriting existing files is not allowed.".into(),
        ));
    }

    let declared: Option<u64> = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    tracing::debug!(name = %name, declared = ?declared, "Receiving file");

    let partial = state.partial_path(&name);
    let written = match write_body(&partial, request).await {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };

    if let Some(expected) = declared {
        if expected != written {
            let _ = tokio::fs::remove_file(&partial).await;
            tracing::warn!(
                name = %name,
                expected,
                actual = written,
                "Size mismatch, upload discarded"
            );
            return Err(AppError::BadRequest(format!(
                "Content-Length {expected} does not match received {written} bytes"
            )));
        }
    }

    if let Err(e) = tokio::fs::rename(&partial, &dest_path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(AppError::Internal(anyhow::anyhow!("Rename error: {}", e)));
    }

    tracing::info!(name = %name, bytes = written, replaced = existed, "Stored file");
    Ok(if existed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::CREATED
    })
}

async fn write_body(path: &Path, request: Request) -> Result<u64, AppError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Create file error: {}", e)))?;

    let mut stream = request.into_body().into_data_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Read error: {}", e)))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Write error: {}", e)))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Flush error: {}", e)))?;

    Ok(written)
}
