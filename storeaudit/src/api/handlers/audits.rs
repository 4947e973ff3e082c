//! Photo submission.

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use bytes::Bytes;

use crate::{
    AppState,
    api::models::audits::AuditResponse,
    errors::{Error, Result},
    types::Capture,
};

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge {
            message: "Photo exceeds the maximum upload size".to_string(),
        }
    } else {
        Error::BadRequest {
            message: format!("Failed to parse multipart data: {}", e.body_text()),
        }
    }
}

/// Submit one photo for audit.
///
/// Multipart fields: `store_code` (text) and `photo` (image file). Returns 201 with the
/// recorded verdict, including system-error verdicts where no model answered. A record that
/// could not be saved is a 502 with `outcome: not_saved`.
#[tracing::instrument(skip_all)]
pub async fn submit_audit(State(state): State<AppState>, mut multipart: Multipart) -> Result<(StatusCode, Json<AuditResponse>)> {
    let mut store_code: Option<String> = None;
    let mut photo: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "store_code" => store_code = Some(field.text().await.map_err(multipart_error)?.trim().to_string()),
            "photo" => photo = Some(field.bytes().await.map_err(multipart_error)?),
            other => tracing::debug!(field = other, "Ignoring unexpected multipart field"),
        }
    }

    let store_code = store_code.filter(|c| !c.is_empty()).ok_or_else(|| Error::BadRequest {
        message: "store_code is required".to_string(),
    })?;
    let photo = photo.filter(|p| !p.is_empty()).ok_or_else(|| Error::BadRequest {
        message: "photo is required".to_string(),
    })?;

    let entry = state
        .roster
        .lookup(&store_code)
        .await?
        .ok_or_else(|| Error::InvalidStoreCode { store_code: store_code.clone() })?;

    tracing::info!(store_code = %entry.store_code, photo_len = photo.len(), "Audit submission received");

    let capture = Capture::now(photo, entry.actor());
    let submission = state.pipeline.submit(capture, &state.shutdown.child_token()).await?;

    Ok((StatusCode::CREATED, Json(submission.into())))
}
