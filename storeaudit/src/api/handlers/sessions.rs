//! Store-code login.

use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::sessions::{SessionCreate, SessionResponse},
    errors::{Error, Result},
};

/// Resolve a store code to the manager its captures are attributed to.
#[tracing::instrument(skip_all)]
pub async fn create_session(State(state): State<AppState>, Json(request): Json<SessionCreate>) -> Result<Json<SessionResponse>> {
    let store_code = request.store_code.trim();
    if store_code.is_empty() {
        return Err(Error::BadRequest {
            message: "store_code is required".to_string(),
        });
    }

    let entry = state
        .roster
        .lookup(store_code)
        .await?
        .ok_or_else(|| Error::InvalidStoreCode {
            store_code: store_code.to_string(),
        })?;

    Ok(Json(entry.into()))
}

#[cfg(test)]
mod tests {
    use crate::api::models::sessions::SessionResponse;
    use crate::test_utils::create_test_app;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_known_store_code_starts_session() {
        let ctx = create_test_app(&["model-a"]).await;

        let response = ctx.server.post("/api/v1/sessions").json(&json!({ "store_code": " S042 " })).await;

        response.assert_status(StatusCode::OK);
        let session: SessionResponse = response.json();
        assert_eq!(
            session,
            SessionResponse {
                store_code: "S042".to_string(),
                manager_name: "Asha Rao".to_string(),
                group_id: Some("North-1".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_store_code_is_invalid() {
        let ctx = create_test_app(&["model-a"]).await;

        let response = ctx.server.post("/api/v1/sessions").json(&json!({ "store_code": "S999" })).await;

        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.text(), "Invalid Code");
    }

    #[tokio::test]
    async fn test_blank_store_code_is_rejected() {
        let ctx = create_test_app(&["model-a"]).await;

        let response = ctx.server.post("/api/v1/sessions").json(&json!({ "store_code": "  " })).await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }
}
