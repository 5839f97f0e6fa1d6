//! Profile handlers

use crate::services::{InsertOutcome, Retrieved, Source};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use cachestore_core::{Profile, StoreError};

/// Insert a profile. The body is decoded regardless of `Content-Type`,
/// matching what existing clients send.
pub async fn add(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let profile: Profile = match serde_json::from_slice(&body) {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!("Rejected malformed profile: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    tracing::debug!("Decoded profile: {:?}", profile);

    match state.coordinator.insert(&profile).await {
        Ok(InsertOutcome::Stored) => StatusCode::OK,
        Ok(InsertOutcome::CacheDegraded) => StatusCode::SERVICE_UNAVAILABLE,
        Err(StoreError::Validation(e)) => {
            tracing::warn!("Rejected invalid profile {:?}: {}", profile.uid, e);
            StatusCode::BAD_REQUEST
        }
        Err(e) => {
            tracing::error!("Failed to insert profile {}: {}", profile.uid, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub async fn search(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Profile>, StatusCode> {
    tracing::debug!("Looking for uid: {} ...", key);

    match state.coordinator.retrieve(&key).await {
        Ok(Retrieved::Found { profile, source }) => {
            if source == Source::Durable {
                tracing::debug!("Served {} from database", key);
            }
            Ok(Json(profile))
        }
        Ok(Retrieved::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to retrieve profile {}: {}", key, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
