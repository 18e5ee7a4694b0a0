//! Results reported by the external plate recogniser.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use radarops_core::error::CoreError;
use radarops_db::repositories::CaptureRepo;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PlateReport {
    /// Image ref as recorded by the capture indexer.
    pub image_ref: String,
    pub plate_text: String,
    /// Recogniser confidence in percent.
    pub confidence: f32,
}

#[derive(Debug, Serialize)]
pub struct PlateRecorded {
    pub image_ref: String,
    pub plate_text: String,
    pub confidence: f32,
}

/// POST /api/v1/captures/plate
///
/// Attach a recognised plate to an indexed capture. Fines already written
/// are left as they are; violations correlated afterwards see the plate.
async fn record_plate(
    State(state): State<AppState>,
    Json(report): Json<PlateReport>,
) -> AppResult<Json<DataResponse<PlateRecorded>>> {
    let image_ref = report.image_ref.trim();
    let plate_text = report.plate_text.trim();
    if image_ref.is_empty() || plate_text.is_empty() {
        return Err(CoreError::Validation("image_ref and plate_text are required".into()).into());
    }
    if !(0.0..=100.0).contains(&report.confidence) {
        return Err(CoreError::Validation(format!(
            "confidence {} is not a percentage between 0 and 100",
            report.confidence
        ))
        .into());
    }

    let updated = CaptureRepo::set_plate(&state.pool, image_ref, plate_text, report.confidence).await?;
    if !updated {
        return Err(AppError::NotFound(format!("capture '{image_ref}' is not indexed")));
    }

    tracing::info!(
        image_ref,
        plate_text,
        confidence = report.confidence,
        "Plate recorded for capture",
    );

    Ok(Json(DataResponse {
        data: PlateRecorded {
            image_ref: image_ref.to_string(),
            plate_text: plate_text.to_string(),
            confidence: report.confidence,
        },
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/plate", post(record_plate))
}
