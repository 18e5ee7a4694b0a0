//! Plate recogniser results posted against indexed captures.

mod common;

use axum::http::StatusCode;
use chrono::{TimeZone, Utc};
use common::{body_json, post_json, test_ingest, unreachable_pool};
use radarops_core::ports::NewCapture;
use radarops_db::repositories::CaptureRepo;
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../db/migrations")]
async fn plate_is_attached_to_indexed_capture(pool: PgPool) {
    let captured_at = Utc.with_ymd_and_hms(2025, 9, 30, 14, 8, 46).unwrap();
    CaptureRepo::insert_if_new(
        &pool,
        &NewCapture {
            image_ref: "radar4/20250930140846.jpg".to_string(),
            radar_id: Some(4),
            captured_at,
        },
    )
    .await
    .unwrap();
    let app = common::build_test_app(pool.clone(), test_ingest());

    let response = post_json(
        app,
        "/api/v1/captures/plate",
        json!({
            "image_ref": "radar4/20250930140846.jpg",
            "plate_text": " KA01AB1234 ",
            "confidence": 91.5,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["plate_text"], "KA01AB1234");

    let rows = CaptureRepo::find_in_window(&pool, captured_at, captured_at)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].plate_text.as_deref(), Some("KA01AB1234"));
    assert_eq!(rows[0].confidence, Some(91.5));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_capture_is_not_found(pool: PgPool) {
    let app = common::build_test_app(pool, test_ingest());

    let response = post_json(
        app,
        "/api/v1/captures/plate",
        json!({ "image_ref": "nowhere.jpg", "plate_text": "AB12", "confidence": 80.0 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn invalid_report_is_rejected_before_touching_the_database() {
    for report in [
        json!({ "image_ref": "a.jpg", "plate_text": "  ", "confidence": 80.0 }),
        json!({ "image_ref": "", "plate_text": "AB12", "confidence": 80.0 }),
        json!({ "image_ref": "a.jpg", "plate_text": "AB12", "confidence": 140.0 }),
    ] {
        let app = common::build_test_app(unreachable_pool(), test_ingest());
        let response = post_json(app, "/api/v1/captures/plate", report).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    }
}
