use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use super::common::*;
use crate::traffic::router::traffic_router;

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("valid request")
}

fn seeded() -> Harness {
    let h = harness(beaches());
    h.signals.set_score("hyeopjae", 88.0);
    h.signals.set_score("gwakji", 45.0);
    h.signals.set_score("iho", 30.0);
    h.signals.set_score("hamdeok", 72.0);
    h.signals.set_score("folk-village", 10.0);
    h
}

#[tokio::test]
async fn congestion_table_carries_refresh_hint() {
    let h = seeded();
    let response = traffic_router(Arc::clone(&h.engine))
        .oneshot(get("/api/v1/congestion"))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["refresh_interval_ms"], 10_000);
    let scores = body["scores"].as_array().expect("scores array");
    assert_eq!(scores.len(), 5);
    assert_eq!(scores[0]["spot_id"], "hyeopjae");
    assert_eq!(scores[0]["level"], "RED");
    assert!(scores[0]["factors"]["parking_score"].is_number());
    assert_eq!(scores[0]["prediction"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn single_score_lookup_and_unknown_spot() {
    let h = seeded();
    let app = traffic_router(Arc::clone(&h.engine));

    let response = app
        .clone()
        .oneshot(get("/api/v1/congestion/iho"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["score"], 30);
    assert_eq!(body["level"], "GREEN");

    let response = app
        .oneshot(get("/api/v1/congestion/atlantis"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("atlantis"));
}

#[tokio::test]
async fn stats_route_aggregates_table() {
    let h = seeded();
    h.engine.refresh_all();

    let response = traffic_router(Arc::clone(&h.engine))
        .oneshot(get("/api/v1/congestion/stats?region=jeju"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["total_spots"], 5);
    assert_eq!(body["by_level"]["red"], 1);
    assert_eq!(body["busiest_spot"], "hyeopjae");
}

#[tokio::test]
async fn reroute_route_returns_alternatives() {
    let h = seeded();
    let response = traffic_router(Arc::clone(&h.engine))
        .oneshot(get("/api/v1/reroute?destination=Hyeopjae%20Beach"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["should_reroute"], true);
    assert_eq!(body["alternatives"][0]["suggested_spot"]["id"], "iho");
    assert_eq!(body["alternatives"][0]["crowd_score"], 30);
    assert_eq!(body["policy"]["gate_parking_bookings"], true);
}

#[tokio::test]
async fn reroute_route_requires_complete_origin() {
    let h = seeded();
    let response = traffic_router(Arc::clone(&h.engine))
        .oneshot(get("/api/v1/reroute?destination=iho&lat=33.5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn shaping_route_classifies_scores() {
    let h = seeded();
    let app = traffic_router(Arc::clone(&h.engine));

    let response = app.clone().oneshot(get("/api/v1/shaping/72")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["level"], "ORANGE");
    assert_eq!(body["policy"]["action"], "suggest_alternatives");

    let response = app.oneshot(get("/api/v1/shaping/101")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
