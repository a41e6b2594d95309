use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use fleet_relay::api::rest::router;
use fleet_relay::engine::delivery::run_delivery_engine;
use fleet_relay::engine::gateway::{InMemoryGateway, MessagingGateway};
use fleet_relay::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(1024, 50, 200.0));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn import_job_body() -> Value {
    json!({
        "reference": "REF-001",
        "route": "BKK01",
        "vehicle": "83-1234",
        "driver": "U1",
        "destination": { "lat": 13.7501, "lng": 100.5001, "radius_m": 200.0 },
        "stops": [
            { "ship_to_code": "SHP-1", "seq": 1 },
            { "ship_to_code": "SHP-1", "seq": 2 },
            { "ship_to_code": "SHP-2", "seq": 3 }
        ]
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["jobs"], 0);
    assert_eq!(body["broadcasts"], 0);
    assert_eq!(body["alerts"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("broadcasts_in_queue"));
}

#[tokio::test]
async fn import_job_returns_pending_stops_in_sequence() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request("POST", "/jobs", import_job_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["progress"], "Open");
    let stops = body["stops"].as_array().unwrap();
    assert_eq!(stops.len(), 3);
    for stop in stops {
        assert_eq!(stop["status"], "PENDING");
    }
    assert_eq!(stops[0]["seq"], 1);
    assert_eq!(stops[2]["ship_to_code"], "SHP-2");
}

#[tokio::test]
async fn import_job_empty_reference_returns_400() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/jobs",
            json!({ "reference": "  ", "route": "BKK01", "stops": [] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_nonexistent_job_returns_404() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/jobs/REF-404")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn check_in_updates_the_whole_group() {
    let (app, _state) = setup();

    let res = app
        .clone()
        .oneshot(json_request("POST", "/jobs", import_job_body()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // destination is ~14m away; well within the 200m radius
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/jobs/REF-001/stops/SHP-1/check-in",
            json!({ "lat": 13.75, "lng": 100.50, "odo": 1000, "updated_by": "U1" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let result = body_json(res).await;
    assert_eq!(result["updated_count"], 2);
    assert_eq!(result["updated_ids"].as_array().unwrap().len(), 2);

    let res = app.oneshot(get_request("/jobs/REF-001")).await.unwrap();
    let job = body_json(res).await;
    assert_eq!(job["progress"], "InProgress");
    for stop in job["stops"].as_array().unwrap() {
        if stop["ship_to_code"] == "SHP-1" {
            assert_eq!(stop["status"], "CHECKIN");
            assert_eq!(stop["checkin_lat"], 13.75);
            assert_eq!(stop["updated_by"], "U1");
        } else {
            assert_eq!(stop["status"], "PENDING");
        }
    }
}

#[tokio::test]
async fn out_of_radius_check_in_is_rejected_unless_overridden() {
    let (app, _state) = setup();

    app.clone()
        .oneshot(json_request("POST", "/jobs", import_job_body()))
        .await
        .unwrap();

    // ~1.5km from the destination
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/jobs/REF-001/stops/SHP-1/check-in",
            json!({ "lat": 13.7636, "lng": 100.5001 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .oneshot(json_request(
            "POST",
            "/jobs/REF-001/stops/SHP-1/check-in",
            json!({ "lat": 13.7636, "lng": 100.5001, "allow_out_of_radius": true }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let result = body_json(res).await;
    assert_eq!(result["updated_count"], 2);
}

#[tokio::test]
async fn check_in_on_unknown_group_updates_nothing() {
    let (app, _state) = setup();

    app.clone()
        .oneshot(json_request("POST", "/jobs", import_job_body()))
        .await
        .unwrap();

    let res = app
        .oneshot(json_request(
            "POST",
            "/jobs/REF-001/stops/SHP-9/check-in",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let result = body_json(res).await;
    assert_eq!(result["updated_count"], 0);
}

#[tokio::test]
async fn full_stop_lifecycle_flow() {
    let (app, _state) = setup();

    app.clone()
        .oneshot(json_request("POST", "/jobs", import_job_body()))
        .await
        .unwrap();

    for (path, body) in [
        (
            "/jobs/REF-001/stops/SHP-1/check-in",
            json!({ "lat": 13.75, "lng": 100.50, "odo": 1000 }),
        ),
        ("/jobs/REF-001/stops/SHP-1/fueling", json!({ "updated_by": "U1" })),
        ("/jobs/REF-001/stops/SHP-1/unload", json!({ "updated_by": "U1" })),
        (
            "/jobs/REF-001/stops/SHP-1/check-out",
            json!({ "lat": 13.75, "lng": 100.50, "odo": 1010, "receiver_name": "Somchai" }),
        ),
        (
            "/jobs/REF-001/stops/SHP-2/check-in",
            json!({ "lat": 13.75, "lng": 100.50 }),
        ),
        (
            "/jobs/REF-001/stops/SHP-2/check-out",
            json!({ "lat": 13.75, "lng": 100.50 }),
        ),
    ] {
        let res = app
            .clone()
            .oneshot(json_request("POST", path, body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "failed at {path}");
    }

    let res = app.oneshot(get_request("/jobs/REF-001")).await.unwrap();
    let job = body_json(res).await;
    assert_eq!(job["progress"], "Completed");
    for stop in job["stops"].as_array().unwrap() {
        assert_eq!(stop["status"], "CHECKOUT");
        if stop["ship_to_code"] == "SHP-1" {
            assert!(!stop["fueling_time"].is_null());
            assert!(!stop["unload_done_time"].is_null());
            assert_eq!(stop["receiver_name"], "Somchai");
        }
    }
}

#[tokio::test]
async fn deviation_log_triggers_exactly_one_alert() {
    let (app, _state) = setup();

    // destination radius 100m, no rule configured
    let mut body = import_job_body();
    body["destination"] = json!({ "lat": 13.75, "lng": 100.50, "radius_m": 100.0 });
    app.clone()
        .oneshot(json_request("POST", "/jobs", body))
        .await
        .unwrap();

    // ~150m north of the destination
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/jobs/REF-001/location-logs",
            json!({ "user_id": "U1", "location": { "lat": 13.75135, "lng": 100.50 } }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let outcome = body_json(res).await;
    assert_eq!(outcome["outcome"], "alert_triggered");
    let distance = outcome["alert"]["distance_m"].as_f64().unwrap();
    assert!((distance - 150.0).abs() < 5.0);
    assert_eq!(outcome["alert"]["threshold_m"], 100.0);

    let res = app.oneshot(get_request("/alerts")).await.unwrap();
    let alerts = body_json(res).await;
    assert_eq!(alerts.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn location_log_without_destination_is_no_data() {
    let (app, _state) = setup();

    let mut body = import_job_body();
    body["destination"] = Value::Null;
    app.clone()
        .oneshot(json_request("POST", "/jobs", body))
        .await
        .unwrap();

    let res = app
        .oneshot(json_request(
            "POST",
            "/jobs/REF-001/location-logs",
            json!({ "user_id": "U1", "location": { "lat": 13.75, "lng": 100.50 } }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let outcome = body_json(res).await;
    assert_eq!(outcome["outcome"], "no_data");
}

#[tokio::test]
async fn alert_rule_threshold_overrides_job_radius() {
    let (app, _state) = setup();

    let mut body = import_job_body();
    body["destination"] = json!({ "lat": 13.75, "lng": 100.50, "radius_m": 100.0 });
    app.clone()
        .oneshot(json_request("POST", "/jobs", body))
        .await
        .unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/alert-rules/geofence_deviation",
            json!({ "threshold_m": 500.0, "active": true }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .oneshot(json_request(
            "POST",
            "/jobs/REF-001/location-logs",
            json!({ "user_id": "U1", "location": { "lat": 13.75135, "lng": 100.50 } }),
        ))
        .await
        .unwrap();
    let outcome = body_json(res).await;
    assert_eq!(outcome["outcome"], "no_deviation");
}

#[tokio::test]
async fn resolver_gates_check_in_via_imported_locations() {
    let (app, _state) = setup();

    // job without its own destination; the station table supplies the geofence
    let mut body = import_job_body();
    body["destination"] = Value::Null;
    app.clone()
        .oneshot(json_request("POST", "/jobs", body))
        .await
        .unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/locations/import",
            json!({
                "station": {
                    "rows": [["SHP-1", "Station One", "13.7501", "100.5001", "200", ""]]
                },
                "origin": { "rows": [] }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/jobs/REF-001/stops/SHP-1/check-in",
            json!({ "lat": 13.7636, "lng": 100.5001 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .oneshot(json_request(
            "POST",
            "/jobs/REF-001/stops/SHP-1/check-in",
            json!({ "lat": 13.75, "lng": 100.50 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn broadcast_validation_rejects_incomplete_payloads() {
    let (app, _state) = setup();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/broadcasts",
            json!({ "target": "all", "msg_type": "image" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .oneshot(json_request(
            "POST",
            "/broadcasts",
            json!({ "target": "all", "msg_type": "flex" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn scheduled_broadcast_is_delivered_by_the_engine() {
    let state = Arc::new(AppState::new(1024, 50, 200.0));
    let gateway = Arc::new(InMemoryGateway::new());
    let engine_gateway: Arc<dyn MessagingGateway> = gateway.clone();
    tokio::spawn(run_delivery_engine(
        state.clone(),
        engine_gateway,
        tokio::time::Duration::from_millis(50),
    ));
    let app = router(state.clone());

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/profiles",
            json!({ "user_id": "U1" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/broadcasts",
            json!({ "target": "all", "msg_type": "text", "message": "sawasdee" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let broadcast = body_json(res).await;
    assert_eq!(broadcast["status"], "scheduled");
    let id = broadcast["id"].as_str().unwrap().to_string();

    tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;

    let res = app
        .oneshot(get_request(&format!("/broadcasts/{id}")))
        .await
        .unwrap();
    let finalized = body_json(res).await;
    assert_eq!(finalized["status"], "sent");

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "U1");
}

#[tokio::test]
async fn segment_broadcast_reaches_matching_profiles_only() {
    let (app, state) = setup();
    let gateway = InMemoryGateway::new();

    for (user_id, days, points) in [("U-new", 10, 50), ("U-old", 40, 50)] {
        let created_at = chrono::Utc::now() - chrono::Duration::days(days);
        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/profiles",
                json!({ "user_id": user_id, "points": points, "created_at": created_at }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/segments/42",
            json!({ "min_days_joined": 30, "max_points": 100 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .oneshot(json_request(
            "POST",
            "/broadcasts",
            json!({ "target": "segment:42", "msg_type": "text", "message": "hi" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let summary =
        fleet_relay::engine::delivery::process_due(&state, &gateway, chrono::Utc::now()).await;
    assert_eq!(summary.sent, 1);

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "U-old");
}
