use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::doctor_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn app(config: &TestConfig) -> Router {
    Router::new().nest("/doctors", doctor_routes(config.to_arc()))
}

fn request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token));

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn doctor_creates_own_profile() {
    let server = MockServer::start().await;
    let config = TestConfig::with_store(&server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("user_id", format!("eq.{}", doctor.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/doctors"))
        .and(header("prefer", "return=representation"))
        .and(body_partial_json(json!({ "user_id": doctor.id, "specialty": "Cardiology" })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([MockSupabaseResponses::doctor_row(doctor_id, doctor.id)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let token = JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, None);
    let response = app(&config)
        .oneshot(request(
            "POST",
            "/doctors",
            &token,
            Some(json!({ "specialty": "Cardiology", "experience_years": 4 })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["id"], json!(doctor_id));
}

#[tokio::test]
async fn patients_cannot_create_doctor_profiles() {
    let config = TestConfig::default();
    let patient = TestUser::patient("p@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let response = app(&config)
        .oneshot(request("POST", "/doctors", &token, Some(json!({ "specialty": "Cardiology" }))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn duplicate_profile_is_rejected() {
    let server = MockServer::start().await;
    let config = TestConfig::with_store(&server.uri());
    let doctor = TestUser::doctor("doc@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::doctor_row(
            Uuid::new_v4(),
            doctor.id
        )])))
        .mount(&server)
        .await;

    let token = JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, None);
    let response = app(&config)
        .oneshot(request("POST", "/doctors", &token, Some(json!({ "specialty": "Cardiology" }))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_is_paged_and_filtered() {
    let server = MockServer::start().await;
    let config = TestConfig::with_store(&server.uri());
    let user = TestUser::patient("p@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("specialty", "eq.Cardiology"))
        .and(query_param("limit", "5"))
        .and(query_param("offset", "5"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-range", "5-5/6")
                .set_body_json(json!([MockSupabaseResponses::doctor_row(Uuid::new_v4(), Uuid::new_v4())])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);
    let response = app(&config)
        .oneshot(request("GET", "/doctors?specialty=Cardiology&page=2&page_size=5", &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_count"], 6);
    assert_eq!(body["page"], 2);
    assert_eq!(body["page_size"], 5);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn only_owner_or_admin_may_update() {
    let server = MockServer::start().await;
    let config = TestConfig::with_store(&server.uri());
    let doctor_id = Uuid::new_v4();
    let owner = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::doctor_row(
            doctor_id, owner
        )])))
        .mount(&server)
        .await;

    let other = TestUser::doctor("other@example.com");
    let token = JwtTestUtils::create_test_token(&other, &config.jwt_secret, None);
    let response = app(&config)
        .oneshot(request(
            "PUT",
            &format!("/doctors/{}", doctor_id),
            &token,
            Some(json!({ "bio": "hijacked" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_is_admin_only() {
    let config = TestConfig::default();
    let doctor = TestUser::doctor("doc@example.com");
    let token = JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, None);

    let response = app(&config)
        .oneshot(request("DELETE", &format!("/doctors/{}", Uuid::new_v4()), &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_doctor_is_not_found() {
    let server = MockServer::start().await;
    let config = TestConfig::with_store(&server.uri());
    let user = TestUser::patient("p@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);
    let response = app(&config)
        .oneshot(request("GET", &format!("/doctors/{}", Uuid::new_v4()), &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
