use actix_middleware::{AuthenticatedUser, JwtAuthMiddleware, DEVICE_HEADER};
use actix_web::{test, web, App, HttpResponse};
use jwt_security::{MemoryTokenStore, TokenManager};
use std::sync::Arc;

async fn whoami(user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().body(user.profile_id)
}

fn tokens() -> Arc<TokenManager> {
    Arc::new(
        TokenManager::new(
            "J8Kq2mPvRx4TnZs9YwLcGf7DhBe3Xa6W".to_string(),
            "Wq8Lj5BtNu1Zp0MkYhVgCxFbAsSdQwEr".to_string(),
            Arc::new(MemoryTokenStore::new()),
        )
        .unwrap(),
    )
}

#[actix_web::test]
async fn test_valid_token_and_device_pass() {
    let tokens = tokens();
    let pair = tokens.issue("user-1", "profile-1", "phone-1").await.unwrap();
    let app = test::init_service(
        App::new()
            .wrap(JwtAuthMiddleware::new(tokens.clone()))
            .route("/me", web::get().to(whoami)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/me")
        .insert_header(("Authorization", format!("Bearer {}", pair.access_token)))
        .insert_header((DEVICE_HEADER, "phone-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    assert_eq!(test::read_body(resp).await, "profile-1");
}

#[actix_web::test]
async fn test_device_mismatch_is_unauthorized() {
    let tokens = tokens();
    let pair = tokens.issue("user-1", "profile-1", "phone-1").await.unwrap();
    let app = test::init_service(
        App::new()
            .wrap(JwtAuthMiddleware::new(tokens.clone()))
            .route("/me", web::get().to(whoami)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/me")
        .insert_header(("Authorization", format!("Bearer {}", pair.access_token)))
        .insert_header((DEVICE_HEADER, "laptop-2"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn test_revoked_token_is_unauthorized() {
    let tokens = tokens();
    let pair = tokens.issue("user-1", "profile-1", "").await.unwrap();
    tokens.revoke_access(&pair.access_uuid, "user-1").await.unwrap();

    let app = test::init_service(
        App::new()
            .wrap(JwtAuthMiddleware::new(tokens.clone()))
            .route("/me", web::get().to(whoami)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/me")
        .insert_header(("Authorization", format!("Bearer {}", pair.access_token)))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn test_missing_header_is_unauthorized() {
    let app = test::init_service(
        App::new()
            .wrap(JwtAuthMiddleware::new(tokens()))
            .route("/me", web::get().to(whoami)),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/me").to_request()).await;
    assert_eq!(resp.status(), 401);
}
