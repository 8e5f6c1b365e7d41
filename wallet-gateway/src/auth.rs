//! Consolidated capability check
//!
//! Every request passes through this middleware before any handler logic
//! runs. A valid bearer token yields a typed `AuthContext` in the request
//! extensions; handlers take it as an extractor and never re-implement
//! per-route authorization plumbing.

use crate::errors::GatewayError;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::rc::Rc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Telegram user ID as a string
    pub sub: String,
    pub exp: usize,
}

/// Authenticated request context
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub telegram_user_id: i64,
}

impl FromRequest for AuthContext {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let ctx = req.extensions().get::<AuthContext>().copied();
        ready(ctx.ok_or_else(|| {
            GatewayError::Unauthorized("Missing authentication context".to_string()).into()
        }))
    }
}

pub struct SessionAuth {
    secret: String,
}

impl SessionAuth {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SessionAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = SessionAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionAuthMiddleware {
            service: Rc::new(service),
            secret: self.secret.clone(),
        }))
    }
}

pub struct SessionAuthMiddleware<S> {
    service: Rc<S>,
    secret: String,
}

impl<S, B> Service<ServiceRequest> for SessionAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Health and metrics stay reachable without a session
        if req.path() == "/health" || req.path() == "/metrics" {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await });
        }

        let auth_header = req.headers().get("Authorization");

        let token = match auth_header {
            Some(value) => {
                let auth_str = value.to_str().unwrap_or("");
                match auth_str.strip_prefix("Bearer ") {
                    Some(token) => token.to_string(),
                    None => {
                        return Box::pin(async {
                            Err(GatewayError::Unauthorized(
                                "Invalid auth header format".to_string(),
                            )
                            .into())
                        });
                    }
                }
            }
            None => {
                return Box::pin(async {
                    Err(GatewayError::Unauthorized(
                        "Missing Authorization header".to_string(),
                    )
                    .into())
                });
            }
        };

        let validation = Validation::new(Algorithm::HS256);
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        );

        match decoded {
            Ok(data) => {
                let telegram_user_id: i64 = match data.claims.sub.parse() {
                    Ok(id) => id,
                    Err(_) => {
                        return Box::pin(async {
                            Err(GatewayError::Unauthorized(
                                "Invalid session subject".to_string(),
                            )
                            .into())
                        });
                    }
                };

                req.extensions_mut().insert(AuthContext { telegram_user_id });
                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Err(e) => {
                tracing::debug!("Session token rejected: {}", e);
                Box::pin(async {
                    Err(GatewayError::Unauthorized("Invalid session token".to_string()).into())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token_for(user_id: i64) -> String {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    async fn whoami(ctx: AuthContext) -> HttpResponse {
        HttpResponse::Ok().json(serde_json::json!({ "user_id": ctx.telegram_user_id }))
    }

    fn app() -> App<
        impl actix_web::dev::ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse,
            Error = Error,
            InitError = (),
        >,
    > {
        App::new()
            .wrap(SessionAuth::new(SECRET.to_string()))
            .route("/whoami", web::get().to(whoami))
            .route("/health", web::get().to(|| async { HttpResponse::Ok().finish() }))
    }

    #[actix_web::test]
    async fn test_missing_header_rejected_with_envelope() {
        let app = test::init_service(app()).await;
        let req = test::TestRequest::get().uri("/whoami").to_request();
        let err = test::try_call_service(&app, req).await.unwrap_err();

        let resp = err.error_response();
        assert_eq!(resp.status(), 401);

        let bytes = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("Authorization"));
    }

    #[actix_web::test]
    async fn test_valid_token_accepted() {
        let app = test::init_service(app()).await;
        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", format!("Bearer {}", token_for(42))))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["user_id"], 42);
    }

    #[actix_web::test]
    async fn test_health_skips_auth() {
        let app = test::init_service(app()).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_garbage_token_rejected_with_envelope() {
        let app = test::init_service(app()).await;
        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", "Bearer not-a-token"))
            .to_request();
        let err = test::try_call_service(&app, req).await.unwrap_err();

        let resp = err.error_response();
        assert_eq!(resp.status(), 401);

        let bytes = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn test_cors_preflight_bypasses_auth() {
        // Same layering as the server: CORS registered last, so it runs
        // outermost and answers preflight before the session check.
        let app = test::init_service(
            App::new()
                .wrap(SessionAuth::new(SECRET.to_string()))
                .wrap(actix_cors::Cors::permissive())
                .route("/whoami", web::get().to(whoami)),
        )
        .await;

        let req = test::TestRequest::with_uri("/whoami")
            .method(actix_web::http::Method::OPTIONS)
            .insert_header(("Origin", "https://market.example"))
            .insert_header(("Access-Control-Request-Method", "GET"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert!(resp
            .headers()
            .contains_key("access-control-allow-origin"));
    }
}
