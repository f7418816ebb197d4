//! A4/§6: the admin HTTP surface — `/admin.login`, `/admin.current`,
//! `/add_question`, `/leaderboard`. Out of the core per §1; implemented
//! only to the depth its interface requires: a session-token login, a
//! whoami check, a question insert gated on that session, and the global
//! leaderboard read. Modeled on the reference service's actix-web handler
//! split (`user_handlers.rs` delegating to `users.rs`), collapsed into one
//! module here because this surface is a few handlers, not a whole service.

use std::collections::HashSet;
use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::BotConfig;
use crate::errors::{ResponseType, ServiceError};
use crate::store::{QuestionStore, StoreHandle, UserStore};

/// Shared state for the admin surface: the store and the set of currently
/// valid session tokens. A `HashSet<Uuid>` behind a mutex, not a signed
/// cookie jar — sessions don't outlive the process, which matches this
/// surface's "thin external collaborator" scope (§1).
pub struct AdminState {
    pub store: Arc<StoreHandle>,
    pub config: Arc<BotConfig>,
    sessions: Mutex<HashSet<Uuid>>,
}

impl AdminState {
    pub fn new(store: Arc<StoreHandle>, config: Arc<BotConfig>) -> Arc<Self> {
        Arc::new(AdminState {
            store,
            config,
            sessions: Mutex::new(HashSet::new()),
        })
    }

    async fn authorize(&self, request: &HttpRequest) -> Result<(), ServiceError> {
        let token = request
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok());

        match token {
            Some(t) if self.sessions.lock().await.contains(&t) => Ok(()),
            _ => Err(ServiceError::new(
                "missing or invalid session",
                actix_web::http::StatusCode::UNAUTHORIZED,
                ResponseType::NoData,
                crate::errors::GameError::ValidationError("unauthorized".into()),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub session: String,
}

pub async fn login(state: web::Data<Arc<AdminState>>, body: web::Json<LoginRequest>) -> HttpResponse {
    if body.email != state.config.admin_email || body.password != state.config.admin_password {
        return ServiceError::new(
            "invalid credentials",
            actix_web::http::StatusCode::UNAUTHORIZED,
            ResponseType::NoData,
            crate::errors::GameError::ValidationError("bad credentials".into()),
        )
        .to_http_response();
    }

    let token = Uuid::new_v4();
    state.sessions.lock().await.insert(token);
    HttpResponse::Ok().json(LoginResponse {
        session: token.to_string(),
    })
}

pub async fn current(state: web::Data<Arc<AdminState>>, request: HttpRequest) -> HttpResponse {
    match state.authorize(&request).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "email": state.config.admin_email })),
        Err(e) => e.to_http_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct AddQuestionRequest {
    pub question_text: String,
    pub answer_text: String,
}

pub async fn add_question(
    state: web::Data<Arc<AdminState>>,
    request: HttpRequest,
    body: web::Json<AddQuestionRequest>,
) -> HttpResponse {
    if let Err(e) = state.authorize(&request).await {
        return e.to_http_response();
    }
    if body.answer_text.trim().is_empty() {
        return ServiceError::new_bad_request("answer_text must not be empty").to_http_response();
    }
    match state
        .store
        .as_question_store()
        .insert_question(&body.question_text, &body.answer_text)
        .await
    {
        Ok(question) => HttpResponse::Ok().json(question),
        Err(e) => ServiceError::new_internal("failed to insert question", e).to_http_response(),
    }
}

pub async fn leaderboard(state: web::Data<Arc<AdminState>>) -> HttpResponse {
    match state.store.as_user_store().list_all_users_by_points().await {
        Ok(users) => HttpResponse::Ok().json(users),
        Err(e) => ServiceError::new_internal("failed to list users", e).to_http_response(),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/admin.login", web::post().to(login))
        .route("/admin.current", web::get().to(current))
        .route("/add_question", web::post().to(add_question))
        .route("/leaderboard", web::get().to(leaderboard));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    fn test_config() -> Arc<BotConfig> {
        Arc::new(BotConfig {
            bot_group_id: "1".into(),
            bot_token: "tok".into(),
            database_url: "postgres://localhost/test".into(),
            session_key: "k".into(),
            admin_email: "admin@example.com".into(),
            admin_password: "hunter2".into(),
            rust_log: "info".into(),
            worker_count: 5,
            long_poll_wait_secs: 30,
        })
    }

    #[actix_web::test]
    async fn rejects_bad_credentials() {
        let state = AdminState::new(Arc::new(StoreHandle::new_memory()), test_config());
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/admin.login")
            .set_json(&LoginRequest {
                email: "wrong@example.com".into(),
                password: "nope".into(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn login_then_add_question_succeeds() {
        let state = AdminState::new(Arc::new(StoreHandle::new_memory()), test_config());
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;

        let login_req = test::TestRequest::post()
            .uri("/admin.login")
            .set_json(&LoginRequest {
                email: "admin@example.com".into(),
                password: "hunter2".into(),
            })
            .to_request();
        let login_resp: LoginResponse = test::call_and_read_body_json(&app, login_req).await;

        let add_req = test::TestRequest::post()
            .uri("/add_question")
            .insert_header(("Authorization", login_resp.session.clone()))
            .set_json(&AddQuestionRequest {
                question_text: "2+2?".into(),
                answer_text: "FOUR".into(),
            })
            .to_request();
        let resp = test::call_service(&app, add_req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
    }

    #[actix_web::test]
    async fn add_question_without_session_is_unauthorized() {
        let state = AdminState::new(Arc::new(StoreHandle::new_memory()), test_config());
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/add_question")
            .set_json(&AddQuestionRequest {
                question_text: "q".into(),
                answer_text: "A".into(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);
    }
}
