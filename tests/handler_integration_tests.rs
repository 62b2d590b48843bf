use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use ikigai_api::{
    AppState, InMemoryRepository, MockNotifier, NotifierState,
    auth::AuthUser,
    config::AppConfig,
    error::AppError,
    extract::{IdParam, JsonBody},
    filters::ListParams,
    handlers::{activities, answers, questions, users},
    models::{
        ActivationRequest, ActivityStatus, CreateActivityRequest, CreateAnswerRequest,
        CreateQuestionRequest, LoginRequest, RegisterUserRequest, Role, UpdateActivityRequest,
        UpdateAnswerRequest, UpdateQuestionRequest,
    },
    repository::Repository,
    tokens::SCOPE_ACTIVATION,
};
use serde_json::Value;
use std::{sync::Arc, time::Duration};

// --- Test Context ---

struct TestContext {
    state: AppState,
    repo: Arc<InMemoryRepository>,
    notifier: Arc<MockNotifier>,
}

impl TestContext {
    fn new() -> Self {
        Self::with(InMemoryRepository::new(), AppConfig::default())
    }

    fn with(repo: InMemoryRepository, config: AppConfig) -> Self {
        let repo = Arc::new(repo);
        let notifier = Arc::new(MockNotifier::new());
        let state = AppState {
            repo: repo.clone(),
            notifier: notifier.clone() as NotifierState,
            config,
        };
        Self {
            state,
            repo,
            notifier,
        }
    }

    fn user(&self, email: &str, role: Role) -> AuthUser {
        let user = self.repo.seed_user(email, "Tester", role, true);
        AuthUser {
            id: user.id,
            email: user.email,
            role,
        }
    }

    async fn create_activity(&self, user: &AuthUser, name: &str, points: &[i16]) -> Value {
        let response = activities::create_activity(
            user.clone(),
            State(self.state.clone()),
            JsonBody(CreateActivityRequest {
                name: name.to_string(),
                answer_points: Some(points.to_vec()),
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["activity"].clone()
    }

    async fn create_question(&self, title: &str, answers: &[(&str, i16)]) -> Value {
        let response = questions::create_question(
            State(self.state.clone()),
            JsonBody(CreateQuestionRequest {
                title: title.to_string(),
                video_url: None,
                answers: answers
                    .iter()
                    .map(|(title, points)| CreateAnswerRequest {
                        title: title.to_string(),
                        points: *points,
                    })
                    .collect(),
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["question"].clone()
    }
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn validation_field(err: &AppError, field: &str) -> Option<String> {
    match err {
        AppError::Validation(errors) => errors.get(field).map(str::to_string),
        _ => None,
    }
}

fn rename(name: &str) -> UpdateActivityRequest {
    UpdateActivityRequest {
        name: Some(name.to_string()),
        ..UpdateActivityRequest::default()
    }
}

// --- Activities ---

#[tokio::test]
async fn test_create_activity_classifies_and_sets_location() {
    let ctx = TestContext::new();
    let user = ctx.user("owner@example.com", Role::User);

    let response = activities::create_activity(
        user.clone(),
        State(ctx.state.clone()),
        JsonBody(CreateActivityRequest {
            name: "Painting".to_string(),
            answer_points: Some(vec![3, 2, 3]),
        }),
    )
    .await
    .unwrap()
    .into_response();

    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();

    let activity = body_json(response).await["activity"].clone();
    assert_eq!(location, format!("/activities/{}", activity["id"]));
    assert_eq!(activity["user_id"], user.id);
    assert_eq!(activity["answers_sum"], 8);
    assert_eq!(activity["status"], 1);
    assert_eq!(activity["version"], 1);
}

#[tokio::test]
async fn test_create_activity_requires_name() {
    let ctx = TestContext::new();
    let user = ctx.user("owner@example.com", Role::User);

    let err = activities::create_activity(
        user,
        State(ctx.state.clone()),
        JsonBody(CreateActivityRequest::default()),
    )
    .await
    .err()
    .unwrap();

    assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(validation_field(&err, "name").as_deref(), Some("must be provided"));
}

#[tokio::test]
async fn test_owner_update_recomputes_classification() {
    let ctx = TestContext::new();
    let user = ctx.user("owner@example.com", Role::User);
    let created = ctx.create_activity(&user, "Chess", &[1, 1, 1]).await;
    assert_eq!(created["status"], 2);

    let updated = activities::update_activity(
        user,
        State(ctx.state.clone()),
        IdParam(created["id"].as_i64().unwrap()),
        JsonBody(UpdateActivityRequest {
            answer_points: Some(vec![3, 3, 3]),
            // Ignored while recomputation is on.
            answers_sum: Some(1),
            status: Some(2),
            ..UpdateActivityRequest::default()
        }),
    )
    .await
    .unwrap()
    .0
    .activity;

    assert_eq!(updated.name, "Chess");
    assert_eq!(updated.answers_sum, 9);
    assert_eq!(updated.status, ActivityStatus::Ikigai);
    assert_eq!(updated.version, 2);
}

#[tokio::test]
async fn test_update_honours_client_values_when_recompute_disabled() {
    let config = AppConfig {
        recompute_status_on_update: false,
        ..AppConfig::default()
    };
    let ctx = TestContext::with(InMemoryRepository::new(), config);
    let user = ctx.user("owner@example.com", Role::User);
    let created = ctx.create_activity(&user, "Chess", &[1, 1, 1]).await;

    let updated = activities::update_activity(
        user,
        State(ctx.state.clone()),
        IdParam(created["id"].as_i64().unwrap()),
        JsonBody(UpdateActivityRequest {
            answers_sum: Some(7),
            status: Some(1),
            ..UpdateActivityRequest::default()
        }),
    )
    .await
    .unwrap()
    .0
    .activity;

    assert_eq!(updated.answers_sum, 7);
    assert_eq!(updated.status, ActivityStatus::Tool);
}

#[tokio::test]
async fn test_update_rejects_unknown_status_code() {
    let config = AppConfig {
        recompute_status_on_update: false,
        ..AppConfig::default()
    };
    let ctx = TestContext::with(InMemoryRepository::new(), config);
    let user = ctx.user("owner@example.com", Role::User);
    let created = ctx.create_activity(&user, "Chess", &[1]).await;

    let err = activities::update_activity(
        user,
        State(ctx.state.clone()),
        IdParam(created["id"].as_i64().unwrap()),
        JsonBody(UpdateActivityRequest {
            status: Some(5),
            ..UpdateActivityRequest::default()
        }),
    )
    .await
    .unwrap_err();

    assert_eq!(
        validation_field(&err, "status").as_deref(),
        Some("should be equal 0, 1, or 2")
    );
}

#[tokio::test]
async fn test_non_owner_update_is_forbidden() {
    let ctx = TestContext::new();
    let owner = ctx.user("owner@example.com", Role::User);
    let intruder = ctx.user("intruder@example.com", Role::User);
    let created = ctx.create_activity(&owner, "Running", &[2, 2]).await;
    let id = created["id"].as_i64().unwrap();

    let err = activities::update_activity(
        intruder,
        State(ctx.state.clone()),
        IdParam(id),
        JsonBody(rename("Hijacked")),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

    // The stored record is unchanged.
    let stored = ctx.repo.get_activity(id).await.unwrap();
    assert_eq!(stored.name, "Running");
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn test_admin_may_update_any_activity() {
    let ctx = TestContext::new();
    let owner = ctx.user("owner@example.com", Role::User);
    let admin = ctx.user("admin@example.com", Role::Admin);
    let created = ctx.create_activity(&owner, "Running", &[2, 2]).await;

    let updated = activities::update_activity(
        admin,
        State(ctx.state.clone()),
        IdParam(created["id"].as_i64().unwrap()),
        JsonBody(rename("Trail running")),
    )
    .await
    .unwrap()
    .0
    .activity;

    assert_eq!(updated.name, "Trail running");
    assert_eq!(updated.user_id, owner.id);
}

#[tokio::test]
async fn test_update_unknown_activity_is_not_found() {
    let ctx = TestContext::new();
    let user = ctx.user("owner@example.com", Role::User);

    let err = activities::update_activity(
        user,
        State(ctx.state.clone()),
        IdParam(9_999),
        JsonBody(rename("Nothing")),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_update_reports_edit_conflict() {
    let ctx = TestContext::with(InMemoryRepository::with_conflicting_updates(), AppConfig::default());
    let user = ctx.user("owner@example.com", Role::User);
    let created = ctx.create_activity(&user, "Running", &[2, 2]).await;

    let err = activities::update_activity(
        user,
        State(ctx.state.clone()),
        IdParam(created["id"].as_i64().unwrap()),
        JsonBody(rename("Sprinting")),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::EditConflict));
    assert_eq!(err.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_list_my_activities_only_returns_own_records() {
    let ctx = TestContext::new();
    let alice = ctx.user("alice@example.com", Role::User);
    let bob = ctx.user("bob@example.com", Role::User);
    ctx.create_activity(&alice, "A1", &[3]).await;
    ctx.create_activity(&alice, "A2", &[1]).await;
    ctx.create_activity(&bob, "B1", &[2]).await;

    let list = activities::list_my_activities(
        alice.clone(),
        State(ctx.state.clone()),
        Query(ListParams {
            sort: Some("name".to_string()),
            ..ListParams::default()
        }),
    )
    .await
    .unwrap()
    .0;

    let names: Vec<&str> = list.activities.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["A1", "A2"]);
    assert!(list.activities.iter().all(|a| a.user_id == alice.id));
    assert_eq!(list.metadata.total_records, 2);
}

#[tokio::test]
async fn test_admin_activity_listing_filters_by_user() {
    let ctx = TestContext::new();
    let alice = ctx.user("alice@example.com", Role::User);
    let bob = ctx.user("bob@example.com", Role::User);
    ctx.create_activity(&alice, "A1", &[3]).await;
    ctx.create_activity(&bob, "B1", &[2]).await;

    let everyone = activities::list_user_activities(
        State(ctx.state.clone()),
        Query(ListParams::default()),
    )
    .await
    .unwrap()
    .0;
    assert_eq!(everyone.metadata.total_records, 2);

    let only_bob = activities::list_user_activities(
        State(ctx.state.clone()),
        Query(ListParams {
            user_id: Some(bob.id.to_string()),
            ..ListParams::default()
        }),
    )
    .await
    .unwrap()
    .0;
    assert_eq!(only_bob.activities.len(), 1);
    assert_eq!(only_bob.activities[0].user_id, bob.id);
}

#[tokio::test]
async fn test_admin_activity_listing_validates_user_id() {
    let ctx = TestContext::new();

    let err = activities::list_user_activities(
        State(ctx.state.clone()),
        Query(ListParams {
            user_id: Some("0".to_string()),
            page: Some("0".to_string()),
            ..ListParams::default()
        }),
    )
    .await
    .unwrap_err();

    assert_eq!(
        validation_field(&err, "user_id").as_deref(),
        Some("must be greater than zero")
    );
    assert!(validation_field(&err, "page").is_some());
}

#[tokio::test]
async fn test_activity_listing_rejects_unknown_sort() {
    let ctx = TestContext::new();
    let user = ctx.user("owner@example.com", Role::User);

    let err = activities::list_my_activities(
        user,
        State(ctx.state.clone()),
        Query(ListParams {
            sort: Some("password_hash".to_string()),
            ..ListParams::default()
        }),
    )
    .await
    .unwrap_err();

    assert_eq!(validation_field(&err, "sort").as_deref(), Some("invalid sort value"));
}

// --- Questions & Answers ---

#[tokio::test]
async fn test_create_question_with_answers() {
    let ctx = TestContext::new();

    let question = ctx
        .create_question("What do you love?", &[("Music", 3), ("Sport", 1)])
        .await;

    let answers = question["answers"].as_array().unwrap();
    assert_eq!(answers.len(), 2);
    assert!(answers.iter().all(|a| a["question_id"] == question["id"]));
}

#[tokio::test]
async fn test_create_question_validates_nested_answers() {
    let ctx = TestContext::new();

    let err = questions::create_question(
        State(ctx.state.clone()),
        JsonBody(CreateQuestionRequest {
            title: "Q".to_string(),
            video_url: None,
            answers: vec![CreateAnswerRequest {
                title: String::new(),
                points: 4,
            }],
        }),
    )
    .await
    .err()
    .unwrap();

    assert_eq!(
        validation_field(&err, "answers[0].points").as_deref(),
        Some("must be between 0 and 3")
    );
    assert!(validation_field(&err, "answers[0].title").is_some());
}

#[tokio::test]
async fn test_question_update_and_listing() {
    let ctx = TestContext::new();
    let first = ctx.create_question("First", &[("a", 0)]).await;
    ctx.create_question("Second", &[("b", 1)]).await;

    let updated = questions::update_question(
        State(ctx.state.clone()),
        IdParam(first["id"].as_i64().unwrap()),
        JsonBody(UpdateQuestionRequest {
            title: Some("Zeroth".to_string()),
            video_url: Some("https://videos.example.com/intro".to_string()),
        }),
    )
    .await
    .unwrap()
    .0
    .question;
    assert_eq!(updated.version, 2);
    assert_eq!(updated.answers.len(), 1);

    let list = questions::list_questions(
        State(ctx.state.clone()),
        Query(ListParams {
            sort: Some("-title".to_string()),
            ..ListParams::default()
        }),
    )
    .await
    .unwrap()
    .0;
    let titles: Vec<&str> = list.questions.iter().map(|q| q.title.as_str()).collect();
    assert_eq!(titles, ["Zeroth", "Second"]);
    assert_eq!(list.metadata.total_records, 2);
}

#[tokio::test]
async fn test_delete_question_cascades_to_answers() {
    let ctx = TestContext::new();
    let question = ctx.create_question("Doomed", &[("x", 1), ("y", 2)]).await;
    let id = question["id"].as_i64().unwrap();

    let message = questions::delete_question(State(ctx.state.clone()), IdParam(id))
        .await
        .unwrap()
        .0;
    assert_eq!(message.message, "question successfully deleted");

    let remaining = answers::list_answers(State(ctx.state.clone())).await.unwrap().0;
    assert!(remaining.answers.is_empty());

    let err = questions::delete_question(State(ctx.state.clone()), IdParam(id))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_standalone_answer_lifecycle() {
    let ctx = TestContext::new();

    let response = answers::create_answer(
        State(ctx.state.clone()),
        JsonBody(CreateAnswerRequest {
            title: "Often".to_string(),
            points: 2,
        }),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);
    let answer = body_json(response).await["answer"].clone();
    assert!(answer.get("question_id").is_none());
    let id = answer["id"].as_i64().unwrap();

    let updated = answers::update_answer(
        State(ctx.state.clone()),
        IdParam(id),
        JsonBody(UpdateAnswerRequest {
            points: Some(3),
            ..UpdateAnswerRequest::default()
        }),
    )
    .await
    .unwrap()
    .0
    .answer;
    assert_eq!(updated.title, "Often");
    assert_eq!(updated.points, 3);
    assert_eq!(updated.version, 2);

    let err = answers::update_answer(
        State(ctx.state.clone()),
        IdParam(id),
        JsonBody(UpdateAnswerRequest {
            points: Some(-1),
            ..UpdateAnswerRequest::default()
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let message = answers::delete_answer(State(ctx.state.clone()), IdParam(id))
        .await
        .unwrap()
        .0;
    assert_eq!(message.message, "answer successfully deleted");
}

// --- Users ---

fn registration(email: &str) -> RegisterUserRequest {
    RegisterUserRequest {
        email: email.to_string(),
        name: "New User".to_string(),
        password: "pa55word-long".to_string(),
    }
}

async fn wait_for_notification(notifier: &MockNotifier) -> String {
    for _ in 0..50 {
        if let Some(message) = notifier.sent().last() {
            return message.activation_token.clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("welcome notification was never sent");
}

#[tokio::test]
async fn test_register_sets_cookie_and_sends_welcome() {
    let ctx = TestContext::new();

    let response = users::register_user(
        State(ctx.state.clone()),
        JsonBody(registration("new@example.com")),
    )
    .await
    .unwrap()
    .into_response();

    assert_eq!(response.status(), StatusCode::CREATED);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("auth_token="));
    assert_eq!(body_json(response).await["message"], "successfully registered");

    let token = wait_for_notification(&ctx.notifier).await;
    assert_eq!(token.len(), 32);

    let user = ctx.repo.get_user_by_email("new@example.com").await.unwrap();
    assert!(!user.activated);
    assert_eq!(ctx.repo.token_count(SCOPE_ACTIVATION, user.id), 1);
}

#[tokio::test]
async fn test_register_rejects_duplicate_email() {
    let ctx = TestContext::new();
    ctx.repo.seed_user("taken@example.com", "Existing", Role::User, true);

    let err = users::register_user(
        State(ctx.state.clone()),
        JsonBody(registration("taken@example.com")),
    )
    .await
    .err()
    .unwrap();

    assert_eq!(
        validation_field(&err, "email").as_deref(),
        Some("a user with this email address already exists")
    );
}

#[tokio::test]
async fn test_register_succeeds_when_notification_fails() {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState {
        repo: repo.clone(),
        notifier: Arc::new(MockNotifier::new_failing()),
        config: AppConfig::default(),
    };

    let response = users::register_user(State(state), JsonBody(registration("quiet@example.com")))
        .await
        .unwrap()
        .into_response();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(repo.get_user_by_email("quiet@example.com").await.is_ok());
}

#[tokio::test]
async fn test_activation_consumes_token() {
    let ctx = TestContext::new();
    users::register_user(
        State(ctx.state.clone()),
        JsonBody(registration("activate@example.com")),
    )
    .await
    .unwrap();
    let token = wait_for_notification(&ctx.notifier).await;

    let user = users::activate_user(
        State(ctx.state.clone()),
        JsonBody(ActivationRequest {
            token: token.clone(),
        }),
    )
    .await
    .unwrap()
    .0
    .user;
    assert!(user.activated);
    assert_eq!(ctx.repo.token_count(SCOPE_ACTIVATION, user.id), 0);

    // A consumed token cannot be replayed.
    let err = users::activate_user(State(ctx.state.clone()), JsonBody(ActivationRequest { token }))
        .await
        .unwrap_err();
    assert_eq!(
        validation_field(&err, "token").as_deref(),
        Some("invalid or expired activation token")
    );
}

#[tokio::test]
async fn test_activation_rejects_malformed_token() {
    let ctx = TestContext::new();

    let err = users::activate_user(
        State(ctx.state.clone()),
        JsonBody(ActivationRequest {
            token: "short".to_string(),
        }),
    )
    .await
    .unwrap_err();

    assert_eq!(
        validation_field(&err, "token").as_deref(),
        Some("must be 32 bytes long")
    );
}

#[tokio::test]
async fn test_login_with_valid_and_invalid_credentials() {
    let ctx = TestContext::new();
    users::register_user(
        State(ctx.state.clone()),
        JsonBody(registration("login@example.com")),
    )
    .await
    .unwrap();

    let response = users::login_user(
        State(ctx.state.clone()),
        JsonBody(LoginRequest {
            email: "login@example.com".to_string(),
            password: "pa55word-long".to_string(),
        }),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(header::SET_COOKIE));

    let wrong_password = users::login_user(
        State(ctx.state.clone()),
        JsonBody(LoginRequest {
            email: "login@example.com".to_string(),
            password: "not-the-password".to_string(),
        }),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(wrong_password, AppError::InvalidCredentials));

    let unknown_email = users::login_user(
        State(ctx.state.clone()),
        JsonBody(LoginRequest {
            email: "nobody@example.com".to_string(),
            password: "pa55word-long".to_string(),
        }),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(unknown_email, AppError::InvalidCredentials));
}

#[tokio::test]
async fn test_ikigai_report_picks_best_activity() {
    let ctx = TestContext::new();
    let alice = ctx.user("alice@example.com", Role::User);
    let bob = ctx.user("bob@corp.test", Role::User);
    ctx.create_activity(&alice, "Knitting", &[1, 1]).await;
    ctx.create_activity(&alice, "Climbing", &[3, 3]).await;
    ctx.create_activity(&bob, "Cooking", &[2]).await;

    let report = users::list_ikigais(
        State(ctx.state.clone()),
        Query(ListParams {
            search: Some("EXAMPLE".to_string()),
            ..ListParams::default()
        }),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(report.ikigais.len(), 1);
    assert_eq!(report.ikigais[0].user_id, alice.id);
    assert_eq!(report.ikigais[0].ikigai, "Climbing");
    assert_eq!(report.ikigais[0].answers_sum, 6);
    assert_eq!(report.ikigais[0].status, ActivityStatus::Ikigai);
}
