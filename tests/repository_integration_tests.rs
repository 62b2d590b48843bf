//! Postgres-backed repository tests.
//!
//! These need a reachable database: set `DATABASE_URL` and run
//! `cargo test --test repository_integration_tests -- --ignored`.

use chrono::Duration;
use ikigai_api::{
    filters::Filters,
    handlers::{ACTIVITY_SORT, QUESTION_SORT},
    models::{
        ActivityStatus, CreateAnswerRequest, CreateQuestionRequest, NewActivity, NewUser, Role,
        User,
    },
    repository::{PostgresRepository, Repository, RepositoryError},
    scoring::classify,
    tokens::{SCOPE_ACTIVATION, generate_token},
};
use sqlx::PgPool;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// A unique address per call, so tests can share one database.
fn unique_email(prefix: &str) -> String {
    let suffix = generate_token(0, Duration::minutes(1), "test").plaintext;
    format!("{prefix}-{}@repo.test", &suffix[..12])
}

async fn create_test_user(repo: &PostgresRepository, prefix: &str) -> User {
    repo.insert_user(NewUser {
        email: unique_email(prefix),
        name: "Repo Tester".to_string(),
        password_hash: "$argon2id$placeholder".to_string(),
    })
    .await
    .expect("Failed to create test user")
}

async fn create_test_activity(repo: &PostgresRepository, user_id: i64, name: &str, points: &[i16]) -> i64 {
    let evaluation = classify(points);
    repo.insert_activity(NewActivity {
        user_id,
        name: name.to_string(),
        answer_points: points.to_vec(),
        answers_sum: evaluation.sum,
        status: evaluation.status,
    })
    .await
    .expect("Failed to create test activity")
    .id
}

fn default_filters(spec: ikigai_api::filters::SortSpec) -> Filters {
    Filters::from_params(&Default::default(), spec).unwrap()
}

// --- Users & tokens ---

#[tokio::test]
#[ignore]
async fn test_user_insert_and_duplicate_email() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let user = create_test_user(&repo, "dup").await;
    assert_eq!(user.role, Role::User);
    assert!(!user.activated);
    assert_eq!(user.version, 1);

    let duplicate = repo
        .insert_user(NewUser {
            email: user.email.clone(),
            name: "Other".to_string(),
            password_hash: "x".to_string(),
        })
        .await;
    assert!(matches!(duplicate, Err(RepositoryError::DuplicateEmail)));
}

#[tokio::test]
#[ignore]
async fn test_user_update_is_version_checked() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let mut user = create_test_user(&repo, "version").await;

    user.activated = true;
    let updated = repo.update_user(&user).await.unwrap();
    assert!(updated.activated);
    assert_eq!(updated.version, 2);

    // `user` still carries version 1.
    let stale = repo.update_user(&user).await;
    assert!(matches!(stale, Err(RepositoryError::EditConflict)));
}

#[tokio::test]
#[ignore]
async fn test_token_lookup_honours_scope_and_expiry() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, "token").await;

    let valid = generate_token(user.id, Duration::days(3), SCOPE_ACTIVATION);
    let expired = generate_token(user.id, Duration::seconds(-5), SCOPE_ACTIVATION);
    repo.insert_token(&valid).await.unwrap();
    repo.insert_token(&expired).await.unwrap();

    let found = repo
        .get_user_for_token(SCOPE_ACTIVATION, &valid.plaintext)
        .await
        .unwrap();
    assert_eq!(found.id, user.id);

    assert!(matches!(
        repo.get_user_for_token(SCOPE_ACTIVATION, &expired.plaintext).await,
        Err(RepositoryError::RecordNotFound)
    ));
    assert!(matches!(
        repo.get_user_for_token("password-reset", &valid.plaintext).await,
        Err(RepositoryError::RecordNotFound)
    ));

    repo.delete_tokens_for_user(SCOPE_ACTIVATION, user.id)
        .await
        .unwrap();
    assert!(matches!(
        repo.get_user_for_token(SCOPE_ACTIVATION, &valid.plaintext).await,
        Err(RepositoryError::RecordNotFound)
    ));
}

// --- Activities ---

#[tokio::test]
#[ignore]
async fn test_activity_round_trip_and_conflict() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, "activity").await;

    let id = create_test_activity(&repo, user.id, "Gardening", &[3, 2, 3]).await;
    let mut activity = repo.get_activity(id).await.unwrap();
    assert_eq!(activity.answer_points, vec![3, 2, 3]);
    assert_eq!(activity.answers_sum, 8);
    assert_eq!(activity.status, ActivityStatus::Tool);

    activity.name = "Urban gardening".to_string();
    let updated = repo.update_activity(&activity).await.unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.name, "Urban gardening");

    assert!(matches!(
        repo.update_activity(&activity).await,
        Err(RepositoryError::EditConflict)
    ));
    assert!(matches!(
        repo.get_activity(0).await,
        Err(RepositoryError::RecordNotFound)
    ));
}

#[tokio::test]
#[ignore]
async fn test_activity_listing_is_scoped_and_counted() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, "listing").await;

    for (name, points) in [("a", [1, 1]), ("b", [3, 3]), ("c", [2, 2])] {
        create_test_activity(&repo, user.id, name, &points).await;
    }

    let filters = Filters::new(1, 2, "-answers_sum", ACTIVITY_SORT.safelist).unwrap();
    let (page, metadata) = repo.list_activities(Some(user.id), &filters).await.unwrap();

    let names: Vec<&str> = page.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["b", "c"]);
    assert_eq!(metadata.total_records, 3);
    assert_eq!(metadata.last_page, 2);
}

#[tokio::test]
#[ignore]
async fn test_ikigai_report_uses_best_activity() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, "ikigai").await;
    create_test_activity(&repo, user.id, "Low", &[0, 1]).await;
    create_test_activity(&repo, user.id, "High", &[3, 3]).await;

    let filters = Filters::new(1, 100, "email", &["email"]).unwrap();
    let (rows, _) = repo.list_user_ikigais(&user.email, &filters).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, user.id);
    assert_eq!(rows[0].ikigai, "High");
    assert_eq!(rows[0].status, ActivityStatus::Ikigai);
}

// --- Questions & answers ---

#[tokio::test]
#[ignore]
async fn test_question_with_answers_and_cascade_delete() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let question = repo
        .insert_question(&CreateQuestionRequest {
            title: "What energises you?".to_string(),
            video_url: Some("https://videos.example.com/q1".to_string()),
            answers: vec![
                CreateAnswerRequest {
                    title: "People".to_string(),
                    points: 3,
                },
                CreateAnswerRequest {
                    title: "Solitude".to_string(),
                    points: 1,
                },
            ],
        })
        .await
        .unwrap();
    assert_eq!(question.answers.len(), 2);

    let fetched = repo.get_question(question.id).await.unwrap();
    assert_eq!(fetched.answers.len(), 2);
    assert!(fetched.answers.iter().all(|a| a.question_id == Some(question.id)));

    let (page, _) = repo.list_questions(&default_filters(QUESTION_SORT)).await.unwrap();
    assert!(page.iter().any(|q| q.id == question.id && q.answers.len() == 2));

    repo.delete_question(question.id).await.unwrap();
    for answer in &question.answers {
        assert!(matches!(
            repo.get_answer(answer.id).await,
            Err(RepositoryError::RecordNotFound)
        ));
    }
    assert!(matches!(
        repo.delete_question(question.id).await,
        Err(RepositoryError::RecordNotFound)
    ));
}

#[tokio::test]
#[ignore]
async fn test_standalone_answer_update_and_delete() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let mut answer = repo
        .insert_answer(&CreateAnswerRequest {
            title: "Sometimes".to_string(),
            points: 1,
        })
        .await
        .unwrap();
    assert_eq!(answer.question_id, None);

    answer.points = 2;
    let updated = repo.update_answer(&answer).await.unwrap();
    assert_eq!(updated.points, 2);
    assert_eq!(updated.version, 2);

    repo.delete_answer(answer.id).await.unwrap();
    assert!(matches!(
        repo.delete_answer(answer.id).await,
        Err(RepositoryError::RecordNotFound)
    ));
}
