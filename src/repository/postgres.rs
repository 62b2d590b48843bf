use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    FromRow, PgPool, Row,
    postgres::PgRow,
    query_builder::QueryBuilder,
};
use std::collections::HashMap;

use super::{Page, RepoResult, Repository, RepositoryError};
use crate::{
    filters::{Filters, Metadata},
    models::{
        Activity, Answer, CreateAnswerRequest, CreateQuestionRequest, NewActivity, NewUser,
        Question, User, UserIkigai,
    },
    tokens::{Token, hash_plaintext},
};

const USER_COLUMNS: &str =
    "id, created_at, email, name, password_hash, role, activated, version";
const ACTIVITY_COLUMNS: &str =
    "id, user_id, name, answer_points, answers_sum, status, created_at, version";
const QUESTION_COLUMNS: &str = "id, title, video_url, version";
const ANSWER_COLUMNS: &str = "id, question_id, title, points, version";

const USERS_EMAIL_UNIQUE: &str = "users_email_key";

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by the PostgreSQL database.
/// Queries are built at runtime, so the crate compiles without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn answers_for(&self, question_ids: &[i64]) -> RepoResult<Vec<Answer>> {
        if question_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE question_id = ANY($1) ORDER BY id ASC"
        );
        Ok(sqlx::query_as::<_, Answer>(&sql)
            .bind(question_ids)
            .fetch_all(&self.pool)
            .await?)
    }
}

/// Maps a unique-violation on the email column to `DuplicateEmail`.
fn map_user_write_error(err: sqlx::Error) -> RepositoryError {
    let duplicate = err
        .as_database_error()
        .and_then(|db| db.constraint())
        .is_some_and(|constraint| constraint == USERS_EMAIL_UNIQUE);

    if duplicate {
        RepositoryError::DuplicateEmail
    } else {
        RepositoryError::Database(err)
    }
}

/// Splits rows carrying a `count(*) OVER()` column into records and the total.
fn collect_counted<T>(rows: &[PgRow]) -> Result<(Vec<T>, i64), sqlx::Error>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    let mut total = 0;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        total = row.try_get("total_records")?;
        records.push(T::from_row(row)?);
    }
    Ok((records, total))
}

/// Appends `ORDER BY <col> <dir>, <tiebreak> ASC LIMIT .. OFFSET ..`.
///
/// The column comes from a validated [`Filters`], so it is always on the endpoint's safelist.
fn push_order_and_page(
    builder: &mut QueryBuilder<'_, sqlx::Postgres>,
    filters: &Filters,
    prefix: &str,
) {
    builder.push(format!(
        " ORDER BY {prefix}{} {}, {prefix}id ASC LIMIT ",
        filters.sort_column(),
        filters.sort_direction()
    ));
    builder.push_bind(filters.limit());
    builder.push(" OFFSET ");
    builder.push_bind(filters.offset());
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn insert_user(&self, user: NewUser) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users (email, name, password_hash, activated) \
             VALUES ($1, $2, $3, false) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(map_user_write_error)
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::RecordNotFound)
    }

    /// update_user
    ///
    /// Optimistic update: only applies when the stored version still matches.
    async fn update_user(&self, user: &User) -> RepoResult<User> {
        let sql = format!(
            "UPDATE users SET email = $1, name = $2, password_hash = $3, activated = $4, \
             version = version + 1 WHERE id = $5 AND version = $6 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.password_hash)
            .bind(user.activated)
            .bind(user.id)
            .bind(user.version)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_user_write_error)?
            .ok_or(RepositoryError::EditConflict)
    }

    async fn get_user_for_token(&self, scope: &str, plaintext: &str) -> RepoResult<User> {
        let sql = "SELECT u.id, u.created_at, u.email, u.name, u.password_hash, u.role, \
                   u.activated, u.version \
                   FROM users u INNER JOIN tokens t ON u.id = t.user_id \
                   WHERE t.hash = $1 AND t.scope = $2 AND t.expiry > $3";
        sqlx::query_as::<_, User>(sql)
            .bind(hash_plaintext(plaintext))
            .bind(scope)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::RecordNotFound)
    }

    /// list_user_ikigais
    ///
    /// One row per user that has at least one activity. The best activity is the one
    /// with the highest `answers_sum`, the lowest id breaking ties.
    async fn list_user_ikigais(&self, search_email: &str, filters: &Filters) -> RepoResult<Page<UserIkigai>> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT count(*) OVER() AS total_records,
                   u.id AS user_id, u.email, u.name,
                   best.name AS ikigai, best.answers_sum, best.status
            FROM users u
            JOIN LATERAL (
                SELECT a.name, a.answers_sum, a.status
                FROM activities a
                WHERE a.user_id = u.id
                ORDER BY a.answers_sum DESC, a.id ASC
                LIMIT 1
            ) best ON true
            "#,
        );

        if !search_email.is_empty() {
            builder.push(" WHERE u.email ILIKE ");
            builder.push_bind(format!("%{search_email}%"));
        }
        push_order_and_page(&mut builder, filters, "u.");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let (ikigais, total) = collect_counted::<UserIkigai>(&rows)?;
        Ok((ikigais, Metadata::for_filters(total, filters)))
    }

    // --- TOKENS ---

    async fn insert_token(&self, token: &Token) -> RepoResult<()> {
        sqlx::query("INSERT INTO tokens (hash, user_id, expiry, scope) VALUES ($1, $2, $3, $4)")
            .bind(&token.hash)
            .bind(token.user_id)
            .bind(token.expiry)
            .bind(&token.scope)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_tokens_for_user(&self, scope: &str, user_id: i64) -> RepoResult<()> {
        sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
            .bind(scope)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // --- ACTIVITIES ---

    async fn insert_activity(&self, activity: NewActivity) -> RepoResult<Activity> {
        let sql = format!(
            "INSERT INTO activities (user_id, name, answer_points, answers_sum, status) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ACTIVITY_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Activity>(&sql)
            .bind(activity.user_id)
            .bind(&activity.name)
            .bind(&activity.answer_points)
            .bind(activity.answers_sum)
            .bind(activity.status)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_activity(&self, id: i64) -> RepoResult<Activity> {
        if id < 1 {
            return Err(RepositoryError::RecordNotFound);
        }
        let sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = $1");
        sqlx::query_as::<_, Activity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::RecordNotFound)
    }

    async fn update_activity(&self, activity: &Activity) -> RepoResult<Activity> {
        let sql = format!(
            "UPDATE activities SET name = $1, answer_points = $2, answers_sum = $3, status = $4, \
             version = version + 1 WHERE id = $5 AND version = $6 RETURNING {ACTIVITY_COLUMNS}"
        );
        sqlx::query_as::<_, Activity>(&sql)
            .bind(&activity.name)
            .bind(&activity.answer_points)
            .bind(activity.answers_sum)
            .bind(activity.status)
            .bind(activity.id)
            .bind(activity.version)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::EditConflict)
    }

    async fn list_activities(&self, user_id: Option<i64>, filters: &Filters) -> RepoResult<Page<Activity>> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT count(*) OVER() AS total_records, {ACTIVITY_COLUMNS} FROM activities"
        ));
        if let Some(owner) = user_id {
            builder.push(" WHERE user_id = ");
            builder.push_bind(owner);
        }
        push_order_and_page(&mut builder, filters, "");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let (activities, total) = collect_counted::<Activity>(&rows)?;
        Ok((activities, Metadata::for_filters(total, filters)))
    }

    // --- QUESTIONS ---

    /// insert_question
    ///
    /// The question row and every answer row are written in one transaction; any
    /// failure rolls the whole set back.
    async fn insert_question(&self, req: &CreateQuestionRequest) -> RepoResult<Question> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO questions (title, video_url) VALUES ($1, $2) RETURNING {QUESTION_COLUMNS}"
        );
        let mut question = sqlx::query_as::<_, Question>(&sql)
            .bind(&req.title)
            .bind(&req.video_url)
            .fetch_one(&mut *tx)
            .await?;

        let sql = format!(
            "INSERT INTO answers (question_id, title, points) VALUES ($1, $2, $3) RETURNING {ANSWER_COLUMNS}"
        );
        for answer in &req.answers {
            let inserted = sqlx::query_as::<_, Answer>(&sql)
                .bind(question.id)
                .bind(&answer.title)
                .bind(answer.points)
                .fetch_one(&mut *tx)
                .await?;
            question.answers.push(inserted);
        }

        tx.commit().await?;
        Ok(question)
    }

    async fn get_question(&self, id: i64) -> RepoResult<Question> {
        if id < 1 {
            return Err(RepositoryError::RecordNotFound);
        }
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1");
        let mut question = sqlx::query_as::<_, Question>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::RecordNotFound)?;

        question.answers = self.answers_for(&[question.id]).await?;
        Ok(question)
    }

    async fn update_question(&self, question: &Question) -> RepoResult<Question> {
        let sql = format!(
            "UPDATE questions SET title = $1, video_url = $2, version = version + 1 \
             WHERE id = $3 AND version = $4 RETURNING {QUESTION_COLUMNS}"
        );
        let mut updated = sqlx::query_as::<_, Question>(&sql)
            .bind(&question.title)
            .bind(&question.video_url)
            .bind(question.id)
            .bind(question.version)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::EditConflict)?;

        updated.answers = question.answers.clone();
        Ok(updated)
    }

    /// delete_question
    ///
    /// Owned answers are removed by the `ON DELETE CASCADE` foreign key.
    async fn delete_question(&self, id: i64) -> RepoResult<()> {
        if id < 1 {
            return Err(RepositoryError::RecordNotFound);
        }
        let result = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::RecordNotFound);
        }
        Ok(())
    }

    async fn list_questions(&self, filters: &Filters) -> RepoResult<Page<Question>> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT count(*) OVER() AS total_records, {QUESTION_COLUMNS} FROM questions"
        ));
        push_order_and_page(&mut builder, filters, "");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let (mut questions, total) = collect_counted::<Question>(&rows)?;

        let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
        let mut grouped: HashMap<i64, Vec<Answer>> = HashMap::new();
        for answer in self.answers_for(&ids).await? {
            if let Some(question_id) = answer.question_id {
                grouped.entry(question_id).or_default().push(answer);
            }
        }
        for question in &mut questions {
            question.answers = grouped.remove(&question.id).unwrap_or_default();
        }

        Ok((questions, Metadata::for_filters(total, filters)))
    }

    // --- ANSWERS ---

    async fn insert_answer(&self, req: &CreateAnswerRequest) -> RepoResult<Answer> {
        let sql = format!(
            "INSERT INTO answers (title, points) VALUES ($1, $2) RETURNING {ANSWER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Answer>(&sql)
            .bind(&req.title)
            .bind(req.points)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_answer(&self, id: i64) -> RepoResult<Answer> {
        if id < 1 {
            return Err(RepositoryError::RecordNotFound);
        }
        let sql = format!("SELECT {ANSWER_COLUMNS} FROM answers WHERE id = $1");
        sqlx::query_as::<_, Answer>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::RecordNotFound)
    }

    async fn update_answer(&self, answer: &Answer) -> RepoResult<Answer> {
        let sql = format!(
            "UPDATE answers SET title = $1, points = $2, version = version + 1 \
             WHERE id = $3 AND version = $4 RETURNING {ANSWER_COLUMNS}"
        );
        sqlx::query_as::<_, Answer>(&sql)
            .bind(&answer.title)
            .bind(answer.points)
            .bind(answer.id)
            .bind(answer.version)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::EditConflict)
    }

    async fn delete_answer(&self, id: i64) -> RepoResult<()> {
        if id < 1 {
            return Err(RepositoryError::RecordNotFound);
        }
        let result = sqlx::query("DELETE FROM answers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::RecordNotFound);
        }
        Ok(())
    }

    async fn list_answers(&self) -> RepoResult<Vec<Answer>> {
        let sql = format!("SELECT {ANSWER_COLUMNS} FROM answers ORDER BY id ASC");
        Ok(sqlx::query_as::<_, Answer>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }
}
