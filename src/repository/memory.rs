use async_trait::async_trait;
use chrono::Utc;
use std::{
    cmp::Ordering,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering as AtomicOrdering},
    },
};

use super::{Page, RepoResult, Repository, RepositoryError};
use crate::{
    filters::{Filters, Metadata},
    models::{
        Activity, Answer, CreateAnswerRequest, CreateQuestionRequest, NewActivity, NewUser,
        Question, Role, User, UserIkigai,
    },
    tokens::{Token, hash_plaintext},
};

#[derive(Default)]
struct Store {
    next_id: i64,
    users: Vec<User>,
    tokens: Vec<Token>,
    activities: Vec<Activity>,
    questions: Vec<Question>,
    answers: Vec<Answer>,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn answers_of(&self, question_id: i64) -> Vec<Answer> {
        self.answers
            .iter()
            .filter(|a| a.question_id == Some(question_id))
            .cloned()
            .collect()
    }
}

/// InMemoryRepository
///
/// A process-local implementation of [`Repository`] used by tests and local demos.
/// It follows the same conventions as the Postgres store (version checks, id bounds,
/// cascade on question delete) without needing a database.
#[derive(Default)]
pub struct InMemoryRepository {
    store: Mutex<Store>,
    // When set, every conditional update reports `EditConflict`, simulating a
    // concurrent writer.
    conflicting_updates: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository whose updates always lose the version race.
    pub fn with_conflicting_updates() -> Self {
        let repo = Self::default();
        repo.conflicting_updates.store(true, AtomicOrdering::SeqCst);
        repo
    }

    /// Stores a user with an explicit role and activation flag, bypassing registration.
    pub fn seed_user(&self, email: &str, name: &str, role: Role, activated: bool) -> User {
        let mut store = self.lock();
        let user = User {
            id: store.next_id(),
            created_at: Utc::now(),
            email: email.to_string(),
            name: name.to_string(),
            password_hash: String::new(),
            role,
            activated,
            version: 1,
        };
        store.users.push(user.clone());
        user
    }

    /// Number of stored tokens for `user_id` in `scope`.
    pub fn token_count(&self, scope: &str, user_id: i64) -> usize {
        self.lock()
            .tokens
            .iter()
            .filter(|t| t.scope == scope && t.user_id == user_id)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn conflicts(&self) -> bool {
        self.conflicting_updates.load(AtomicOrdering::SeqCst)
    }
}

fn paginate<T>(mut records: Vec<T>, filters: &Filters) -> Page<T> {
    let total = records.len() as i64;
    let start = (filters.offset().max(0) as usize).min(records.len());
    let end = (start + filters.limit().max(0) as usize).min(records.len());
    let page = records.drain(start..end).collect();
    (page, Metadata::for_filters(total, filters))
}

/// Applies the sort direction, then ascending id as the tiebreak.
fn directed(ordering: Ordering, filters: &Filters, left_id: i64, right_id: i64) -> Ordering {
    let ordering = if filters.sort_direction() == "DESC" {
        ordering.reverse()
    } else {
        ordering
    };
    ordering.then(left_id.cmp(&right_id))
}

fn compare_activities(a: &Activity, b: &Activity, filters: &Filters) -> Ordering {
    let ordering = match filters.sort_column() {
        "name" => a.name.cmp(&b.name),
        "answers_sum" => a.answers_sum.cmp(&b.answers_sum),
        "created_at" => a.created_at.cmp(&b.created_at),
        _ => a.id.cmp(&b.id),
    };
    directed(ordering, filters, a.id, b.id)
}

#[async_trait]
impl Repository for InMemoryRepository {
    // --- USERS ---

    async fn insert_user(&self, user: NewUser) -> RepoResult<User> {
        let mut store = self.lock();
        if store.users.iter().any(|u| u.email == user.email) {
            return Err(RepositoryError::DuplicateEmail);
        }
        let created = User {
            id: store.next_id(),
            created_at: Utc::now(),
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            role: Role::User,
            activated: false,
            version: 1,
        };
        store.users.push(created.clone());
        Ok(created)
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<User> {
        self.lock()
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(RepositoryError::RecordNotFound)
    }

    async fn update_user(&self, user: &User) -> RepoResult<User> {
        if self.conflicts() {
            return Err(RepositoryError::EditConflict);
        }
        let mut store = self.lock();
        if store
            .users
            .iter()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(RepositoryError::DuplicateEmail);
        }
        let stored = store
            .users
            .iter_mut()
            .find(|u| u.id == user.id && u.version == user.version)
            .ok_or(RepositoryError::EditConflict)?;

        *stored = User {
            version: user.version + 1,
            created_at: stored.created_at,
            role: stored.role,
            ..user.clone()
        };
        Ok(stored.clone())
    }

    async fn get_user_for_token(&self, scope: &str, plaintext: &str) -> RepoResult<User> {
        let hash = hash_plaintext(plaintext);
        let now = Utc::now();
        let store = self.lock();
        let token = store
            .tokens
            .iter()
            .find(|t| t.hash == hash && t.scope == scope && t.expiry > now)
            .ok_or(RepositoryError::RecordNotFound)?;

        store
            .users
            .iter()
            .find(|u| u.id == token.user_id)
            .cloned()
            .ok_or(RepositoryError::RecordNotFound)
    }

    async fn list_user_ikigais(&self, search_email: &str, filters: &Filters) -> RepoResult<Page<UserIkigai>> {
        let store = self.lock();
        let needle = search_email.to_lowercase();

        let mut rows: Vec<(&User, UserIkigai)> = store
            .users
            .iter()
            .filter(|u| needle.is_empty() || u.email.to_lowercase().contains(&needle))
            .filter_map(|u| {
                store
                    .activities
                    .iter()
                    .filter(|a| a.user_id == u.id)
                    .min_by(|a, b| b.answers_sum.cmp(&a.answers_sum).then(a.id.cmp(&b.id)))
                    .map(|best| {
                        let row = UserIkigai {
                            user_id: u.id,
                            email: u.email.clone(),
                            name: u.name.clone(),
                            ikigai: best.name.clone(),
                            answers_sum: best.answers_sum,
                            status: best.status,
                        };
                        (u, row)
                    })
            })
            .collect();

        rows.sort_by(|(a, _), (b, _)| {
            let ordering = match filters.sort_column() {
                "email" => a.email.cmp(&b.email),
                "name" => a.name.cmp(&b.name),
                _ => a.created_at.cmp(&b.created_at),
            };
            directed(ordering, filters, a.id, b.id)
        });

        let rows = rows.into_iter().map(|(_, row)| row).collect();
        Ok(paginate(rows, filters))
    }

    // --- TOKENS ---

    async fn insert_token(&self, token: &Token) -> RepoResult<()> {
        self.lock().tokens.push(token.clone());
        Ok(())
    }

    async fn delete_tokens_for_user(&self, scope: &str, user_id: i64) -> RepoResult<()> {
        self.lock()
            .tokens
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        Ok(())
    }

    // --- ACTIVITIES ---

    async fn insert_activity(&self, activity: NewActivity) -> RepoResult<Activity> {
        let mut store = self.lock();
        let created = Activity {
            id: store.next_id(),
            user_id: activity.user_id,
            name: activity.name,
            answer_points: activity.answer_points,
            answers_sum: activity.answers_sum,
            status: activity.status,
            created_at: Utc::now(),
            version: 1,
        };
        store.activities.push(created.clone());
        Ok(created)
    }

    async fn get_activity(&self, id: i64) -> RepoResult<Activity> {
        if id < 1 {
            return Err(RepositoryError::RecordNotFound);
        }
        self.lock()
            .activities
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(RepositoryError::RecordNotFound)
    }

    async fn update_activity(&self, activity: &Activity) -> RepoResult<Activity> {
        if self.conflicts() {
            return Err(RepositoryError::EditConflict);
        }
        let mut store = self.lock();
        let stored = store
            .activities
            .iter_mut()
            .find(|a| a.id == activity.id && a.version == activity.version)
            .ok_or(RepositoryError::EditConflict)?;

        *stored = Activity {
            version: activity.version + 1,
            user_id: stored.user_id,
            created_at: stored.created_at,
            ..activity.clone()
        };
        Ok(stored.clone())
    }

    async fn list_activities(&self, user_id: Option<i64>, filters: &Filters) -> RepoResult<Page<Activity>> {
        let mut activities: Vec<Activity> = self
            .lock()
            .activities
            .iter()
            .filter(|a| user_id.is_none_or(|owner| a.user_id == owner))
            .cloned()
            .collect();
        activities.sort_by(|a, b| compare_activities(a, b, filters));
        Ok(paginate(activities, filters))
    }

    // --- QUESTIONS ---

    async fn insert_question(&self, req: &CreateQuestionRequest) -> RepoResult<Question> {
        let mut store = self.lock();
        let mut question = Question {
            id: store.next_id(),
            title: req.title.clone(),
            video_url: req.video_url.clone(),
            version: 1,
            answers: Vec::with_capacity(req.answers.len()),
        };
        for answer in &req.answers {
            let created = Answer {
                id: store.next_id(),
                question_id: Some(question.id),
                title: answer.title.clone(),
                points: answer.points,
                version: 1,
            };
            store.answers.push(created.clone());
            question.answers.push(created);
        }
        store.questions.push(Question {
            answers: Vec::new(),
            ..question.clone()
        });
        Ok(question)
    }

    async fn get_question(&self, id: i64) -> RepoResult<Question> {
        if id < 1 {
            return Err(RepositoryError::RecordNotFound);
        }
        let store = self.lock();
        let question = store
            .questions
            .iter()
            .find(|q| q.id == id)
            .cloned()
            .ok_or(RepositoryError::RecordNotFound)?;
        Ok(Question {
            answers: store.answers_of(id),
            ..question
        })
    }

    async fn update_question(&self, question: &Question) -> RepoResult<Question> {
        if self.conflicts() {
            return Err(RepositoryError::EditConflict);
        }
        let mut store = self.lock();
        let stored = store
            .questions
            .iter_mut()
            .find(|q| q.id == question.id && q.version == question.version)
            .ok_or(RepositoryError::EditConflict)?;

        stored.title = question.title.clone();
        stored.video_url = question.video_url.clone();
        stored.version += 1;
        Ok(Question {
            answers: question.answers.clone(),
            ..stored.clone()
        })
    }

    async fn delete_question(&self, id: i64) -> RepoResult<()> {
        let mut store = self.lock();
        let before = store.questions.len();
        store.questions.retain(|q| q.id != id);
        if store.questions.len() == before {
            return Err(RepositoryError::RecordNotFound);
        }
        store.answers.retain(|a| a.question_id != Some(id));
        Ok(())
    }

    async fn list_questions(&self, filters: &Filters) -> RepoResult<Page<Question>> {
        let store = self.lock();
        let mut questions = store.questions.clone();
        questions.sort_by(|a, b| {
            let ordering = match filters.sort_column() {
                "title" => a.title.cmp(&b.title),
                _ => a.id.cmp(&b.id),
            };
            directed(ordering, filters, a.id, b.id)
        });

        let (mut page, metadata) = paginate(questions, filters);
        for question in &mut page {
            question.answers = store.answers_of(question.id);
        }
        Ok((page, metadata))
    }

    // --- ANSWERS ---

    async fn insert_answer(&self, req: &CreateAnswerRequest) -> RepoResult<Answer> {
        let mut store = self.lock();
        let created = Answer {
            id: store.next_id(),
            question_id: None,
            title: req.title.clone(),
            points: req.points,
            version: 1,
        };
        store.answers.push(created.clone());
        Ok(created)
    }

    async fn get_answer(&self, id: i64) -> RepoResult<Answer> {
        if id < 1 {
            return Err(RepositoryError::RecordNotFound);
        }
        self.lock()
            .answers
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(RepositoryError::RecordNotFound)
    }

    async fn update_answer(&self, answer: &Answer) -> RepoResult<Answer> {
        if self.conflicts() {
            return Err(RepositoryError::EditConflict);
        }
        let mut store = self.lock();
        let stored = store
            .answers
            .iter_mut()
            .find(|a| a.id == answer.id && a.version == answer.version)
            .ok_or(RepositoryError::EditConflict)?;

        stored.title = answer.title.clone();
        stored.points = answer.points;
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn delete_answer(&self, id: i64) -> RepoResult<()> {
        let mut store = self.lock();
        let before = store.answers.len();
        store.answers.retain(|a| a.id != id);
        if store.answers.len() == before {
            return Err(RepositoryError::RecordNotFound);
        }
        Ok(())
    }

    async fn list_answers(&self) -> RepoResult<Vec<Answer>> {
        Ok(self.lock().answers.clone())
    }
}
