use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        CatalogEntry, CatalogKind, Comment, ConfirmationCode, NewComment, NewReview, NewUser,
        Review, Title, TitleDraft, TitleFilter, User,
    },
    repository::Repository,
};

/// InMemoryRepository
///
/// A process-local `Repository` with the same observable rules as the Postgres store:
/// unique usernames, emails and slugs, one review per `(title, author)`, cascading
/// deletes and `SET NULL` on category removal. Used for local runs without
/// `DATABASE_URL` and by the integration tests.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    users: Vec<User>,
    codes: HashMap<Uuid, ConfirmationCode>,
    categories: Vec<CatalogEntry>,
    genres: Vec<CatalogEntry>,
    titles: Vec<StoredTitle>,
    reviews: Vec<StoredReview>,
    comments: Vec<StoredComment>,
}

struct StoredTitle {
    id: i64,
    draft: TitleDraft,
}

struct StoredReview {
    id: i64,
    title_id: i64,
    author_id: Uuid,
    text: String,
    score: i32,
    created_at: DateTime<Utc>,
}

struct StoredComment {
    id: i64,
    review_id: i64,
    author_id: Uuid,
    text: String,
    created_at: DateTime<Utc>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn catalog(&self, kind: CatalogKind) -> &Vec<CatalogEntry> {
        match kind {
            CatalogKind::Category => &self.categories,
            CatalogKind::Genre => &self.genres,
        }
    }

    fn catalog_mut(&mut self, kind: CatalogKind) -> &mut Vec<CatalogEntry> {
        match kind {
            CatalogKind::Category => &mut self.categories,
            CatalogKind::Genre => &mut self.genres,
        }
    }

    fn username_of(&self, id: Uuid) -> String {
        self.users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    fn ensure_identity_free(&self, username: &str, email: &str, except: Option<Uuid>) -> AppResult<()> {
        let others = self.users.iter().filter(|u| Some(u.id) != except);
        for user in others {
            if user.username == username {
                return Err(AppError::Conflict("Duplicate entry violates users_username_key.".to_string()));
            }
            if user.email == email {
                return Err(AppError::Conflict("Duplicate entry violates users_email_key.".to_string()));
            }
        }
        Ok(())
    }

    fn render_title(&self, stored: &StoredTitle) -> Title {
        let scores: Vec<i32> = self
            .reviews
            .iter()
            .filter(|r| r.title_id == stored.id)
            .map(|r| r.score)
            .collect();
        let rating = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().map(|&s| f64::from(s)).sum::<f64>() / scores.len() as f64)
        };

        let mut genre: Vec<CatalogEntry> = self
            .genres
            .iter()
            .filter(|g| stored.draft.genre_ids.contains(&g.id))
            .cloned()
            .collect();
        genre.sort_by(|a, b| a.name.cmp(&b.name));

        Title {
            id: stored.id,
            name: stored.draft.name.clone(),
            year: stored.draft.year,
            rating,
            description: stored.draft.description.clone(),
            genre,
            category: stored
                .draft
                .category_id
                .and_then(|id| self.categories.iter().find(|c| c.id == id).cloned()),
        }
    }

    fn render_review(&self, stored: &StoredReview) -> Review {
        Review {
            id: stored.id,
            title_id: stored.title_id,
            author_id: stored.author_id,
            author: self.username_of(stored.author_id),
            text: stored.text.clone(),
            score: stored.score,
            created_at: stored.created_at,
        }
    }

    fn render_comment(&self, stored: &StoredComment) -> Comment {
        Comment {
            id: stored.id,
            review_id: stored.review_id,
            author_id: stored.author_id,
            author: self.username_of(stored.author_id),
            text: stored.text.clone(),
            created_at: stored.created_at,
        }
    }

    /// Removes the given reviews together with their comments.
    fn drop_reviews(&mut self, doomed: impl Fn(&StoredReview) -> bool) {
        let review_ids: Vec<i64> = self.reviews.iter().filter(|r| doomed(r)).map(|r| r.id).collect();
        self.reviews.retain(|r| !review_ids.contains(&r.id));
        self.comments.retain(|c| !review_ids.contains(&c.review_id));
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    // --- USERS ---

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.state().users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        Ok(self.state().users.iter().find(|u| u.username == username).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.state().users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, search: Option<String>) -> AppResult<Vec<User>> {
        let state = self.state();
        let mut users: Vec<User> = state
            .users
            .iter()
            .filter(|u| search.as_deref().is_none_or(|s| contains_ci(&u.username, s)))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let mut state = self.state();
        state.ensure_identity_free(&user.username, &user.email, None)?;
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            role: user.role,
            is_superuser: user.is_superuser,
        };
        state.users.push(created.clone());
        Ok(created)
    }

    async fn update_user(&self, user: User) -> AppResult<Option<User>> {
        let mut state = self.state();
        if !state.users.iter().any(|u| u.id == user.id) {
            return Ok(None);
        }
        state.ensure_identity_free(&user.username, &user.email, Some(user.id))?;
        let Some(slot) = state.users.iter_mut().find(|u| u.id == user.id) else {
            return Ok(None);
        };
        // The superuser flag is not writable through the API.
        let updated = User {
            is_superuser: slot.is_superuser,
            ..user
        };
        *slot = updated.clone();
        Ok(Some(updated))
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.state();
        let before = state.users.len();
        state.users.retain(|u| u.id != id);
        if state.users.len() == before {
            return Ok(false);
        }
        state.codes.remove(&id);
        state.drop_reviews(|r| r.author_id == id);
        state.comments.retain(|c| c.author_id != id);
        Ok(true)
    }

    // --- CONFIRMATION CODES ---

    async fn store_confirmation_code(&self, user_id: Uuid, code: String) -> AppResult<ConfirmationCode> {
        let mut state = self.state();
        if !state.users.iter().any(|u| u.id == user_id) {
            return Err(AppError::not_found("User"));
        }
        let stored = ConfirmationCode {
            user_id,
            code,
            created_at: Utc::now(),
        };
        state.codes.insert(user_id, stored.clone());
        Ok(stored)
    }

    async fn get_confirmation_code(&self, user_id: Uuid) -> AppResult<Option<ConfirmationCode>> {
        Ok(self.state().codes.get(&user_id).cloned())
    }

    // --- CATEGORIES & GENRES ---

    async fn list_catalog(&self, kind: CatalogKind, search: Option<String>) -> AppResult<Vec<CatalogEntry>> {
        let state = self.state();
        let mut entries: Vec<CatalogEntry> = state
            .catalog(kind)
            .iter()
            .filter(|e| search.as_deref().is_none_or(|s| contains_ci(&e.name, s)))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    async fn get_catalog_entry(&self, kind: CatalogKind, slug: &str) -> AppResult<Option<CatalogEntry>> {
        Ok(self.state().catalog(kind).iter().find(|e| e.slug == slug).cloned())
    }

    async fn create_catalog_entry(&self, kind: CatalogKind, name: String, slug: String) -> AppResult<CatalogEntry> {
        let mut state = self.state();
        if state.catalog(kind).iter().any(|e| e.slug == slug) {
            return Err(AppError::Conflict(format!(
                "Duplicate entry violates {}_slug_key.",
                kind.table()
            )));
        }
        let entry = CatalogEntry {
            id: state.next_id(),
            name,
            slug,
        };
        state.catalog_mut(kind).push(entry.clone());
        Ok(entry)
    }

    async fn delete_catalog_entry(&self, kind: CatalogKind, slug: &str) -> AppResult<bool> {
        let mut state = self.state();
        let Some(id) = state.catalog(kind).iter().find(|e| e.slug == slug).map(|e| e.id) else {
            return Ok(false);
        };
        state.catalog_mut(kind).retain(|e| e.id != id);
        for title in state.titles.iter_mut() {
            match kind {
                CatalogKind::Category if title.draft.category_id == Some(id) => {
                    title.draft.category_id = None;
                }
                CatalogKind::Genre => title.draft.genre_ids.retain(|g| *g != id),
                _ => {}
            }
        }
        Ok(true)
    }

    // --- TITLES ---

    async fn list_titles(&self, filter: &TitleFilter) -> AppResult<Vec<Title>> {
        let state = self.state();
        let mut titles: Vec<Title> = state
            .titles
            .iter()
            .map(|stored| state.render_title(stored))
            .filter(|t| filter.name_terms().all(|n| contains_ci(&t.name, n)))
            .filter(|t| filter.year.is_none_or(|y| t.year == y))
            .filter(|t| {
                filter
                    .category
                    .as_deref()
                    .is_none_or(|slug| t.category.as_ref().is_some_and(|c| c.slug == slug))
            })
            .filter(|t| {
                filter
                    .genre
                    .as_deref()
                    .is_none_or(|slug| t.genre.iter().any(|g| g.slug == slug))
            })
            .collect();
        titles.sort_by(|a, b| b.year.cmp(&a.year).then(a.id.cmp(&b.id)));
        Ok(titles)
    }

    async fn get_title(&self, id: i64) -> AppResult<Option<Title>> {
        let state = self.state();
        Ok(state
            .titles
            .iter()
            .find(|t| t.id == id)
            .map(|stored| state.render_title(stored)))
    }

    async fn create_title(&self, draft: TitleDraft) -> AppResult<Title> {
        let mut state = self.state();
        let stored = StoredTitle {
            id: state.next_id(),
            draft,
        };
        let title = state.render_title(&stored);
        state.titles.push(stored);
        Ok(title)
    }

    async fn update_title(&self, id: i64, draft: TitleDraft) -> AppResult<Option<Title>> {
        let mut state = self.state();
        let Some(slot) = state.titles.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        slot.draft = draft;
        Ok(state
            .titles
            .iter()
            .find(|t| t.id == id)
            .map(|stored| state.render_title(stored)))
    }

    async fn delete_title(&self, id: i64) -> AppResult<bool> {
        let mut state = self.state();
        let before = state.titles.len();
        state.titles.retain(|t| t.id != id);
        if state.titles.len() == before {
            return Ok(false);
        }
        state.drop_reviews(|r| r.title_id == id);
        Ok(true)
    }

    // --- REVIEWS ---

    async fn list_reviews(&self, title_id: i64) -> AppResult<Vec<Review>> {
        let state = self.state();
        Ok(state
            .reviews
            .iter()
            .filter(|r| r.title_id == title_id)
            .map(|r| state.render_review(r))
            .collect())
    }

    async fn get_review(&self, title_id: i64, review_id: i64) -> AppResult<Option<Review>> {
        let state = self.state();
        Ok(state
            .reviews
            .iter()
            .find(|r| r.title_id == title_id && r.id == review_id)
            .map(|r| state.render_review(r)))
    }

    async fn find_review_by_author(&self, title_id: i64, author_id: Uuid) -> AppResult<Option<Review>> {
        let state = self.state();
        Ok(state
            .reviews
            .iter()
            .find(|r| r.title_id == title_id && r.author_id == author_id)
            .map(|r| state.render_review(r)))
    }

    /// create_review
    ///
    /// The uniqueness check and the insert happen under one lock, which is what the
    /// unique constraint gives the Postgres store.
    async fn create_review(&self, review: NewReview) -> AppResult<Review> {
        let mut state = self.state();
        if !state.titles.iter().any(|t| t.id == review.title_id) {
            return Err(AppError::not_found("Title"));
        }
        if state
            .reviews
            .iter()
            .any(|r| r.title_id == review.title_id && r.author_id == review.author_id)
        {
            return Err(AppError::Conflict(
                "Duplicate entry violates reviews_title_author_unique.".to_string(),
            ));
        }
        let stored = StoredReview {
            id: state.next_id(),
            title_id: review.title_id,
            author_id: review.author_id,
            text: review.text,
            score: review.score,
            created_at: Utc::now(),
        };
        let rendered = state.render_review(&stored);
        state.reviews.push(stored);
        Ok(rendered)
    }

    async fn update_review(&self, review: Review) -> AppResult<Option<Review>> {
        let mut state = self.state();
        let Some(slot) = state.reviews.iter_mut().find(|r| r.id == review.id) else {
            return Ok(None);
        };
        slot.text = review.text;
        slot.score = review.score;
        Ok(state
            .reviews
            .iter()
            .find(|r| r.id == review.id)
            .map(|r| state.render_review(r)))
    }

    async fn delete_review(&self, review_id: i64) -> AppResult<bool> {
        let mut state = self.state();
        let existed = state.reviews.iter().any(|r| r.id == review_id);
        state.drop_reviews(|r| r.id == review_id);
        Ok(existed)
    }

    // --- COMMENTS ---

    async fn list_comments(&self, review_id: i64) -> AppResult<Vec<Comment>> {
        let state = self.state();
        Ok(state
            .comments
            .iter()
            .filter(|c| c.review_id == review_id)
            .map(|c| state.render_comment(c))
            .collect())
    }

    async fn get_comment(&self, review_id: i64, comment_id: i64) -> AppResult<Option<Comment>> {
        let state = self.state();
        Ok(state
            .comments
            .iter()
            .find(|c| c.review_id == review_id && c.id == comment_id)
            .map(|c| state.render_comment(c)))
    }

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        let mut state = self.state();
        if !state.reviews.iter().any(|r| r.id == comment.review_id) {
            return Err(AppError::not_found("Review"));
        }
        let stored = StoredComment {
            id: state.next_id(),
            review_id: comment.review_id,
            author_id: comment.author_id,
            text: comment.text,
            created_at: Utc::now(),
        };
        let rendered = state.render_comment(&stored);
        state.comments.push(stored);
        Ok(rendered)
    }

    async fn update_comment(&self, comment: Comment) -> AppResult<Option<Comment>> {
        let mut state = self.state();
        let Some(slot) = state.comments.iter_mut().find(|c| c.id == comment.id) else {
            return Ok(None);
        };
        slot.text = comment.text;
        Ok(state
            .comments
            .iter()
            .find(|c| c.id == comment.id)
            .map(|c| state.render_comment(c)))
    }

    async fn delete_comment(&self, comment_id: i64) -> AppResult<bool> {
        let mut state = self.state();
        let before = state.comments.len();
        state.comments.retain(|c| c.id != comment_id);
        Ok(state.comments.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (InMemoryRepository, User, i64) {
        let repo = InMemoryRepository::new();
        let user = repo
            .create_user(NewUser::with_identity("alice".into(), "alice@x.com".into()))
            .await
            .unwrap();
        let title = repo
            .create_title(TitleDraft {
                name: "Dune".into(),
                year: 1965,
                ..TitleDraft::default()
            })
            .await
            .unwrap();
        (repo, user, title.id)
    }

    #[tokio::test]
    async fn duplicate_review_is_a_conflict() {
        let (repo, user, title_id) = seeded().await;
        let review = NewReview {
            title_id,
            author_id: user.id,
            text: "great".into(),
            score: 9,
        };
        repo.create_review(review.clone()).await.unwrap();
        let second = repo.create_review(review).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn deleting_a_title_cascades_to_reviews_and_comments() {
        let (repo, user, title_id) = seeded().await;
        let review = repo
            .create_review(NewReview {
                title_id,
                author_id: user.id,
                text: "ok".into(),
                score: 5,
            })
            .await
            .unwrap();
        repo.create_comment(NewComment {
            review_id: review.id,
            author_id: user.id,
            text: "agreed".into(),
        })
        .await
        .unwrap();

        assert!(repo.delete_title(title_id).await.unwrap());
        assert!(repo.list_reviews(title_id).await.unwrap().is_empty());
        assert!(repo.list_comments(review.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_category_nulls_it_on_titles() {
        let repo = InMemoryRepository::new();
        let category = repo
            .create_catalog_entry(CatalogKind::Category, "Books".into(), "books".into())
            .await
            .unwrap();
        let title = repo
            .create_title(TitleDraft {
                name: "Emma".into(),
                year: 1815,
                category_id: Some(category.id),
                ..TitleDraft::default()
            })
            .await
            .unwrap();
        assert_eq!(title.category.as_ref().map(|c| c.slug.as_str()), Some("books"));

        repo.delete_catalog_entry(CatalogKind::Category, "books").await.unwrap();
        let title = repo.get_title(title.id).await.unwrap().unwrap();
        assert_eq!(title.category, None);
    }

    #[tokio::test]
    async fn email_must_stay_unique_on_update() {
        let repo = InMemoryRepository::new();
        repo.create_user(NewUser::with_identity("a".into(), "a@x.com".into()))
            .await
            .unwrap();
        let b = repo
            .create_user(NewUser::with_identity("b".into(), "b@x.com".into()))
            .await
            .unwrap();
        let clash = User {
            email: "a@x.com".into(),
            ..b
        };
        assert!(matches!(repo.update_user(clash).await, Err(AppError::Conflict(_))));
    }
}
