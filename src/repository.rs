use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, query_builder::QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        CatalogEntry, CatalogKind, Comment, ConfirmationCode, NewComment, NewReview, NewUser,
        Review, Title, TitleDraft, TitleFilter, User,
    },
};

/// Repository Trait
///
/// The abstract contract for all persistence operations. Handlers only see this trait,
/// so the Postgres store and the in-memory store are interchangeable.
///
/// **Send + Sync + async_trait** are required to share the trait object
/// (`Arc<dyn Repository>`) across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    // Ordered by username; `search` is a case-insensitive substring.
    async fn list_users(&self, search: Option<String>) -> AppResult<Vec<User>>;
    // Fails with Conflict when the username or email is taken.
    async fn create_user(&self, user: NewUser) -> AppResult<User>;
    // Overwrites every mutable field of the user with `user.id`. `None` if it is gone.
    async fn update_user(&self, user: User) -> AppResult<Option<User>>;
    async fn delete_user(&self, id: Uuid) -> AppResult<bool>;

    // --- Confirmation codes ---
    // Replaces any previous code for the user.
    async fn store_confirmation_code(&self, user_id: Uuid, code: String) -> AppResult<ConfirmationCode>;
    async fn get_confirmation_code(&self, user_id: Uuid) -> AppResult<Option<ConfirmationCode>>;

    // --- Categories & genres ---
    async fn list_catalog(&self, kind: CatalogKind, search: Option<String>) -> AppResult<Vec<CatalogEntry>>;
    async fn get_catalog_entry(&self, kind: CatalogKind, slug: &str) -> AppResult<Option<CatalogEntry>>;
    async fn create_catalog_entry(&self, kind: CatalogKind, name: String, slug: String) -> AppResult<CatalogEntry>;
    async fn delete_catalog_entry(&self, kind: CatalogKind, slug: &str) -> AppResult<bool>;

    // --- Titles ---
    // Ordered by year, newest first. Every returned title carries its computed rating.
    async fn list_titles(&self, filter: &TitleFilter) -> AppResult<Vec<Title>>;
    async fn get_title(&self, id: i64) -> AppResult<Option<Title>>;
    async fn create_title(&self, draft: TitleDraft) -> AppResult<Title>;
    async fn update_title(&self, id: i64, draft: TitleDraft) -> AppResult<Option<Title>>;
    async fn delete_title(&self, id: i64) -> AppResult<bool>;

    // --- Reviews ---
    async fn list_reviews(&self, title_id: i64) -> AppResult<Vec<Review>>;
    // Scoped: a review of another title is not found.
    async fn get_review(&self, title_id: i64, review_id: i64) -> AppResult<Option<Review>>;
    async fn find_review_by_author(&self, title_id: i64, author_id: Uuid) -> AppResult<Option<Review>>;
    // Fails with Conflict on a second review by the same author for the same title.
    async fn create_review(&self, review: NewReview) -> AppResult<Review>;
    // Persists `text` and `score` of the review with `review.id`.
    async fn update_review(&self, review: Review) -> AppResult<Option<Review>>;
    async fn delete_review(&self, review_id: i64) -> AppResult<bool>;

    // --- Comments ---
    async fn list_comments(&self, review_id: i64) -> AppResult<Vec<Comment>>;
    async fn get_comment(&self, review_id: i64, comment_id: i64) -> AppResult<Option<Comment>>;
    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment>;
    async fn update_comment(&self, comment: Comment) -> AppResult<Option<Comment>>;
    async fn delete_comment(&self, comment_id: i64) -> AppResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, bio, role, is_superuser";

const TITLE_SELECT: &str = r#"
    SELECT
        t.id, t.name, t.year, t.description,
        (SELECT AVG(r.score)::float8 FROM reviews r WHERE r.title_id = t.id) AS rating,
        c.id AS category_id, c.name AS category_name, c.slug AS category_slug
    FROM titles t
    LEFT JOIN categories c ON c.id = t.category_id
    WHERE TRUE
"#;

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.title_id, r.author_id, u.username AS author, r.text, r.score, r.created_at
    FROM reviews r
    JOIN users u ON u.id = r.author_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.review_id, c.author_id, u.username AS author, c.text, c.created_at
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

/// A `titles` row joined with its category and rating, before genres are attached.
#[derive(Debug, FromRow)]
struct TitleRow {
    id: i64,
    name: String,
    year: i32,
    description: Option<String>,
    rating: Option<f64>,
    category_id: Option<i64>,
    category_name: Option<String>,
    category_slug: Option<String>,
}

impl TitleRow {
    fn into_title(self, genre: Vec<CatalogEntry>) -> Title {
        let category = match (self.category_id, self.category_name, self.category_slug) {
            (Some(id), Some(name), Some(slug)) => Some(CatalogEntry { id, name, slug }),
            _ => None,
        };
        Title {
            id: self.id,
            name: self.name,
            year: self.year,
            rating: self.rating,
            description: self.description,
            genre,
            category,
        }
    }
}

#[derive(Debug, FromRow)]
struct GenreLink {
    title_id: i64,
    id: i64,
    name: String,
    slug: String,
}

/// Substring pattern for `ILIKE ... ESCAPE '\'`; wildcards in the search text match
/// literally.
fn like_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL. Queries
/// are checked at runtime (`query_as` + `QueryBuilder`) and every value is bound, never
/// interpolated; only table names from [`CatalogKind`] are formatted in.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// attach_genres
    ///
    /// Loads the genres of all `rows` in one query and assembles the API titles,
    /// preserving the order of `rows`.
    async fn attach_genres(&self, rows: Vec<TitleRow>) -> AppResult<Vec<Title>> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();

        let links = sqlx::query_as::<_, GenreLink>(
            r#"
            SELECT tg.title_id, g.id, g.name, g.slug
            FROM title_genres tg
            JOIN genres g ON g.id = tg.genre_id
            WHERE tg.title_id = ANY($1)
            ORDER BY g.name
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await?;

        let mut by_title: HashMap<i64, Vec<CatalogEntry>> = HashMap::new();
        for link in links {
            by_title.entry(link.title_id).or_default().push(CatalogEntry {
                id: link.id,
                name: link.name,
                slug: link.slug,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let genre = by_title.remove(&row.id).unwrap_or_default();
                row.into_title(genre)
            })
            .collect())
    }

    async fn write_title_genres(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        title_id: i64,
        genre_ids: &[i64],
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM title_genres WHERE title_id = $1")
            .bind(title_id)
            .execute(&mut **tx)
            .await?;
        for genre_id in genre_ids {
            sqlx::query(
                "INSERT INTO title_genres (title_id, genre_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(title_id)
            .bind(genre_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// list_users
    ///
    /// Directory listing for admins, with optional username search.
    async fn list_users(&self, search: Option<String>) -> AppResult<Vec<User>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE TRUE"));
        if let Some(s) = search {
            builder.push(" AND username ILIKE ");
            builder.push_bind(like_pattern(&s));
            builder.push(r" ESCAPE '\'");
        }
        builder.push(" ORDER BY username");

        Ok(builder.build_query_as::<User>().fetch_all(&self.pool).await?)
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, email, first_name, last_name, bio, role, is_superuser)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user.username)
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.bio)
        .bind(user.role.as_str())
        .bind(user.is_superuser)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_user(&self, user: User) -> AppResult<Option<User>> {
        let updated = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET username = $2, email = $3, first_name = $4, last_name = $5, bio = $6, role = $7
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(user.username)
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.bio)
        .bind(user.role.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    /// delete_user
    ///
    /// Reviews, comments and the pending code go with the user (ON DELETE CASCADE).
    async fn delete_user(&self, id: Uuid) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- CONFIRMATION CODES ---

    /// store_confirmation_code
    ///
    /// Upsert keyed by user: the newest code always wins and restarts the expiry clock.
    async fn store_confirmation_code(&self, user_id: Uuid, code: String) -> AppResult<ConfirmationCode> {
        let stored = sqlx::query_as::<_, ConfirmationCode>(
            r#"
            INSERT INTO confirmation_codes (user_id, code, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id) DO UPDATE SET code = EXCLUDED.code, created_at = EXCLUDED.created_at
            RETURNING user_id, code, created_at
            "#,
        )
        .bind(user_id)
        .bind(code)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn get_confirmation_code(&self, user_id: Uuid) -> AppResult<Option<ConfirmationCode>> {
        let code = sqlx::query_as::<_, ConfirmationCode>(
            "SELECT user_id, code, created_at FROM confirmation_codes WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(code)
    }

    // --- CATEGORIES & GENRES ---

    async fn list_catalog(&self, kind: CatalogKind, search: Option<String>) -> AppResult<Vec<CatalogEntry>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT id, name, slug FROM {} WHERE TRUE", kind.table()));
        if let Some(s) = search {
            builder.push(" AND name ILIKE ");
            builder.push_bind(like_pattern(&s));
            builder.push(r" ESCAPE '\'");
        }
        builder.push(" ORDER BY name, id");

        Ok(builder.build_query_as::<CatalogEntry>().fetch_all(&self.pool).await?)
    }

    async fn get_catalog_entry(&self, kind: CatalogKind, slug: &str) -> AppResult<Option<CatalogEntry>> {
        let entry = sqlx::query_as::<_, CatalogEntry>(&format!(
            "SELECT id, name, slug FROM {} WHERE slug = $1",
            kind.table()
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn create_catalog_entry(&self, kind: CatalogKind, name: String, slug: String) -> AppResult<CatalogEntry> {
        let entry = sqlx::query_as::<_, CatalogEntry>(&format!(
            "INSERT INTO {} (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
            kind.table()
        ))
        .bind(name)
        .bind(slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(entry)
    }

    /// delete_catalog_entry
    ///
    /// Titles in a deleted category keep existing with `category_id = NULL`; deleted
    /// genres drop out of `title_genres`.
    async fn delete_catalog_entry(&self, kind: CatalogKind, slug: &str) -> AppResult<bool> {
        let res = sqlx::query(&format!("DELETE FROM {} WHERE slug = $1", kind.table()))
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- TITLES ---

    /// list_titles
    ///
    /// Builds the filter with QueryBuilder so every value stays parameterized.
    /// Filters are AND-combined.
    async fn list_titles(&self, filter: &TitleFilter) -> AppResult<Vec<Title>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(TITLE_SELECT);

        for term in filter.name_terms() {
            builder.push(" AND t.name ILIKE ");
            builder.push_bind(like_pattern(term));
            builder.push(r" ESCAPE '\'");
        }
        if let Some(year) = filter.year {
            builder.push(" AND t.year = ");
            builder.push_bind(year);
        }
        if let Some(category) = &filter.category {
            builder.push(" AND c.slug = ");
            builder.push_bind(category.clone());
        }
        if let Some(genre) = &filter.genre {
            builder.push(
                " AND t.id IN (SELECT tg.title_id FROM title_genres tg \
                 JOIN genres g ON g.id = tg.genre_id WHERE g.slug = ",
            );
            builder.push_bind(genre.clone());
            builder.push(")");
        }
        builder.push(" ORDER BY t.year DESC, t.id");

        let rows = builder.build_query_as::<TitleRow>().fetch_all(&self.pool).await?;
        self.attach_genres(rows).await
    }

    async fn get_title(&self, id: i64) -> AppResult<Option<Title>> {
        let row = sqlx::query_as::<_, TitleRow>(&format!("{TITLE_SELECT} AND t.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.attach_genres(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// create_title
    ///
    /// Inserts the title and its genre links in one transaction.
    async fn create_title(&self, draft: TitleDraft) -> AppResult<Title> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO titles (name, year, description, category_id) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&draft.name)
        .bind(draft.year)
        .bind(&draft.description)
        .bind(draft.category_id)
        .fetch_one(&mut *tx)
        .await?;

        Self::write_title_genres(&mut tx, id, &draft.genre_ids).await?;
        tx.commit().await?;

        self.get_title(id).await?.ok_or_else(|| AppError::not_found("Title"))
    }

    async fn update_title(&self, id: i64, draft: TitleDraft) -> AppResult<Option<Title>> {
        let mut tx = self.pool.begin().await?;

        let res = sqlx::query(
            "UPDATE titles SET name = $2, year = $3, description = $4, category_id = $5 WHERE id = $1",
        )
        .bind(id)
        .bind(&draft.name)
        .bind(draft.year)
        .bind(&draft.description)
        .bind(draft.category_id)
        .execute(&mut *tx)
        .await?;
        if res.rows_affected() == 0 {
            return Ok(None);
        }

        Self::write_title_genres(&mut tx, id, &draft.genre_ids).await?;
        tx.commit().await?;

        self.get_title(id).await
    }

    async fn delete_title(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM titles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- REVIEWS ---

    async fn list_reviews(&self, title_id: i64) -> AppResult<Vec<Review>> {
        let reviews = sqlx::query_as::<_, Review>(&format!(
            "{REVIEW_SELECT} WHERE r.title_id = $1 ORDER BY r.created_at, r.id"
        ))
        .bind(title_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }

    async fn get_review(&self, title_id: i64, review_id: i64) -> AppResult<Option<Review>> {
        let review = sqlx::query_as::<_, Review>(&format!(
            "{REVIEW_SELECT} WHERE r.title_id = $1 AND r.id = $2"
        ))
        .bind(title_id)
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(review)
    }

    async fn find_review_by_author(&self, title_id: i64, author_id: Uuid) -> AppResult<Option<Review>> {
        let review = sqlx::query_as::<_, Review>(&format!(
            "{REVIEW_SELECT} WHERE r.title_id = $1 AND r.author_id = $2"
        ))
        .bind(title_id)
        .bind(author_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(review)
    }

    /// create_review
    ///
    /// Insert and author JOIN in one CTE. A concurrent duplicate trips
    /// `reviews_title_author_unique` and comes back as `AppError::Conflict`.
    async fn create_review(&self, review: NewReview) -> AppResult<Review> {
        let created = sqlx::query_as::<_, Review>(
            r#"
            WITH inserted AS (
                INSERT INTO reviews (title_id, author_id, text, score)
                VALUES ($1, $2, $3, $4)
                RETURNING id, title_id, author_id, text, score, created_at
            )
            SELECT i.id, i.title_id, i.author_id, u.username AS author, i.text, i.score, i.created_at
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(review.title_id)
        .bind(review.author_id)
        .bind(review.text)
        .bind(review.score)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_review(&self, review: Review) -> AppResult<Option<Review>> {
        let updated = sqlx::query_as::<_, Review>(
            r#"
            WITH updated AS (
                UPDATE reviews SET text = $2, score = $3 WHERE id = $1
                RETURNING id, title_id, author_id, text, score, created_at
            )
            SELECT d.id, d.title_id, d.author_id, u.username AS author, d.text, d.score, d.created_at
            FROM updated d JOIN users u ON u.id = d.author_id
            "#,
        )
        .bind(review.id)
        .bind(review.text)
        .bind(review.score)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_review(&self, review_id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(review_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- COMMENTS ---

    async fn list_comments(&self, review_id: i64) -> AppResult<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} WHERE c.review_id = $1 ORDER BY c.created_at, c.id"
        ))
        .bind(review_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn get_comment(&self, review_id: i64, comment_id: i64) -> AppResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} WHERE c.review_id = $1 AND c.id = $2"
        ))
        .bind(review_id)
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        let created = sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (review_id, author_id, text) VALUES ($1, $2, $3)
                RETURNING id, review_id, author_id, text, created_at
            )
            SELECT i.id, i.review_id, i.author_id, u.username AS author, i.text, i.created_at
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(comment.review_id)
        .bind(comment.author_id)
        .bind(comment.text)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_comment(&self, comment: Comment) -> AppResult<Option<Comment>> {
        let updated = sqlx::query_as::<_, Comment>(
            r#"
            WITH updated AS (
                UPDATE comments SET text = $2 WHERE id = $1
                RETURNING id, review_id, author_id, text, created_at
            )
            SELECT d.id, d.review_id, d.author_id, u.username AS author, d.text, d.created_at
            FROM updated d JOIN users u ON u.id = d.author_id
            "#,
        )
        .bind(comment.id)
        .bind(comment.text)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_comment(&self, comment_id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
