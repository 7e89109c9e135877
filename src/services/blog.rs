//! Blog service
//!
//! Post CRUD, the like/dislike state machine, view counting, filtering,
//! title search and AI writing suggestions.
//!
//! Per (user, post) a reaction moves through:
//!
//! ```text
//! NONE     --like-->    LIKED      NONE     --dislike--> DISLIKED
//! LIKED    --dislike--> DISLIKED   DISLIKED --like-->    LIKED
//! LIKED    --like-->    AlreadyReacted
//! DISLIKED --dislike--> AlreadyReacted
//! ```
//!
//! Each transition runs as one store transaction; see
//! [`InteractionRepository::apply_reaction`].

use crate::db::repositories::{BlogRepository, InteractionRepository};
use crate::models::{
    normalize_tags, Blog, BlogFilter, CreateBlogInput, ReactionKind, ReactionOutcome, SortBy,
    UpdateBlogInput, User,
};
use crate::services::ai::{AiError, AiService};
use crate::services::with_deadline;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Error types for blog service operations
#[derive(Debug, thiserror::Error)]
pub enum BlogServiceError {
    #[error("{0}")]
    NotFound(String),

    /// The user already holds the requested reaction
    #[error("{0}")]
    AlreadyReacted(String),

    #[error("{0}")]
    InvalidArgument(String),

    /// Actor is neither the author nor an admin
    #[error("{0}")]
    Forbidden(String),

    #[error("store operation timed out after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Ai(#[from] AiError),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

fn blog_not_found() -> BlogServiceError {
    BlogServiceError::NotFound("blog not found".to_string())
}

/// Counters after a successful reaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionSummary {
    pub blog_id: Uuid,
    pub reaction: ReactionKind,
    /// The reaction this one replaced, if the user flipped
    pub replaced: Option<ReactionKind>,
    pub likes: i64,
    pub dislikes: i64,
}

/// Blog service
pub struct BlogService {
    blogs: Arc<dyn BlogRepository>,
    interactions: Arc<dyn InteractionRepository>,
    ai: Arc<dyn AiService>,
    op_timeout: Duration,
}

impl BlogService {
    pub fn new(
        blogs: Arc<dyn BlogRepository>,
        interactions: Arc<dyn InteractionRepository>,
        ai: Arc<dyn AiService>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            blogs,
            interactions,
            ai,
            op_timeout,
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, BlogServiceError> {
        with_deadline(self.op_timeout, fut, BlogServiceError::Timeout).await
    }

    /// Create a post authored by `author`.
    pub async fn create(
        &self,
        author: &User,
        input: CreateBlogInput,
    ) -> Result<Blog, BlogServiceError> {
        let title = required(&input.title, "title")?;
        let content = required(&input.content, "content")?;

        let blog = Blog::new(author.id, title, content, input.tags);
        let blog = self.bounded(self.blogs.create(&blog)).await?;

        info!(blog_id = %blog.id, user_id = %author.id, "blog created");
        Ok(blog)
    }

    /// Fetch one post. Reading does not count as a view.
    pub async fn get(&self, id: Uuid) -> Result<Blog, BlogServiceError> {
        self.bounded(self.blogs.get_by_id(id))
            .await?
            .ok_or_else(blog_not_found)
    }

    /// All posts, newest first
    pub async fn list(&self) -> Result<Vec<Blog>, BlogServiceError> {
        self.bounded(self.blogs.list()).await
    }

    /// Edit title, content or tags. Counters cannot be edited.
    pub async fn update(
        &self,
        id: Uuid,
        actor: &User,
        input: UpdateBlogInput,
    ) -> Result<Blog, BlogServiceError> {
        let mut blog = self.get(id).await?;
        self.authorize(actor, &blog, "edit")?;

        if let Some(title) = input.title {
            blog.title = required(&title, "title")?;
        }
        if let Some(content) = input.content {
            blog.content = required(&content, "content")?;
        }
        if let Some(tags) = input.tags {
            blog.tags = normalize_tags(tags);
        }
        blog.updated_at = crate::models::now();

        if !self.bounded(self.blogs.update(&blog)).await? {
            return Err(blog_not_found());
        }

        info!(blog_id = %id, user_id = %actor.id, "blog updated");
        // Counters may have moved since the read above.
        self.get(id).await
    }

    /// Delete a post together with its reactions and tags.
    pub async fn delete(&self, id: Uuid, actor: &User) -> Result<(), BlogServiceError> {
        let blog = self.get(id).await?;
        self.authorize(actor, &blog, "delete")?;

        if !self.bounded(self.blogs.delete(id)).await? {
            return Err(blog_not_found());
        }

        info!(blog_id = %id, user_id = %actor.id, "blog deleted");
        Ok(())
    }

    pub async fn like(
        &self,
        user_id: Uuid,
        blog_id: Uuid,
    ) -> Result<ReactionSummary, BlogServiceError> {
        self.react(user_id, blog_id, ReactionKind::Like).await
    }

    pub async fn dislike(
        &self,
        user_id: Uuid,
        blog_id: Uuid,
    ) -> Result<ReactionSummary, BlogServiceError> {
        self.react(user_id, blog_id, ReactionKind::Dislike).await
    }

    async fn react(
        &self,
        user_id: Uuid,
        blog_id: Uuid,
        kind: ReactionKind,
    ) -> Result<ReactionSummary, BlogServiceError> {
        let outcome = self
            .bounded(self.interactions.apply_reaction(user_id, blog_id, kind))
            .await?;

        match outcome {
            ReactionOutcome::BlogNotFound => Err(blog_not_found()),
            ReactionOutcome::AlreadyReacted => {
                warn!(%user_id, %blog_id, reaction = %kind, "duplicate reaction rejected");
                Err(BlogServiceError::AlreadyReacted(format!(
                    "user already {}d this blog",
                    kind
                )))
            }
            ReactionOutcome::Applied {
                previous,
                likes,
                dislikes,
            } => {
                info!(%user_id, %blog_id, reaction = %kind, flipped = previous.is_some(), "reaction recorded");
                Ok(ReactionSummary {
                    blog_id,
                    reaction: kind,
                    replaced: previous,
                    likes,
                    dislikes,
                })
            }
        }
    }

    /// Count one view of a post.
    pub async fn record_view(&self, blog_id: Uuid) -> Result<(), BlogServiceError> {
        if !self.bounded(self.blogs.increment_views(blog_id)).await? {
            return Err(blog_not_found());
        }
        debug!(%blog_id, "view recorded");
        Ok(())
    }

    /// Posts carrying all of `tags`, created within `[start, end]`.
    ///
    /// `sort_by == "popularity"` orders by likes, then views, then recency;
    /// any other value orders by recency.
    pub async fn filter(
        &self,
        tags: Vec<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        sort_by: &str,
    ) -> Result<Vec<Blog>, BlogServiceError> {
        let filter = BlogFilter {
            tags: normalize_tags(tags),
            start,
            end,
            sort: SortBy::from_param(sort_by),
        };
        debug!(?filter, "filtering blogs");
        self.bounded(self.blogs.filter(&filter)).await
    }

    /// The most recently created post whose title contains `title`,
    /// ignoring case.
    pub async fn search(&self, title: &str) -> Result<Blog, BlogServiceError> {
        let needle = title.trim();
        if needle.is_empty() {
            return Err(BlogServiceError::InvalidArgument(
                "title is required".to_string(),
            ));
        }

        self.bounded(self.blogs.search_by_title(needle))
            .await?
            .ok_or_else(blog_not_found)
    }

    /// Ask the AI provider for writing ideas on `topic`.
    pub async fn suggest(&self, topic: &str) -> Result<String, BlogServiceError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(BlogServiceError::InvalidArgument(
                "topic is required".to_string(),
            ));
        }

        let prompt = format!("Suggest an outline and key points for a blog post about: {topic}");
        self.ai.suggest(&prompt).await.map_err(|e| {
            warn!(error = %e, "AI suggestion failed");
            BlogServiceError::from(e)
        })
    }

    fn authorize(&self, actor: &User, blog: &Blog, action: &str) -> Result<(), BlogServiceError> {
        if actor.can_edit(blog.user_id) {
            return Ok(());
        }
        warn!(blog_id = %blog.id, user_id = %actor.id, action, "blog change forbidden");
        Err(BlogServiceError::Forbidden(format!(
            "only the author or an admin can {} this blog",
            action
        )))
    }
}

fn required(value: &str, field: &str) -> Result<String, BlogServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BlogServiceError::InvalidArgument(format!(
            "{} is required",
            field
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxBlogRepository, SqlxInteractionRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::UserRole;
    use crate::services::ai::MockAiService;
    use proptest::prelude::*;

    struct Fixture {
        pool: DynDatabasePool,
        service: Arc<BlogService>,
    }

    async fn setup_with_ai(ai: MockAiService) -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let service = BlogService::new(
            SqlxBlogRepository::boxed(pool.clone()),
            SqlxInteractionRepository::boxed(pool.clone()),
            Arc::new(ai),
            Duration::from_secs(5),
        );
        Fixture {
            pool,
            service: Arc::new(service),
        }
    }

    async fn setup() -> Fixture {
        setup_with_ai(MockAiService::replying("Intro, Body, Conclusion")).await
    }

    async fn create_user(pool: &DynDatabasePool, name: &str) -> User {
        let users = SqlxUserRepository::new(pool.clone());
        let user = User::new(
            name.to_string(),
            format!("{}@example.com", name),
            "hash".to_string(),
            UserRole::User,
        );
        users.register(&user).await.expect("Failed to create user")
    }

    // Creation times have millisecond precision; keep them distinct.
    async fn tick() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    fn post(title: &str, tags: &[&str]) -> CreateBlogInput {
        CreateBlogInput {
            title: title.to_string(),
            content: "body".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let f = setup().await;
        let author = create_user(&f.pool, "alice").await;

        let blog = f
            .service
            .create(&author, post("  Hello  ", &["rust", "rust", " web "]))
            .await
            .unwrap();
        assert_eq!(blog.title, "Hello");
        assert_eq!(blog.tags, vec!["rust", "web"]);
        assert_eq!((blog.likes, blog.dislikes, blog.view_count), (0, 0, 0));

        let fetched = f.service.get(blog.id).await.unwrap();
        assert_eq!(fetched.id, blog.id);
        assert_eq!(fetched.view_count, 0);
    }

    #[tokio::test]
    async fn test_create_requires_title_and_content() {
        let f = setup().await;
        let author = create_user(&f.pool, "alice").await;

        let blank = CreateBlogInput {
            title: " ".to_string(),
            ..post("x", &[])
        };
        assert!(matches!(
            f.service.create(&author, blank).await,
            Err(BlogServiceError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let f = setup().await;
        assert!(matches!(
            f.service.get(Uuid::new_v4()).await,
            Err(BlogServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_like_then_like_again() {
        let f = setup().await;
        let author = create_user(&f.pool, "alice").await;
        let reader = create_user(&f.pool, "bob").await;
        let blog = f.service.create(&author, post("Post", &[])).await.unwrap();

        let first = f.service.like(reader.id, blog.id).await.unwrap();
        assert_eq!((first.likes, first.dislikes), (1, 0));
        assert_eq!(first.replaced, None);

        let err = f.service.like(reader.id, blog.id).await.unwrap_err();
        assert!(
            matches!(err, BlogServiceError::AlreadyReacted(ref m) if m == "user already liked this blog")
        );

        let stored = f.service.get(blog.id).await.unwrap();
        assert_eq!((stored.likes, stored.dislikes), (1, 0));
    }

    #[tokio::test]
    async fn test_dislike_twice_message() {
        let f = setup().await;
        let author = create_user(&f.pool, "alice").await;
        let blog = f.service.create(&author, post("Post", &[])).await.unwrap();

        f.service.dislike(author.id, blog.id).await.unwrap();
        let err = f.service.dislike(author.id, blog.id).await.unwrap_err();
        assert_eq!(err.to_string(), "user already disliked this blog");
    }

    #[tokio::test]
    async fn test_flip_moves_counter() {
        let f = setup().await;
        let author = create_user(&f.pool, "alice").await;
        let reader = create_user(&f.pool, "bob").await;
        let blog = f.service.create(&author, post("Post", &[])).await.unwrap();

        f.service.like(reader.id, blog.id).await.unwrap();
        let flipped = f.service.dislike(reader.id, blog.id).await.unwrap();
        assert_eq!(flipped.replaced, Some(ReactionKind::Like));
        assert_eq!((flipped.likes, flipped.dislikes), (0, 1));

        let back = f.service.like(reader.id, blog.id).await.unwrap();
        assert_eq!(back.replaced, Some(ReactionKind::Dislike));
        assert_eq!((back.likes, back.dislikes), (1, 0));
    }

    #[tokio::test]
    async fn test_react_to_missing_blog() {
        let f = setup().await;
        let reader = create_user(&f.pool, "bob").await;
        assert!(matches!(
            f.service.like(reader.id, Uuid::new_v4()).await,
            Err(BlogServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_views_are_separate_from_reactions() {
        let f = setup().await;
        let author = create_user(&f.pool, "alice").await;
        let blog = f.service.create(&author, post("Post", &[])).await.unwrap();

        f.service.like(author.id, blog.id).await.unwrap();
        f.service.dislike(author.id, blog.id).await.unwrap();
        assert_eq!(f.service.get(blog.id).await.unwrap().view_count, 0);

        f.service.record_view(blog.id).await.unwrap();
        f.service.record_view(blog.id).await.unwrap();
        assert_eq!(f.service.get(blog.id).await.unwrap().view_count, 2);

        assert!(matches!(
            f.service.record_view(Uuid::new_v4()).await,
            Err(BlogServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_likes_apply_once() {
        let f = setup().await;
        let author = create_user(&f.pool, "alice").await;
        let reader = create_user(&f.pool, "bob").await;
        let blog = f.service.create(&author, post("Post", &[])).await.unwrap();

        let tasks = (0..6).map(|_| {
            let service = f.service.clone();
            let (user_id, blog_id) = (reader.id, blog.id);
            tokio::spawn(async move { service.like(user_id, blog_id).await })
        });
        let results = futures::future::join_all(tasks).await;

        let applied = results
            .iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Ok(Err(BlogServiceError::AlreadyReacted(_)))))
            .count();
        assert_eq!(applied, 1);
        assert_eq!(rejected, 5);
        assert_eq!(f.service.get(blog.id).await.unwrap().likes, 1);
    }

    #[tokio::test]
    async fn test_update_by_author_and_forbidden_for_others() {
        let f = setup().await;
        let admin = create_user(&f.pool, "root").await;
        let author = create_user(&f.pool, "alice").await;
        let other = create_user(&f.pool, "bob").await;
        let blog = f.service.create(&author, post("Draft", &["a"])).await.unwrap();
        f.service.like(other.id, blog.id).await.unwrap();

        let edit = UpdateBlogInput {
            title: Some("Final".to_string()),
            tags: Some(vec!["b".to_string(), "a".to_string()]),
            ..Default::default()
        };
        let updated = f.service.update(blog.id, &author, edit).await.unwrap();
        assert_eq!(updated.title, "Final");
        assert_eq!(updated.content, "body");
        assert_eq!(updated.tags, vec!["a", "b"]);
        assert_eq!(updated.likes, 1);

        assert!(matches!(
            f.service
                .update(blog.id, &other, UpdateBlogInput::default())
                .await,
            Err(BlogServiceError::Forbidden(_))
        ));

        assert!(admin.is_admin());
        let by_admin = UpdateBlogInput {
            content: Some("moderated".to_string()),
            ..Default::default()
        };
        assert!(f.service.update(blog.id, &admin, by_admin).await.is_ok());

        let blank = UpdateBlogInput {
            title: Some("".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            f.service.update(blog.id, &author, blank).await,
            Err(BlogServiceError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades_reactions() {
        let f = setup().await;
        let _admin = create_user(&f.pool, "root").await;
        let author = create_user(&f.pool, "alice").await;
        let other = create_user(&f.pool, "bob").await;
        let blog = f.service.create(&author, post("Post", &[])).await.unwrap();
        f.service.like(other.id, blog.id).await.unwrap();

        assert!(matches!(
            f.service.delete(blog.id, &other).await,
            Err(BlogServiceError::Forbidden(_))
        ));

        f.service.delete(blog.id, &author).await.unwrap();
        let interactions = SqlxInteractionRepository::new(f.pool.clone());
        assert!(interactions.find(other.id, blog.id).await.unwrap().is_none());

        assert!(matches!(
            f.service.delete(blog.id, &author).await,
            Err(BlogServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_filter_by_tags_and_sort() {
        let f = setup().await;
        let author = create_user(&f.pool, "alice").await;
        let reader = create_user(&f.pool, "bob").await;

        let a = f.service.create(&author, post("A", &["rust", "web"])).await.unwrap();
        tick().await;
        let b = f.service.create(&author, post("B", &["rust"])).await.unwrap();
        tick().await;
        let c = f.service.create(&author, post("C", &["rust", "web", "db"])).await.unwrap();
        f.service.like(reader.id, a.id).await.unwrap();

        let tagged = f
            .service
            .filter(vec!["web".into(), " rust".into()], None, None, "date")
            .await
            .unwrap();
        let ids: Vec<Uuid> = tagged.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![c.id, a.id]);

        let popular = f.service.filter(vec![], None, None, "popularity").await.unwrap();
        assert_eq!(popular[0].id, a.id);
        assert_eq!(popular.len(), 3);

        let recent = f.service.filter(vec![], None, None, "").await.unwrap();
        assert_eq!(recent[0].id, c.id);
        assert_eq!(recent[2].id, a.id);
        assert!(recent.iter().any(|p| p.id == b.id));

        let none = f
            .service
            .filter(vec!["missing".into()], None, None, "date")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_search() {
        let f = setup().await;
        let author = create_user(&f.pool, "alice").await;
        f.service.create(&author, post("Learning Rust", &[])).await.unwrap();
        tick().await;
        let newer = f.service.create(&author, post("More RUST tips", &[])).await.unwrap();

        let found = f.service.search("rust").await.unwrap();
        assert_eq!(found.id, newer.id);

        assert!(matches!(
            f.service.search("python").await,
            Err(BlogServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.search("   ").await,
            Err(BlogServiceError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_suggest() {
        let f = setup().await;
        assert_eq!(
            f.service.suggest("rust").await.unwrap(),
            "Intro, Body, Conclusion"
        );
        assert!(matches!(
            f.service.suggest("").await,
            Err(BlogServiceError::InvalidArgument(_))
        ));

        let failing = setup_with_ai(MockAiService::failing(500)).await;
        assert!(matches!(
            failing.service.suggest("rust").await,
            Err(BlogServiceError::Ai(AiError::Status(500)))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn counters_follow_reaction_sequence(ops in prop::collection::vec((0usize..3, any::<bool>()), 1..16)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let f = setup().await;
                let author = create_user(&f.pool, "author").await;
                let readers = [
                    create_user(&f.pool, "r0").await,
                    create_user(&f.pool, "r1").await,
                    create_user(&f.pool, "r2").await,
                ];
                let blog = f.service.create(&author, post("Post", &[])).await.unwrap();

                let mut state: [Option<ReactionKind>; 3] = [None; 3];
                for (reader, is_like) in ops {
                    let kind = if is_like { ReactionKind::Like } else { ReactionKind::Dislike };
                    let result = match kind {
                        ReactionKind::Like => f.service.like(readers[reader].id, blog.id).await,
                        ReactionKind::Dislike => f.service.dislike(readers[reader].id, blog.id).await,
                    };
                    if state[reader] == Some(kind) {
                        assert!(matches!(result, Err(BlogServiceError::AlreadyReacted(_))));
                    } else {
                        let summary = result.unwrap();
                        assert_eq!(summary.replaced, state[reader]);
                        state[reader] = Some(kind);
                    }
                }

                let expected_likes = state.iter().filter(|s| **s == Some(ReactionKind::Like)).count() as i64;
                let expected_dislikes = state.iter().filter(|s| **s == Some(ReactionKind::Dislike)).count() as i64;
                let stored = f.service.get(blog.id).await.unwrap();
                assert_eq!(stored.likes, expected_likes);
                assert_eq!(stored.dislikes, expected_dislikes);
                assert_eq!(stored.view_count, 0);
            });
        }
    }
}
