use crate::database::models::{BlogPostRecord, CommentRecord, Role};
use crate::database::repositories::{
    CommentRepository, PostRepository, ReactionRepository, SqliteRepositories,
};
use crate::database::Database;
use crate::error::{ForumError, ForumResult};
use crate::profiles::{require_role, Actor};
use crate::utils::{local_datetime, now_millis};
use chrono::Datelike;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use uuid::Uuid;

pub const DEFAULT_MOST_VISITED_LIMIT: usize = 5;
const ARCHIVE_DATE_FORMAT: &str = "%b %-d, %Y";

static WHITESPACE: OnceLock<Regex> = OnceLock::new();
static INVALID: OnceLock<Regex> = OnceLock::new();
static DASHES: OnceLock<Regex> = OnceLock::new();

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("slug pattern compiles"))
}

/// Lower-cases `title`, turns whitespace runs into `-`, drops everything
/// outside `[a-z0-9_-]` and trims stray hyphens. Applying it twice changes
/// nothing.
pub fn slugify(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    let hyphenated = pattern(&WHITESPACE, r"\s+").replace_all(&lowered, "-");
    let cleaned = pattern(&INVALID, r"[^a-z0-9_-]").replace_all(&hyphenated, "");
    let collapsed = pattern(&DASHES, r"-{2,}").replace_all(&cleaned, "-");
    collapsed.trim_matches('-').to_string()
}

/// `slugify(title)`, suffixed with `-2`, `-3`, ... until no other post uses it.
fn unique_slug(
    repos: &SqliteRepositories<'_>,
    title: &str,
    except_id: Option<&str>,
) -> anyhow::Result<String> {
    let mut base = slugify(title);
    if base.is_empty() {
        base = "post".to_string();
    }
    let posts = repos.posts();
    if !posts.slug_taken(&base, except_id)? {
        return Ok(base);
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !posts.slug_taken(&candidate, except_id)? {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

/// Blog posts and their comments.
#[derive(Clone)]
pub struct BlogService {
    database: Database,
    public_url: String,
}

impl BlogService {
    pub fn new(database: Database, public_url: impl Into<String>) -> Self {
        Self {
            database,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn create_post(&self, actor: &Actor, input: CreatePostInput) -> ForumResult<BlogPostView> {
        if input.title.trim().is_empty() {
            return Err(ForumError::invalid("post title may not be empty"));
        }
        let post = self.database.with_transaction(|repos| {
            require_role(&repos, &actor.id, Role::Admin)?;
            let now = now_millis();
            let created_at = input.created_at.unwrap_or(now);
            let record = BlogPostRecord {
                id: Uuid::new_v4().to_string(),
                slug: unique_slug(&repos, &input.title, None)?,
                title: input.title.trim().to_string(),
                description: input.description.clone(),
                content: input.content.clone(),
                category: input.category.clone(),
                tags: input.tags.clone(),
                author_id: actor.id.clone(),
                author_name: actor.name.clone(),
                author_image_url: actor.image_url.clone(),
                published: input.published.unwrap_or(true),
                like_count: 0,
                comment_count: 0,
                view_count: 0,
                image_id: input.image_id.clone(),
                created_at,
                updated_at: created_at,
            };
            repos.posts().create(&record)?;
            Ok(record)
        })?;
        tracing::info!(post_id = %post.id, slug = %post.slug, "blog post created");
        Ok(self.view(post))
    }

    /// Applies the fields present in `input`; a new title regenerates the slug.
    pub fn update_post(
        &self,
        actor: &Actor,
        post_id: &str,
        input: UpdatePostInput,
    ) -> ForumResult<BlogPostView> {
        if let Some(title) = &input.title {
            if title.trim().is_empty() {
                return Err(ForumError::invalid("post title may not be empty"));
            }
        }
        let post = self.database.with_transaction(|repos| {
            require_role(&repos, &actor.id, Role::Admin)?;
            let Some(mut post) = repos.posts().get(post_id)? else {
                return Err(ForumError::not_found("Post not found").into());
            };
            if let Some(title) = input.title {
                post.slug = unique_slug(&repos, &title, Some(&post.id))?;
                post.title = title.trim().to_string();
            }
            if let Some(description) = input.description {
                post.description = description;
            }
            if let Some(content) = input.content {
                post.content = content;
            }
            if let Some(category) = input.category {
                post.category = category;
            }
            if let Some(tags) = input.tags {
                post.tags = tags;
            }
            if let Some(published) = input.published {
                post.published = published;
            }
            if let Some(image_id) = input.image_id {
                post.image_id = Some(image_id);
            }
            post.updated_at = now_millis();
            repos.posts().update(&post)?;
            Ok(post)
        })?;
        tracing::info!(post_id = %post.id, slug = %post.slug, "blog post updated");
        Ok(self.view(post))
    }

    /// Deletes a post with its comments and every like on either.
    pub fn remove_post(&self, actor: &Actor, post_id: &str) -> ForumResult<()> {
        self.database.with_transaction(|repos| {
            require_role(&repos, &actor.id, Role::Admin)?;
            if repos.posts().get(post_id)?.is_none() {
                return Err(ForumError::not_found("Post not found").into());
            }
            repos.reactions().remove_for_post(post_id)?;
            repos.posts().delete(post_id)?;
            Ok(())
        })?;
        tracing::info!(post_id = %post_id, "blog post removed");
        Ok(())
    }

    pub fn get_post(&self, post_id: &str) -> ForumResult<BlogPostView> {
        let post = self.database.with_repositories(|repos| {
            let post = repos.posts().get(post_id)?;
            Ok(post)
        })?;
        post.map(|post| self.view(post))
            .ok_or_else(|| ForumError::not_found("Post not found"))
    }

    pub fn get_by_slug(&self, slug: &str) -> ForumResult<BlogPostView> {
        let post = self.database.with_repositories(|repos| {
            let post = repos.posts().get_by_slug(slug)?;
            Ok(post)
        })?;
        post.map(|post| self.view(post))
            .ok_or_else(|| ForumError::not_found("Post not found"))
    }

    /// Every post including drafts, newest first. Admin dashboard only.
    pub fn list_all(&self, actor: &Actor) -> ForumResult<Vec<BlogPostView>> {
        let posts = self.database.with_repositories(|repos| {
            require_role(&repos, &actor.id, Role::Admin)?;
            let posts = repos.posts().list_all()?;
            Ok(posts)
        })?;
        Ok(self.views(posts))
    }

    /// Published posts matching every filter in `filter`. The sort is stable
    /// over insertion order; no pagination.
    pub fn list_posts(&self, filter: &PostFilter) -> ForumResult<Vec<BlogPostView>> {
        let category = filter
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && *c != "all");
        let posts = self.database.with_repositories(|repos| {
            let posts = repos.posts().list_published(category, filter.date_from)?;
            Ok(posts)
        })?;

        let needle = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let year = filter.year.as_deref().map(str::trim).filter(|y| !y.is_empty());

        let mut posts: Vec<BlogPostRecord> = posts
            .into_iter()
            .filter(|post| match &needle {
                Some(needle) => {
                    post.title.to_lowercase().contains(needle)
                        || post.description.to_lowercase().contains(needle)
                        || post.content.to_lowercase().contains(needle)
                }
                None => true,
            })
            .filter(|post| match year {
                Some(year) => local_datetime(post.created_at).year().to_string() == year,
                None => true,
            })
            .collect();

        match filter.sort.unwrap_or_default() {
            PostSort::Latest => posts.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            PostSort::Oldest => posts.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            PostSort::Popular => posts.sort_by(|a, b| b.like_count.cmp(&a.like_count)),
            PostSort::Comments => posts.sort_by(|a, b| b.comment_count.cmp(&a.comment_count)),
        }
        Ok(self.views(posts))
    }

    /// Post counts per category, most used first, ties by name.
    pub fn categories(&self) -> ForumResult<Vec<FacetCount>> {
        let posts = self.all_posts()?;
        Ok(facet_counts(
            posts
                .iter()
                .map(|post| post.category.as_str())
                .filter(|category| !category.is_empty()),
        ))
    }

    /// Post counts per tag, most used first, ties by name.
    pub fn tags(&self) -> ForumResult<Vec<FacetCount>> {
        let posts = self.all_posts()?;
        Ok(facet_counts(
            posts.iter().flat_map(|post| post.tags.iter().map(String::as_str)),
        ))
    }

    /// Published posts grouped by local-calendar year, newest year first and
    /// newest post first within a year.
    pub fn archive(&self) -> ForumResult<Archive> {
        let mut posts = self.database.with_repositories(|repos| {
            let posts = repos.posts().list_published(None, None)?;
            Ok(posts)
        })?;
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut posts_by_year: BTreeMap<String, Vec<ArchiveEntry>> = BTreeMap::new();
        for post in posts {
            let created = local_datetime(post.created_at);
            posts_by_year
                .entry(created.year().to_string())
                .or_default()
                .push(ArchiveEntry {
                    date: created.format(ARCHIVE_DATE_FORMAT).to_string(),
                    title: post.title,
                    slug: post.slug,
                });
        }
        let mut years: Vec<String> = posts_by_year.keys().cloned().collect();
        years.sort_by_key(|year| std::cmp::Reverse(year.parse::<i32>().unwrap_or_default()));
        Ok(Archive {
            years,
            posts_by_year,
        })
    }

    pub fn most_visited(&self, limit: Option<usize>) -> ForumResult<Vec<BlogPostView>> {
        let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_MOST_VISITED_LIMIT);
        let posts = self.database.with_repositories(|repos| {
            let posts = repos.posts().list_most_viewed(limit)?;
            Ok(posts)
        })?;
        Ok(self.views(posts))
    }

    pub fn record_view(&self, post_id: &str) -> ForumResult<()> {
        let changed = self.database.with_repositories(|repos| {
            let changed = repos.posts().increment_views(post_id)?;
            Ok(changed)
        })?;
        if changed == 0 {
            return Err(ForumError::not_found("Post not found"));
        }
        Ok(())
    }

    /// Comments of a post, oldest first.
    pub fn list_comments(&self, post_id: &str) -> ForumResult<Vec<CommentRecord>> {
        let comments = self.database.with_repositories(|repos| {
            let comments = repos.comments().list_for_post(post_id)?;
            Ok(comments)
        })?;
        Ok(comments)
    }

    /// Adds a comment and bumps the post's `comment_count`. A parent must be
    /// a top-level comment on the same post.
    pub fn create_comment(
        &self,
        actor: &Actor,
        input: CreateCommentInput,
    ) -> ForumResult<CommentRecord> {
        if actor.id.trim().is_empty() {
            return Err(ForumError::Unauthenticated);
        }
        if input.content.trim().is_empty() {
            return Err(ForumError::invalid("comment may not be empty"));
        }
        let record = CommentRecord {
            id: Uuid::new_v4().to_string(),
            post_id: input.post_id,
            parent_id: input.parent_id.filter(|p| !p.is_empty()),
            content: input.content,
            author_id: actor.id.clone(),
            author_name: actor.name.clone(),
            author_image_url: actor.image_url.clone(),
            like_count: 0,
            created_at: now_millis(),
        };

        self.database.with_transaction(|repos| {
            if repos.posts().get(&record.post_id)?.is_none() {
                return Err(ForumError::not_found("Post not found").into());
            }
            if let Some(parent_id) = &record.parent_id {
                let Some(parent) = repos.comments().get(parent_id)? else {
                    return Err(ForumError::not_found("parent comment not found").into());
                };
                if parent.post_id != record.post_id {
                    return Err(
                        ForumError::invalid("parent comment belongs to another post").into(),
                    );
                }
                if parent.parent_id.is_some() {
                    return Err(ForumError::invalid("replies cannot be nested further").into());
                }
            }
            repos.comments().create(&record)?;
            if repos.posts().record_new_comment(&record.post_id)? == 0 {
                return Err(ForumError::not_found("Post not found").into());
            }
            Ok(())
        })?;

        tracing::info!(
            comment_id = %record.id,
            post_id = %record.post_id,
            author_id = %record.author_id,
            "comment created"
        );
        Ok(record)
    }

    fn all_posts(&self) -> ForumResult<Vec<BlogPostRecord>> {
        let posts = self.database.with_repositories(|repos| {
            let posts = repos.posts().list_all()?;
            Ok(posts)
        })?;
        Ok(posts)
    }

    fn view(&self, post: BlogPostRecord) -> BlogPostView {
        let image_url = post
            .image_id
            .as_ref()
            .map(|id| format!("{}/storage/{}", self.public_url, id));
        BlogPostView { post, image_url }
    }

    fn views(&self, posts: Vec<BlogPostRecord>) -> Vec<BlogPostView> {
        posts.into_iter().map(|post| self.view(post)).collect()
    }
}

fn facet_counts<'a>(names: impl Iterator<Item = &'a str>) -> Vec<FacetCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }
    let mut facets: Vec<FacetCount> = counts
        .into_iter()
        .map(|(name, count)| FacetCount {
            name: name.to_string(),
            count,
        })
        .collect();
    facets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    facets
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPostView {
    #[serde(flatten)]
    pub post: BlogPostRecord,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSort {
    #[default]
    Latest,
    Oldest,
    Popular,
    Comments,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sort: Option<PostSort>,
    /// Inclusive lower bound on `created_at`, epoch milliseconds.
    #[serde(default)]
    pub date_from: Option<i64>,
    #[serde(default)]
    pub year: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub date: String,
    pub title: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    pub years: Vec<String>,
    pub posts_by_year: BTreeMap<String, Vec<ArchiveEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub published: Option<bool>,
    #[serde(default)]
    pub image_id: Option<String>,
    /// Backdated creation time for imported posts. If None, uses current time.
    #[serde(default, skip_deserializing)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePostInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub published: Option<bool>,
    #[serde(default)]
    pub image_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentInput {
    pub post_id: String,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}
