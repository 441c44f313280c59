//! Story downloads and personal data backups.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use askama::Template;
use serde::Serialize;
use slug::slugify;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::access::load_story;
use crate::application::auth::Principal;
use crate::application::error::ServiceError;
use crate::application::pagination::{MAX_PER_PAGE, PageRequest, Paginated};
use crate::application::repos::{
    BookmarkListItem, BookmarksRepo, ChaptersRepo, FollowUser, FollowsRepo, RatingsRepo,
    ReadHistoryItem, ReadHistoryRepo, RepoError, StoriesRepo, UsersRepo,
};
use crate::domain::entities::{ChapterRecord, RatingRecord, StoryRecord, UserProfile};
use crate::domain::types::ExportFormat;

/// A rendered download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    #[serde(with = "time::serde::rfc3339")]
    pub exported_at: OffsetDateTime,
    pub user: UserProfile,
    pub stories: Vec<StoryRecord>,
    pub chapters: Vec<ChapterRecord>,
    pub bookmarks: Vec<BookmarkListItem>,
    pub ratings: Vec<RatingRecord>,
    pub followers: Vec<FollowUser>,
    pub following: Vec<FollowUser>,
    pub read_history: Vec<ReadHistoryItem>,
}

struct ExportChapter {
    title: String,
    order: i32,
    paragraphs: Vec<String>,
}

#[derive(Template)]
#[template(path = "export/story.html")]
struct StoryHtmlTemplate<'a> {
    title: &'a str,
    author: &'a str,
    status: &'a str,
    description: Option<&'a str>,
    chapters: &'a [ExportChapter],
}

#[derive(Clone)]
pub struct ExportService {
    pub(crate) users: Arc<dyn UsersRepo>,
    pub(crate) stories: Arc<dyn StoriesRepo>,
    pub(crate) chapters: Arc<dyn ChaptersRepo>,
    pub(crate) bookmarks: Arc<dyn BookmarksRepo>,
    pub(crate) ratings: Arc<dyn RatingsRepo>,
    pub(crate) follows: Arc<dyn FollowsRepo>,
    pub(crate) read_history: Arc<dyn ReadHistoryRepo>,
}

impl ExportService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UsersRepo>,
        stories: Arc<dyn StoriesRepo>,
        chapters: Arc<dyn ChaptersRepo>,
        bookmarks: Arc<dyn BookmarksRepo>,
        ratings: Arc<dyn RatingsRepo>,
        follows: Arc<dyn FollowsRepo>,
        read_history: Arc<dyn ReadHistoryRepo>,
    ) -> Self {
        Self {
            users,
            stories,
            chapters,
            bookmarks,
            ratings,
            follows,
            read_history,
        }
    }

    /// Render a story, optionally restricted to `chapter_ids`.
    ///
    /// Private stories are only exported for their author.
    pub async fn export_story(
        &self,
        viewer: Option<Uuid>,
        story_id: Uuid,
        format: ExportFormat,
        chapter_ids: Option<Vec<Uuid>>,
    ) -> Result<ExportedFile, ServiceError> {
        let story = load_story(self.stories.as_ref(), story_id).await?;
        if !story.visible_to(viewer) {
            return Err(ServiceError::Forbidden("story is private"));
        }
        let author = self
            .users
            .find_user(story.author_id)
            .await?
            .map(|user| user.username)
            .unwrap_or_default();

        let mut chapters = self.chapters.list_for_story(story_id).await?;
        chapters.sort_by_key(|chapter| (chapter.order, chapter.created_at));
        if let Some(requested) = chapter_ids.filter(|ids| !ids.is_empty()) {
            let requested: HashSet<Uuid> = requested.into_iter().collect();
            chapters.retain(|chapter| requested.contains(&chapter.id));
            if chapters.len() != requested.len() {
                return Err(ServiceError::NotFound("chapter"));
            }
        }

        let body = match format {
            ExportFormat::Txt => render_txt(&story, &author, &chapters),
            ExportFormat::Html => render_html(&story, &author, &chapters)?,
        };
        Ok(ExportedFile {
            filename: export_filename(&story.title, format),
            content_type: format.mime_type(),
            body,
        })
    }

    /// Everything the caller owns or produced, as one JSON document.
    pub async fn export_backup(&self, principal: &Principal) -> Result<BackupDocument, ServiceError> {
        let user = self
            .users
            .find_user(principal.id)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;

        let stories = self.stories.list_by_author(principal.id, true).await?;
        let mut chapters = Vec::new();
        for story in &stories {
            chapters.extend(self.chapters.list_for_story(story.id).await?);
        }

        let bookmarks =
            collect_pages(move |page| self.bookmarks.list_for_user(principal.id, page)).await?;
        let followers =
            collect_pages(move |page| self.follows.list_followers(principal.id, page)).await?;
        let following =
            collect_pages(move |page| self.follows.list_following(principal.id, page)).await?;

        Ok(BackupDocument {
            exported_at: OffsetDateTime::now_utc(),
            user: UserProfile::from(&user),
            stories,
            chapters,
            bookmarks,
            ratings: self.ratings.list_by_author(principal.id).await?,
            followers,
            following,
            read_history: self.read_history.list_for_user(principal.id).await?,
        })
    }
}

async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, RepoError>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: std::future::Future<Output = Result<Paginated<T>, RepoError>>,
{
    let mut items = Vec::new();
    let mut request = PageRequest::new(Some(1), Some(i64::from(MAX_PER_PAGE)));
    loop {
        let page = fetch(request).await?;
        let next = page.meta.next;
        items.extend(page.data);
        match next {
            Some(next) => request.page = next,
            None => return Ok(items),
        }
    }
}

fn export_filename(title: &str, format: ExportFormat) -> String {
    let stem = slugify(title);
    let stem = if stem.is_empty() { "story".to_string() } else { stem };
    format!("{stem}.{}", format.extension())
}

fn render_txt(story: &StoryRecord, author: &str, chapters: &[ChapterRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", story.title);
    let _ = writeln!(out, "by {author}");
    if let Some(description) = &story.description {
        let _ = writeln!(out, "\n{description}");
    }
    for chapter in chapters {
        let heading = format!("Chapter {}: {}", chapter.order, chapter.title);
        let _ = writeln!(out, "\n\n{heading}\n{}\n", "=".repeat(heading.chars().count()));
        let _ = writeln!(out, "{}", chapter.content.trim_end());
    }
    out
}

fn render_html(
    story: &StoryRecord,
    author: &str,
    chapters: &[ChapterRecord],
) -> Result<String, ServiceError> {
    let chapters: Vec<ExportChapter> = chapters
        .iter()
        .map(|chapter| ExportChapter {
            title: chapter.title.clone(),
            order: chapter.order,
            paragraphs: chapter
                .content
                .split("\n\n")
                .map(str::trim)
                .filter(|paragraph| !paragraph.is_empty())
                .map(str::to_string)
                .collect(),
        })
        .collect();

    StoryHtmlTemplate {
        title: &story.title,
        author,
        status: story.status.as_str(),
        description: story.description.as_deref(),
        chapters: &chapters,
    }
    .render()
    .map_err(|err| ServiceError::Internal(err.to_string()))
}
