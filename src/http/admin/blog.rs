//! Blog posts, categories and tags.
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;
use super::unique_or;
use crate::auth::AdminUser;
use crate::http::extract::{like_pattern, Form, ValidatedJson};
use crate::http::{message, AppState};
use crate::storage::{extension_of, Upload};
use crate::{NurseryError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create-category", post(create_category))
        .route("/fetch-all-category", get(list_categories))
        .route("/delete-category/:id", delete(delete_category))
        .route("/create-tags", post(create_tag))
        .route("/fetch-all-tags", get(list_tags))
        .route("/delete-tag/:id", delete(delete_tag))
        .route("/create-blog", post(create_blog))
        .route("/fetch-all-blogs", get(list_blogs))
        .route("/fetch-blog/:id", get(get_blog))
        .route("/update-blog/:id", put(update_blog))
        .route("/delete-blog/:id", delete(delete_blog))
}

// =============================================================================
// Categories and tags
// =============================================================================

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LabelRequest {
    #[validate(length(min = 1, max = 60, message = "Name must be between 1 and 60 characters"))]
    pub name: String,
}

/// Categories and tags share one shape in two tables.
#[derive(Clone, Copy)]
enum LabelKind { Category, Tag }

impl LabelKind {
    fn table(self) -> &'static str {
        match self { Self::Category => "blog_categories", Self::Tag => "blog_tags" }
    }

    fn label(self) -> &'static str {
        match self { Self::Category => "Category", Self::Tag => "Tag" }
    }
}

async fn create_label(s: &AppState, kind: LabelKind, name: &str) -> Result<(StatusCode, Json<Label>)> {
    let sql = format!("INSERT INTO {} (id, name, created_at) VALUES ($1, $2, NOW()) RETURNING *", kind.table());
    let label = sqlx::query_as::<_, Label>(&sql)
        .bind(Uuid::now_v7())
        .bind(name.trim())
        .fetch_one(&s.db)
        .await
        .map_err(|e| unique_or(e, &format!("{} already exists", kind.label())))?;
    Ok((StatusCode::CREATED, Json(label)))
}

async fn list_labels(s: &AppState, kind: LabelKind) -> Result<Json<Vec<Label>>> {
    let sql = format!("SELECT * FROM {} ORDER BY name", kind.table());
    Ok(Json(sqlx::query_as::<_, Label>(&sql).fetch_all(&s.db).await?))
}

async fn delete_label(s: &AppState, kind: LabelKind, id: Uuid) -> Result<Json<serde_json::Value>> {
    let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
    if sqlx::query(&sql).bind(id).execute(&s.db).await?.rows_affected() == 0 {
        return Err(NurseryError::not_found(kind.label()));
    }
    Ok(message(format!("{} deleted successfully", kind.label())))
}

async fn create_category(State(s): State<AppState>, _admin: AdminUser, ValidatedJson(r): ValidatedJson<LabelRequest>) -> Result<(StatusCode, Json<Label>)> {
    create_label(&s, LabelKind::Category, &r.name).await
}

async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<Label>>> { list_labels(&s, LabelKind::Category).await }

async fn delete_category(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    delete_label(&s, LabelKind::Category, id).await
}

async fn create_tag(State(s): State<AppState>, _admin: AdminUser, ValidatedJson(r): ValidatedJson<LabelRequest>) -> Result<(StatusCode, Json<Label>)> {
    create_label(&s, LabelKind::Tag, &r.name).await
}

async fn list_tags(State(s): State<AppState>) -> Result<Json<Vec<Label>>> { list_labels(&s, LabelKind::Tag).await }

async fn delete_tag(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    delete_label(&s, LabelKind::Tag, id).await
}

// =============================================================================
// Posts
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "blog_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlogStatus { Draft, Published }

impl BlogStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Some(Self::Draft),
            "PUBLISHED" => Some(Self::Published),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub id: Uuid,
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub thumbnail_url: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub seo_keywords: Option<String>,
    pub status: BlogStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reads a list sent as a JSON array, a single-quoted array (`['a','b']`)
/// or a comma-separated string. Blank entries are dropped.
pub fn parse_list_field(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let parsed = serde_json::from_str::<Vec<String>>(raw)
        .or_else(|_| serde_json::from_str::<Vec<String>>(&raw.replace('\'', "\"")))
        .unwrap_or_else(|_| {
            raw.trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .map(|part| part.trim().trim_matches(|c: char| c == '"' || c == '\'').to_string())
                .collect()
        });
    let mut items: Vec<String> = Vec::with_capacity(parsed.len());
    for item in parsed.into_iter().map(|i| i.trim().to_string()).filter(|i| !i.is_empty()) {
        if !items.contains(&item) { items.push(item); }
    }
    items
}

async fn store_thumbnail(s: &AppState, upload: &Upload) -> Result<String> {
    let key = format!("blogs/{}-{}.{}", Utc::now().timestamp_millis(), Uuid::new_v4(), extension_of(upload.file_name.as_deref()));
    Ok(s.blobs.put(&key, &upload.bytes).await?)
}

fn status_field(form: &Form) -> Result<Option<BlogStatus>> {
    form.text("status")
        .map(|raw| BlogStatus::parse(raw).ok_or_else(|| NurseryError::bad_request("Status must be DRAFT or PUBLISHED")))
        .transpose()
}

async fn create_blog(State(s): State<AppState>, _admin: AdminUser, multipart: Multipart) -> Result<(StatusCode, Json<BlogPost>)> {
    let form = Form::read(multipart).await?;
    let title = form.require("title")?;
    let content = form.require("content")?;
    let status = status_field(&form)?.unwrap_or(BlogStatus::Draft);
    let thumbnail_url = match form.file("thumbnail") {
        Some(upload) => Some(store_thumbnail(&s, upload).await?),
        None => None,
    };
    let published_at = (status == BlogStatus::Published).then(Utc::now);
    let post = sqlx::query_as::<_, BlogPost>(
        "INSERT INTO blog_posts (id, title, excerpt, content, thumbnail_url, seo_title, seo_description, seo_keywords, status, published_at, \
         categories, tags, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7()).bind(title).bind(form.text("excerpt")).bind(content).bind(&thumbnail_url)
    .bind(form.text("seoTitle")).bind(form.text("seoDescription")).bind(form.text("seoKeywords"))
    .bind(status).bind(published_at)
    .bind(parse_list_field(form.text("categories").unwrap_or_default()))
    .bind(parse_list_field(form.text("tags").unwrap_or_default()))
    .fetch_one(&s.db)
    .await?;
    tracing::info!(blog_id = %post.id, status = ?post.status, "Blog post created");
    Ok((StatusCode::CREATED, Json(post)))
}

#[derive(Debug, Default, Deserialize)]
pub struct BlogQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub status: Option<String>,
}

fn blog_filter(q: &BlogQuery) -> Result<QueryBuilder<'static, Postgres>> {
    let mut qb = QueryBuilder::new("SELECT * FROM blog_posts WHERE TRUE");
    if let Some(pattern) = like_pattern(q.search.as_deref()) {
        qb.push(" AND (title ILIKE ").push_bind(pattern.clone()).push(" OR excerpt ILIKE ").push_bind(pattern).push(")");
    }
    if let Some(category) = q.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        qb.push(" AND ").push_bind(category.to_string()).push(" = ANY(categories)");
    }
    if let Some(tag) = q.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        qb.push(" AND ").push_bind(tag.to_string()).push(" = ANY(tags)");
    }
    if let Some(raw) = q.status.as_deref().filter(|s| !s.trim().is_empty()) {
        let status = BlogStatus::parse(raw).ok_or_else(|| NurseryError::bad_request("Status must be DRAFT or PUBLISHED"))?;
        qb.push(" AND status = ").push_bind(status);
    }
    qb.push(" ORDER BY created_at DESC");
    Ok(qb)
}

/// Public listing.
async fn list_blogs(State(s): State<AppState>, Query(q): Query<BlogQuery>) -> Result<Json<Vec<BlogPost>>> {
    Ok(Json(blog_filter(&q)?.build_query_as::<BlogPost>().fetch_all(&s.db).await?))
}

async fn get_blog(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<BlogPost>> {
    sqlx::query_as::<_, BlogPost>("SELECT * FROM blog_posts WHERE id = $1").bind(id).fetch_optional(&s.db).await?
        .map(Json).ok_or_else(|| NurseryError::not_found("Blog"))
}

/// Fields missing from the form keep their stored values.
async fn update_blog(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, multipart: Multipart) -> Result<Json<serde_json::Value>> {
    let form = Form::read(multipart).await?;
    let status = status_field(&form)?;
    let thumbnail_url = match form.file("thumbnail") {
        Some(upload) => Some(store_thumbnail(&s, upload).await?),
        None => None,
    };
    let categories = form.text("categories").map(parse_list_field);
    let tags = form.text("tags").map(parse_list_field);
    let post = sqlx::query_as::<_, BlogPost>(
        "UPDATE blog_posts SET title = COALESCE($2, title), excerpt = COALESCE($3, excerpt), content = COALESCE($4, content), \
         thumbnail_url = COALESCE($5, thumbnail_url), seo_title = COALESCE($6, seo_title), seo_description = COALESCE($7, seo_description), \
         seo_keywords = COALESCE($8, seo_keywords), status = COALESCE($9, status), \
         published_at = CASE WHEN COALESCE($9, status) = 'PUBLISHED' THEN COALESCE(published_at, NOW()) ELSE published_at END, \
         categories = COALESCE($10, categories), tags = COALESCE($11, tags), updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id).bind(form.text("title")).bind(form.text("excerpt")).bind(form.text("content")).bind(&thumbnail_url)
    .bind(form.text("seoTitle")).bind(form.text("seoDescription")).bind(form.text("seoKeywords"))
    .bind(status).bind(categories).bind(tags)
    .fetch_optional(&s.db)
    .await?
    .ok_or_else(|| NurseryError::not_found("Blog"))?;
    Ok(Json(json!({ "message": "Blog updated successfully", "blog": post })))
}

async fn delete_blog(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    if sqlx::query("DELETE FROM blog_posts WHERE id = $1").bind(id).execute(&s.db).await?.rows_affected() == 0 {
        return Err(NurseryError::not_found("Blog"));
    }
    Ok(message("Blog deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_field_formats() {
        assert_eq!(parse_list_field(r#"["Care", "Harvest"]"#), vec!["Care", "Harvest"]);
        assert_eq!(parse_list_field("['Care','Harvest']"), vec!["Care", "Harvest"]);
        assert_eq!(parse_list_field("Care, Harvest ,,Care"), vec!["Care", "Harvest"]);
        assert_eq!(parse_list_field("[Care, Harvest]"), vec!["Care", "Harvest"]);
        assert!(parse_list_field("  ").is_empty());
    }

    #[test]
    fn test_blog_status_parse() {
        assert_eq!(BlogStatus::parse("published"), Some(BlogStatus::Published));
        assert_eq!(BlogStatus::parse("archived"), None);
    }

    #[test]
    fn test_blog_filter_sql() {
        let q = BlogQuery { category: Some("Care".into()), status: Some("draft".into()), ..Default::default() };
        let qb = blog_filter(&q).unwrap();
        assert_eq!(qb.sql(), "SELECT * FROM blog_posts WHERE TRUE AND $1 = ANY(categories) AND status = $2 ORDER BY created_at DESC");
        assert!(blog_filter(&BlogQuery { status: Some("x".into()), ..Default::default() }).is_err());
    }
}
