//! Site meta tags, policy pages and contact details.
use axum::{
    extract::{Multipart, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;
use crate::auth::AdminUser;
use crate::http::extract::{Form, ValidatedJson};
use crate::http::AppState;
use crate::storage::extension_of;
use crate::{NurseryError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/fetch-meta-data", get(fetch_meta))
        .route("/update-meta-data", post(update_meta).put(update_meta))
        .route("/fetch-policy", get(fetch_policy))
        .route("/update-policy", put(update_policy).post(update_policy))
        .route("/fetch-contact-details", get(fetch_contact_details))
        .route("/update-contact-details", put(update_contact_details).post(update_contact_details))
}

/// Pages that carry their own meta tags.
pub const META_OPTIONS: [&str; 9] =
    ["home", "knowOurPepper", "articles", "contactUs", "trackOrder", "bookYourPepper", "login", "terms", "privacyPolicy"];

pub fn meta_option(raw: &str) -> Result<&'static str> {
    META_OPTIONS
        .into_iter()
        .find(|o| *o == raw.trim())
        .ok_or_else(|| NurseryError::bad_request(format!("Invalid option. Expected one of: {}", META_OPTIONS.join(", "))))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SiteMeta {
    pub option: String,
    pub title: String,
    pub description: String,
    pub keywords: Option<String>,
    pub canonical_url: Option<String>,
    pub image_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct MetaQuery { pub option: Option<String> }

/// One page's meta when `option` is given, otherwise all of them. Public.
async fn fetch_meta(State(s): State<AppState>, Query(q): Query<MetaQuery>) -> Result<Json<serde_json::Value>> {
    match q.option.as_deref() {
        Some(raw) => {
            let option = meta_option(raw)?;
            let meta = sqlx::query_as::<_, SiteMeta>("SELECT * FROM site_meta WHERE option = $1").bind(option).fetch_optional(&s.db).await?
                .ok_or_else(|| NurseryError::not_found("Meta data"))?;
            Ok(Json(json!(meta)))
        }
        None => {
            let all = sqlx::query_as::<_, SiteMeta>("SELECT * FROM site_meta ORDER BY option").fetch_all(&s.db).await?;
            Ok(Json(json!(all)))
        }
    }
}

async fn update_meta(State(s): State<AppState>, _admin: AdminUser, multipart: Multipart) -> Result<Json<serde_json::Value>> {
    let form = Form::read(multipart).await?;
    let option = meta_option(form.require("option")?)?;
    let title = form.require("title")?;
    let description = form.require("description")?;
    let image_url = match form.file("image") {
        Some(upload) => {
            let key = format!("meta/{option}-{}-{}.{}", Utc::now().timestamp_millis(), Uuid::new_v4(), extension_of(upload.file_name.as_deref()));
            Some(s.blobs.put(&key, &upload.bytes).await?)
        }
        None => None,
    };
    let meta = sqlx::query_as::<_, SiteMeta>(
        "INSERT INTO site_meta (option, title, description, keywords, canonical_url, image_url, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
         ON CONFLICT (option) DO UPDATE SET title = EXCLUDED.title, description = EXCLUDED.description, \
         keywords = EXCLUDED.keywords, canonical_url = EXCLUDED.canonical_url, \
         image_url = COALESCE(EXCLUDED.image_url, site_meta.image_url), updated_at = NOW() RETURNING *",
    )
    .bind(option).bind(title).bind(description).bind(form.text("keywords")).bind(form.text("canonicalUrl")).bind(image_url)
    .fetch_one(&s.db)
    .await?;
    Ok(Json(json!({ "message": "Meta data updated successfully", "meta": meta })))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub terms: Option<String>,
    pub privacy_policy: Option<String>,
    pub updated_at: DateTime<Utc>,
}

async fn fetch_policy(State(s): State<AppState>) -> Result<Json<Policy>> {
    Ok(Json(sqlx::query_as::<_, Policy>("SELECT terms, privacy_policy, updated_at FROM policy WHERE id = 1").fetch_one(&s.db).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRequest {
    pub terms: Option<String>,
    pub privacy_policy: Option<String>,
}

async fn update_policy(State(s): State<AppState>, _admin: AdminUser, Json(r): Json<PolicyRequest>) -> Result<Json<serde_json::Value>> {
    if r.terms.is_none() && r.privacy_policy.is_none() {
        return Err(NurseryError::bad_request("Provide terms or privacyPolicy"));
    }
    let policy = sqlx::query_as::<_, Policy>(
        "UPDATE policy SET terms = COALESCE($1, terms), privacy_policy = COALESCE($2, privacy_policy), updated_at = NOW() \
         WHERE id = 1 RETURNING terms, privacy_policy, updated_at",
    )
    .bind(&r.terms).bind(&r.privacy_policy)
    .fetch_one(&s.db)
    .await?;
    Ok(Json(json!({ "message": "Policy updated successfully", "policy": policy })))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ContactDetails {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub instagram: Option<String>,
    pub facebook: Option<String>,
    pub youtube: Option<String>,
}

async fn fetch_contact_details(State(s): State<AppState>) -> Result<Json<ContactDetails>> {
    Ok(Json(
        sqlx::query_as::<_, ContactDetails>("SELECT email, phone, address, instagram, facebook, youtube FROM contact_details WHERE id = 1")
            .fetch_one(&s.db)
            .await?,
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContactDetailsRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: Option<String>,
    #[validate(regex(path = "crate::auth::PHONE_RE", message = "Please enter a valid phone number"))]
    pub phone: Option<String>,
    pub address: Option<String>,
    #[validate(url(message = "Instagram must be a URL"))]
    pub instagram: Option<String>,
    #[validate(url(message = "Facebook must be a URL"))]
    pub facebook: Option<String>,
    #[validate(url(message = "YouTube must be a URL"))]
    pub youtube: Option<String>,
}

/// Only the fields present in the body change.
async fn update_contact_details(State(s): State<AppState>, _admin: AdminUser, ValidatedJson(r): ValidatedJson<ContactDetailsRequest>) -> Result<Json<serde_json::Value>> {
    let details = sqlx::query_as::<_, ContactDetails>(
        "UPDATE contact_details SET email = COALESCE($1, email), phone = COALESCE($2, phone), address = COALESCE($3, address), \
         instagram = COALESCE($4, instagram), facebook = COALESCE($5, facebook), youtube = COALESCE($6, youtube), updated_at = NOW() \
         WHERE id = 1 RETURNING email, phone, address, instagram, facebook, youtube",
    )
    .bind(&r.email).bind(&r.phone).bind(&r.address).bind(&r.instagram).bind(&r.facebook).bind(&r.youtube)
    .fetch_one(&s.db)
    .await?;
    Ok(Json(json!({ "message": "Contact details updated successfully", "contactDetails": details })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_options() {
        assert_eq!(meta_option(" knowOurPepper ").unwrap(), "knowOurPepper");
        assert!(meta_option("blog").is_err());
        assert!(meta_option("Home").is_err());
    }

    #[test]
    fn test_contact_details_validation() {
        let r = ContactDetailsRequest {
            email: None,
            phone: None,
            address: Some("Pulpally, Wayanad".into()),
            instagram: Some("instagram.com/nursery".into()),
            facebook: None,
            youtube: None,
        };
        assert!(r.validate().is_err());
    }
}
