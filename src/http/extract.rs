//! Request extractors and shared response shapes.
use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    Json,
};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;
use crate::storage::Upload;
use crate::{NurseryError, Result};

/// JSON body that has passed `validator` checks.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = NurseryError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| NurseryError::bad_request(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

pub const PAGE_SIZE: u32 = 5;

/// 1-based page of `PAGE_SIZE` rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page(u32);

impl Page {
    pub fn new(page: u32) -> Self { Self(page.max(1)) }
    pub fn number(&self) -> u32 { self.0 }
    pub fn limit(&self) -> i64 { i64::from(PAGE_SIZE) }
    pub fn offset(&self) -> i64 { i64::from(self.0 - 1) * i64::from(PAGE_SIZE) }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: Page) -> Self {
        let per = i64::from(PAGE_SIZE);
        Self { data, total, page: page.number(), per_page: PAGE_SIZE, total_pages: (total + per - 1) / per }
    }
}

/// Filters shared by the admin list endpoints. Each endpoint reads the ones it supports.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub state: Option<String>,
    pub is_active: Option<bool>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ListQuery {
    /// `%term%` for `ILIKE`, or `None` when no search was given.
    pub fn search_pattern(&self) -> Option<String> { like_pattern(self.search.as_deref()) }
}

pub fn like_pattern(term: Option<&str>) -> Option<String> {
    term.map(str::trim).filter(|t| !t.is_empty()).map(|t| {
        let escaped = t.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        format!("%{escaped}%")
    })
}

/// A fully read multipart body: text fields by name, file parts by field name.
#[derive(Debug, Default)]
pub struct Form {
    fields: HashMap<String, String>,
    files: HashMap<String, Vec<Upload>>,
}

impl Form {
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(|e| NurseryError::bad_request(e.body_text()))? {
            let name = field.name().unwrap_or_default().to_string();
            if field.file_name().is_some() {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| NurseryError::bad_request(e.body_text()))?;
                if !bytes.is_empty() {
                    form.files.entry(name).or_default().push(Upload { file_name, bytes });
                }
            } else {
                let text = field.text().await.map_err(|e| NurseryError::bad_request(e.body_text()))?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    /// Trimmed, non-empty text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    pub fn require(&self, name: &str) -> Result<&str> {
        self.text(name).ok_or_else(|| NurseryError::bad_request(format!("{name} is required")))
    }

    pub fn files(&self, name: &str) -> &[Upload] { self.files.get(name).map(Vec::as_slice).unwrap_or_default() }

    pub fn file(&self, name: &str) -> Option<&Upload> { self.files(name).first() }

    #[cfg(test)]
    pub fn with_fields(pairs: &[(&str, &str)]) -> Self {
        Self { fields: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(), files: HashMap::new() }
    }
}
