use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::AppError;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// 24h clock, "HH:MM".
pub static TIME_OF_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("valid time regex"));

pub static PHONE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{6,18}$").expect("valid phone regex"));

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
}

/// The JSON envelope every endpoint answers with.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        })
    }

    pub fn ok_with_message(data: T, message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: Some(message.to_string()),
            error: None,
        })
    }

    pub fn failure(
        code: &str,
        message: String,
        details: Option<HashMap<String, Vec<String>>>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(ErrorBody {
                code: code.to_string(),
                message,
                details,
            }),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            data: None,
            message: Some(message.to_string()),
            error: None,
        })
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, page: Page, total_items: i64) -> Self {
        Self {
            data,
            page: page.page,
            page_size: page.page_size,
            total_items,
            total_pages: page.total_pages(total_items),
        }
    }
}

/// Raw `page` / `pageSize` query parameters.
#[derive(Debug, Default, Clone, Copy, FromForm)]
pub struct PageParams {
    pub page: Option<i64>,
    #[field(name = "pageSize")]
    pub page_size: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub page_size: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    pub fn total_pages(&self, total_items: i64) -> i64 {
        (total_items + self.page_size - 1) / self.page_size
    }
}

impl PageParams {
    pub fn resolve(&self) -> Result<Page, AppError> {
        let page = self.page.unwrap_or(1);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);

        if page < 1 {
            return Err(AppError::Validation("page must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(AppError::Validation(format!(
                "pageSize must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        Ok(Page { page, page_size })
    }
}

pub fn field_messages(errors: &ValidationErrors) -> HashMap<String, Vec<String>> {
    let mut error_map = HashMap::new();

    for (field, field_errors) in errors.field_errors() {
        let error_messages: Vec<String> = field_errors
            .iter()
            .map(|error| {
                error
                    .message
                    .clone()
                    .unwrap_or_else(|| "Invalid value".into())
                    .to_string()
            })
            .collect();

        error_map.insert(field.to_string(), error_messages);
    }

    error_map
}

pub trait JsonValidateExt<T> {
    fn validated(self) -> Result<T, AppError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validated(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate()?;
        Ok(inner)
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let long_enough = password.chars().count() >= 8;
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if long_enough && has_upper && has_lower && has_digit {
        Ok(())
    } else {
        Err(ValidationError::new("weak_password").with_message(
            "Password must be at least 8 characters with upper case, lower case and a digit"
                .into(),
        ))
    }
}

pub fn validate_string_list(items: &[String]) -> Result<(), ValidationError> {
    if items.iter().any(|item| item.trim().is_empty() || item.len() > 200) {
        return Err(ValidationError::new("invalid_list")
            .with_message("List entries must be non-empty and at most 200 characters".into()));
    }
    Ok(())
}
