use axum::{http::StatusCode, response::IntoResponse, Json};
use pipeline_domain::{Page, PageRequest};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: chrono::Utc::now(),
        }
    }
    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl ApiResponse<()> {
    pub fn success_empty_with_message(message: String) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u32, page_size: u32) -> Self {
        let total_pages = if page_size > 0 {
            total.div_ceil(page_size as u64)
        } else {
            0
        };

        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }

    pub fn from_page(page: Page<T>, request: PageRequest) -> Self {
        Self::new(page.items, page.total, request.page, request.page_size)
    }
}

pub fn success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, ApiResponse::success(data))
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::CREATED, ApiResponse::success(data))
}

pub fn accepted<T: Serialize>(data: T, message: String) -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        ApiResponse::success_with_message(data, message),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test_data");

        assert!(response.success);
        assert_eq!(response.data, Some("test_data"));
        assert!(response.message.is_none());
        assert!(response.timestamp <= Utc::now());
    }

    #[test]
    fn test_api_response_empty_with_message() {
        let response = ApiResponse::success_empty_with_message("队列已清空".to_string());

        assert!(response.success);
        assert!(response.data.is_none());
        assert_eq!(response.message.as_deref(), Some("队列已清空"));
    }

    #[test]
    fn test_paginated_response_total_pages() {
        let response = PaginatedResponse::new(vec![1, 2, 3], 41, 1, 20);
        assert_eq!(response.total_pages, 3);

        let exact = PaginatedResponse::new(vec![1], 40, 2, 20);
        assert_eq!(exact.total_pages, 2);

        let empty: PaginatedResponse<i32> = PaginatedResponse::new(vec![], 0, 1, 20);
        assert_eq!(empty.total_pages, 0);

        let zero_size: PaginatedResponse<i32> = PaginatedResponse::new(vec![], 10, 1, 0);
        assert_eq!(zero_size.total_pages, 0);
    }

    #[test]
    fn test_paginated_response_uses_camel_case() {
        let response = PaginatedResponse::new(vec!["a"], 1, 1, 20);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["pageSize"], 20);
        assert_eq!(json["totalPages"], 1);
        assert!(json.get("page_size").is_none());
    }

    #[test]
    fn test_from_page_carries_request() {
        let page = Page {
            items: vec!["x", "y"],
            total: 7,
        };
        let response = PaginatedResponse::from_page(page, PageRequest::new(2, 2));

        assert_eq!(response.page, 2);
        assert_eq!(response.page_size, 2);
        assert_eq!(response.total_pages, 4);
        assert_eq!(response.items.len(), 2);
    }
}
