pub mod catalog;
pub mod configs;
pub mod events;
pub mod health;
pub mod jobs;
pub mod stages;
pub mod system;

use pipeline_domain::PageRequest;
use serde::Deserialize;

/// 列表接口的分页参数，页码从1开始
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PaginationQuery {
    pub fn to_request(&self) -> PageRequest {
        let defaults = PageRequest::default();
        PageRequest::new(
            self.page.unwrap_or(defaults.page),
            self.page_size.unwrap_or(defaults.page_size),
        )
    }
}
