use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pipeline_core::PipelineResult;
use pipeline_domain::{
    Agent, ArtifactCounts, ArtifactRepository, ExtractedContent, ExtractedUrl, GeneratedContent,
    Page, PageRequest, PublishTarget, PublishedPost, Website,
};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct ArtifactTables {
    websites: HashMap<String, Website>,
    agents: HashMap<String, Agent>,
    targets: HashMap<String, PublishTarget>,
    urls: HashMap<String, ExtractedUrl>,
    contents: HashMap<String, ExtractedContent>,
    generated: HashMap<String, GeneratedContent>,
    posts: HashMap<String, PublishedPost>,
}

/// 内存产物仓储
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactRepository {
    tables: Arc<RwLock<ArtifactTables>>,
}

impl InMemoryArtifactRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 按排序键倒序后分页，最新的在前
fn paginate<T: Clone, K: Ord>(
    table: &HashMap<String, T>,
    page: PageRequest,
    sort_key: impl Fn(&T) -> K,
) -> Page<T> {
    let mut items: Vec<_> = table.values().cloned().collect();
    items.sort_by_key(|item| std::cmp::Reverse(sort_key(item)));
    Page {
        total: items.len() as u64,
        items: page.slice(&items),
    }
}

fn sorted<T: Clone, K: Ord>(table: &HashMap<String, T>, sort_key: impl Fn(&T) -> K) -> Vec<T> {
    let mut items: Vec<_> = table.values().cloned().collect();
    items.sort_by_key(|item| sort_key(item));
    items
}

#[async_trait]
impl ArtifactRepository for InMemoryArtifactRepository {
    async fn save_website(&self, website: &Website) -> PipelineResult<Website> {
        let mut tables = self.tables.write().await;
        tables.websites.insert(website.id.clone(), website.clone());
        Ok(website.clone())
    }

    async fn find_website(&self, id: &str) -> PipelineResult<Option<Website>> {
        Ok(self.tables.read().await.websites.get(id).cloned())
    }

    async fn list_websites(&self) -> PipelineResult<Vec<Website>> {
        Ok(sorted(&self.tables.read().await.websites, |w| w.created_at))
    }

    async fn save_agent(&self, agent: &Agent) -> PipelineResult<Agent> {
        let mut tables = self.tables.write().await;
        tables.agents.insert(agent.id.clone(), agent.clone());
        Ok(agent.clone())
    }

    async fn find_agent(&self, id: &str) -> PipelineResult<Option<Agent>> {
        Ok(self.tables.read().await.agents.get(id).cloned())
    }

    async fn list_agents(&self) -> PipelineResult<Vec<Agent>> {
        Ok(sorted(&self.tables.read().await.agents, |a| a.created_at))
    }

    async fn save_target(&self, target: &PublishTarget) -> PipelineResult<PublishTarget> {
        let mut tables = self.tables.write().await;
        tables.targets.insert(target.id.clone(), target.clone());
        Ok(target.clone())
    }

    async fn find_target(&self, id: &str) -> PipelineResult<Option<PublishTarget>> {
        Ok(self.tables.read().await.targets.get(id).cloned())
    }

    async fn list_targets(&self) -> PipelineResult<Vec<PublishTarget>> {
        Ok(sorted(&self.tables.read().await.targets, |t| t.created_at))
    }

    async fn save_url(&self, url: &ExtractedUrl) -> PipelineResult<ExtractedUrl> {
        let mut tables = self.tables.write().await;
        tables.urls.insert(url.id.clone(), url.clone());
        Ok(url.clone())
    }

    async fn find_url(&self, id: &str) -> PipelineResult<Option<ExtractedUrl>> {
        Ok(self.tables.read().await.urls.get(id).cloned())
    }

    async fn find_url_by_address(
        &self,
        website_id: &str,
        url: &str,
    ) -> PipelineResult<Option<ExtractedUrl>> {
        Ok(self
            .tables
            .read()
            .await
            .urls
            .values()
            .find(|u| u.website_id == website_id && u.url == url)
            .cloned())
    }

    async fn list_urls(&self, page: PageRequest) -> PipelineResult<Page<ExtractedUrl>> {
        Ok(paginate(&self.tables.read().await.urls, page, |u| u.created_at))
    }

    async fn save_content(&self, content: &ExtractedContent) -> PipelineResult<ExtractedContent> {
        let mut tables = self.tables.write().await;
        tables.contents.insert(content.id.clone(), content.clone());
        Ok(content.clone())
    }

    async fn find_content(&self, id: &str) -> PipelineResult<Option<ExtractedContent>> {
        Ok(self.tables.read().await.contents.get(id).cloned())
    }

    async fn list_contents(&self, page: PageRequest) -> PipelineResult<Page<ExtractedContent>> {
        Ok(paginate(&self.tables.read().await.contents, page, |c| c.created_at))
    }

    async fn save_generated(&self, generated: &GeneratedContent) -> PipelineResult<GeneratedContent> {
        let mut tables = self.tables.write().await;
        tables.generated.insert(generated.id.clone(), generated.clone());
        Ok(generated.clone())
    }

    async fn find_generated(&self, id: &str) -> PipelineResult<Option<GeneratedContent>> {
        Ok(self.tables.read().await.generated.get(id).cloned())
    }

    async fn list_generated(&self, page: PageRequest) -> PipelineResult<Page<GeneratedContent>> {
        Ok(paginate(&self.tables.read().await.generated, page, |g| g.created_at))
    }

    async fn save_post(&self, post: &PublishedPost) -> PipelineResult<PublishedPost> {
        let mut tables = self.tables.write().await;
        tables.posts.insert(post.id.clone(), post.clone());
        Ok(post.clone())
    }

    async fn find_post(&self, id: &str) -> PipelineResult<Option<PublishedPost>> {
        Ok(self.tables.read().await.posts.get(id).cloned())
    }

    async fn list_posts(&self, page: PageRequest) -> PipelineResult<Page<PublishedPost>> {
        Ok(paginate(&self.tables.read().await.posts, page, |p| p.published_at))
    }

    async fn counts(&self) -> PipelineResult<ArtifactCounts> {
        let tables = self.tables.read().await;
        Ok(ArtifactCounts {
            websites: tables.websites.len() as u64,
            urls: tables.urls.len() as u64,
            contents: tables.contents.len() as u64,
            generated: tables.generated.len() as u64,
            posts: tables.posts.len() as u64,
        })
    }
}
