use reqwest::{Client, RequestBuilder, Url};

use super::ConsoleError;
use crate::config::ClientConfig;
use crate::registry::{AccessStatus, StatusUpdate, VisitorDetail, VisitorIdentity};

/// REST client for `/tracking/dashboard/visitors/`.
#[derive(Clone)]
pub struct DashboardClient {
    client: Client,
    base_url: String,
    admin_token: Option<String>,
}

impl DashboardClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: Client::builder()
                .cookie_store(true)
                .user_agent(config.user_agent.clone())
                .timeout(config.http_timeout)
                .build()
                .unwrap_or_default(),
            base_url: config.dashboard_url(),
            admin_token: config.admin_token.clone(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.admin_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `{base}{id}/` with `id` encoded as a single path segment.
    fn visitor_url(&self, id: &str) -> Result<Url, ConsoleError> {
        segment_url(&self.base_url, &[id, ""])
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, ConsoleError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ConsoleError::Status {
            status: status.as_u16(),
            body,
        })
    }

    pub async fn list_visitors(&self) -> Result<Vec<VisitorIdentity>, ConsoleError> {
        let response = self.authorize(self.client.get(&self.base_url)).send().await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    pub async fn visitor_detail(&self, id: &str) -> Result<VisitorDetail, ConsoleError> {
        let response = self
            .authorize(self.client.get(self.visitor_url(id)?))
            .send()
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    pub async fn update_access_status(
        &self,
        id: &str,
        access_status: AccessStatus,
    ) -> Result<VisitorIdentity, ConsoleError> {
        let response = self
            .authorize(self.client.patch(self.visitor_url(id)?))
            .json(&StatusUpdate { access_status })
            .send()
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }
}

/// Appends `segments` to `base`, percent-encoding each one.
pub(crate) fn segment_url(base: &str, segments: &[&str]) -> Result<Url, ConsoleError> {
    let mut url = Url::parse(base).map_err(|e| ConsoleError::InvalidUrl(format!("{}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| ConsoleError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
