//! HTTP client for the catalog's JSON API.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tagdex_config::UpstreamSettings;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info};
use url::Url;

use super::{
    AliasPayload, PostPayload, TagPayload, Upstream, UpstreamError,
    model::{PostsEnvelope, TagList},
};
use crate::RateLimiter;

/// Largest number of ids one `id:` search may carry.
const MAX_IDS_PER_REQUEST: usize = 100;

/// Talks to the catalog over HTTP, one request per rate-limit slot.
#[derive(Debug)]
pub struct HttpUpstream {
    /// Shared HTTP client with user agent and timeout.
    client: Client,
    /// API root.
    base: Url,
    /// Export directory root.
    export_base: Url,
    /// Global request pacing.
    limiter: RateLimiter,
}

impl HttpUpstream {
    /// Builds a client from settings.
    pub fn new(settings: &UpstreamSettings) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout())
            .build()
            .map_err(|e| UpstreamError::Transport {
                url: settings.base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base: directory_url(&settings.base_url)?,
            export_base: directory_url(&settings.export_base_url)?,
            limiter: RateLimiter::from_settings(settings),
        })
    }

    /// Sends a rate-limited GET and checks the status.
    async fn get(&self, url: Url) -> Result<Response, UpstreamError> {
        self.limiter.acquire().await;
        debug!(%url, "upstream request");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| UpstreamError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(UpstreamError::RateLimited {
                url: url.to_string(),
            }),
            status if !status.is_success() => Err(UpstreamError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
            _ => Ok(response),
        }
    }

    /// GETs an API path and decodes the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let mut url = self.base.join(path)?;
        url.query_pairs_mut().extend_pairs(query);
        let response = self.get(url.clone()).await?;
        response.json().await.map_err(|e| {
            if e.is_decode() {
                UpstreamError::Decode {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            } else {
                UpstreamError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }

    /// Fetches one page of records.
    async fn posts(&self, query: &[(&str, String)]) -> Result<Vec<PostPayload>, UpstreamError> {
        let envelope: PostsEnvelope = self.get_json("posts.json", query).await?;
        Ok(envelope.posts)
    }
}

/// Parses a base URL so that relative joins land beneath it.
fn directory_url(raw: &str) -> Result<Url, UpstreamError> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn posts_after(&self, after_id: u64, limit: usize) -> Result<Vec<PostPayload>, UpstreamError> {
        self.posts(&[("limit", limit.to_string()), ("page", format!("a{after_id}"))])
            .await
    }

    async fn posts_by_change(&self, page: usize, limit: usize) -> Result<Vec<PostPayload>, UpstreamError> {
        self.posts(&[
            ("limit", limit.to_string()),
            ("order", "change".into()),
            ("page", page.to_string()),
        ])
        .await
    }

    async fn posts_by_ids(&self, ids: &[u64]) -> Result<Vec<PostPayload>, UpstreamError> {
        let mut found = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let list = chunk
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let page = self
                .posts(&[
                    ("limit", chunk.len().to_string()),
                    ("tags", format!("id:{list} status:any")),
                ])
                .await?;
            found.extend(page);
        }
        Ok(found)
    }

    async fn tag_by_name(&self, name: &str) -> Result<Option<TagPayload>, UpstreamError> {
        let list: TagList = self
            .get_json(
                "tags.json",
                &[("limit", "1".into()), ("search[name_matches]", name.into())],
            )
            .await?;
        Ok(list.into_tags().into_iter().find(|t| t.name == name))
    }

    async fn tags_by_update(&self, page: usize) -> Result<Vec<TagPayload>, UpstreamError> {
        let list: TagList = self
            .get_json(
                "tags.json",
                &[
                    ("limit", "320".into()),
                    ("search[order]", "updated".into()),
                    ("page", page.to_string()),
                ],
            )
            .await?;
        Ok(list.into_tags())
    }

    async fn aliases_after(&self, after_id: u64, limit: usize) -> Result<Vec<AliasPayload>, UpstreamError> {
        self.get_json(
            "tag_aliases.json",
            &[("limit", limit.to_string()), ("page", format!("a{after_id}"))],
        )
        .await
    }

    async fn implications_after(
        &self,
        after_id: u64,
        limit: usize,
    ) -> Result<Vec<AliasPayload>, UpstreamError> {
        self.get_json(
            "tag_implications.json",
            &[("limit", limit.to_string()), ("page", format!("a{after_id}"))],
        )
        .await
    }

    async fn fetch_export(&self, name: &str, dir: &Path) -> Result<PathBuf, UpstreamError> {
        let dest = dir.join(name);
        if fs::try_exists(&dest).await? {
            debug!(path = %dest.display(), "reusing downloaded export");
            return Ok(dest);
        }
        fs::create_dir_all(dir).await?;

        let url = self.export_base.join(name)?;
        let mut response = self.get(url.clone()).await?;
        let partial = dir.join(format!("{name}.part"));
        let mut file = fs::File::create(&partial).await?;
        let mut bytes = 0usize;
        loop {
            let chunk = response.chunk().await.map_err(|e| UpstreamError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            let Some(chunk) = chunk else {
                break;
            };
            bytes += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        fs::rename(&partial, &dest).await?;
        info!(export = name, bytes, "downloaded export");
        Ok(dest)
    }
}
