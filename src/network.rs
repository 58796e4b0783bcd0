use async_trait::async_trait;
use std::time::Duration;

/// Connectivity check used to decide between running a sync now or deferring it
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn has_connection(&self) -> bool;
}

/// Probes reachability with a lightweight HTTP request.
///
/// Any response, including an error status, counts as connected; only
/// transport failures (DNS, connect, timeout) count as offline.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NetworkProbe for HttpProbe {
    async fn has_connection(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                log::trace!("Reachability probe got {}", response.status());
                true
            }
            Err(e) => {
                log::debug!("Reachability probe failed: {e}");
                false
            }
        }
    }
}
