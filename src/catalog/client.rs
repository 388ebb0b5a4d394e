use super::{SceneCatalog, StacItem, StacItemCollection, StacSearchParams};
use crate::bands::SensorFamily;
use crate::config::{CatalogConfig, EndpointConfig};
use crate::error::{SceneError, SceneResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::Mutex as TokioMutex;
use tracing::*;

#[derive(Debug, Deserialize)]
struct SasToken {
    token: String,
}

/// STAC API client, one endpoint per sensor family.
///
/// Endpoints with a SAS token URL (Planetary Computer) get their asset hrefs
/// signed with a per-collection token, fetched once and reused.
#[derive(Debug)]
pub struct StacClient {
    client: reqwest::Client,
    sentinel2: EndpointConfig,
    landsat: EndpointConfig,
    tokens: TokioMutex<HashMap<String, String>>,
}

impl StacClient {
    pub fn new(config: &CatalogConfig) -> SceneResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SceneError::CatalogUnavailable(format!("HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &CatalogConfig) -> Self {
        Self {
            client,
            sentinel2: config.sentinel2.clone(),
            landsat: config.landsat.clone(),
            tokens: TokioMutex::new(HashMap::new()),
        }
    }

    /// Shared HTTP client, reused for asset range reads.
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    fn endpoint(&self, family: SensorFamily) -> &EndpointConfig {
        match family {
            SensorFamily::Sentinel2 => &self.sentinel2,
            SensorFamily::Landsat => &self.landsat,
        }
    }

    pub fn search_url(&self, family: SensorFamily) -> String {
        let base = self.endpoint(family).url.trim_end_matches('/');
        if base.ends_with("/search") {
            base.to_string()
        } else {
            format!("{base}/search")
        }
    }

    async fn post_search(
        &self,
        family: SensorFamily,
        params: &StacSearchParams,
    ) -> SceneResult<Vec<StacItem>> {
        let url = self.search_url(family);
        debug!("POST {url}");
        let unavailable = |e: reqwest::Error| SceneError::CatalogUnavailable(format!("{url}: {e}"));

        let response = self
            .client
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;
        let collection: StacItemCollection = response.json().await.map_err(unavailable)?;
        info!("{} returned {} items", url, collection.features.len());

        let Some(sas_url) = self.endpoint(family).sas_token_url.clone() else {
            return Ok(collection.features);
        };
        let mut items = collection.features;
        for item in items.iter_mut() {
            let name = item
                .collection
                .clone()
                .unwrap_or_else(|| family.collection().to_string());
            let token = self.token(&sas_url, &name).await?;
            for asset in item.assets.values_mut() {
                asset.href = sign_href(&asset.href, &token);
            }
        }
        Ok(items)
    }

    /// SAS token for a collection, cached for the client's lifetime.
    async fn token(&self, sas_url: &str, collection: &str) -> SceneResult<String> {
        let mut tokens = self.tokens.lock().await;
        if let Some(token) = tokens.get(collection) {
            return Ok(token.clone());
        }
        let url = format!("{}/{collection}", sas_url.trim_end_matches('/'));
        debug!("Requesting SAS token from {url}");
        let unavailable =
            |e: reqwest::Error| SceneError::CatalogUnavailable(format!("SAS token {url}: {e}"));
        let sas: SasToken = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;
        tokens.insert(collection.to_string(), sas.token.clone());
        Ok(sas.token)
    }
}

impl SceneCatalog for StacClient {
    fn fetch<'a>(
        &'a self,
        family: SensorFamily,
        params: &'a StacSearchParams,
    ) -> BoxFuture<'a, SceneResult<Vec<StacItem>>> {
        self.post_search(family, params).boxed()
    }
}

/// Append a SAS token query, leaving already signed hrefs alone.
pub fn sign_href(href: &str, token: &str) -> String {
    if href.contains('?') || !href.starts_with("http") {
        href.to_string()
    } else {
        format!("{href}?{}", token.trim_start_matches('?'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_appends_once() {
        let signed = sign_href("https://a.blob.core.windows.net/x/B4.TIF", "st=1&sig=abc");
        assert_eq!(signed, "https://a.blob.core.windows.net/x/B4.TIF?st=1&sig=abc");
        assert_eq!(sign_href(&signed, "st=2"), signed);
        assert_eq!(sign_href("s3://bucket/key.tif", "st=2"), "s3://bucket/key.tif");
    }

    #[test]
    fn search_url_is_normalised() {
        let mut config = CatalogConfig::default();
        config.sentinel2.url = "https://stac.example.com/v1/".to_string();
        config.landsat.url = "https://stac.example.com/v1/search".to_string();
        let client = StacClient::new(&config).unwrap();
        assert_eq!(
            client.search_url(SensorFamily::Sentinel2),
            "https://stac.example.com/v1/search"
        );
        assert_eq!(
            client.search_url(SensorFamily::Landsat),
            "https://stac.example.com/v1/search"
        );
    }

    #[tokio::test]
    async fn unreachable_catalog_is_unavailable() {
        let mut config = CatalogConfig::default();
        config.sentinel2.url = "http://127.0.0.1:9".to_string();
        config.timeout_secs = 2;
        let client = StacClient::new(&config).unwrap();
        let err = client
            .fetch(SensorFamily::Sentinel2, &StacSearchParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SceneError::CatalogUnavailable(_)));
    }
}
