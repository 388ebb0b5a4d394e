use super::AsyncReadRange;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::RANGE;
use reqwest::{Client, IntoUrl, StatusCode, Url};
use std::io::{Error, ErrorKind, Result};
use tracing::*;

/// Range reader over HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpReader {
    client: Client,
    url: Url,
}

impl HttpReader {
    pub fn new<U: IntoUrl>(client: Client, url: U) -> Result<Self> {
        Ok(Self {
            client,
            url: url
                .into_url()
                .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("{e}")))?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl AsyncReadRange for HttpReader {
    fn read_range_async<'a>(
        &'a self,
        start: u64,
        buf: &'a mut [u8],
    ) -> BoxFuture<'a, Result<usize>> {
        let n = buf.len();
        async move {
            if n == 0 {
                return Ok(0);
            }
            let end = start + n as u64 - 1; // GOTCHA byte range includes end
            trace!("GET {} bytes={start}-{end}", self.url);
            let response = self
                .client
                .get(self.url.clone())
                .header(RANGE, format!("bytes={start}-{end}"))
                .send()
                .await
                .map_err(|e| Error::new(ErrorKind::NotConnected, format!("{e}")))?;

            let status = response.status();
            if status == StatusCode::RANGE_NOT_SATISFIABLE {
                return Ok(0);
            }
            if !status.is_success() {
                return Err(Error::new(
                    ErrorKind::Other,
                    format!("HTTP {status} for {}", self.url),
                ));
            }
            // Servers ignoring the range send the whole body
            let skip = if status == StatusCode::PARTIAL_CONTENT {
                0
            } else {
                start as usize
            };

            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::new(ErrorKind::InvalidData, format!("{e}")))?;
            let available = bytes.get(skip..).unwrap_or_default();
            let count = available.len().min(n);
            buf[..count].copy_from_slice(&available[..count]);
            Ok(count)
        }
        .boxed()
    }
}
