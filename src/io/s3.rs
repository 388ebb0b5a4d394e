use super::AsyncReadRange;
use aws_sdk_s3::operation::get_object::builders::GetObjectFluentBuilder;
use aws_sdk_s3::types::RequestPayer;
use aws_sdk_s3::Client;
use futures::future::BoxFuture;
use std::fmt;
use std::io::{Error, ErrorKind, Result};

/// Range reader over S3 GetObject.
pub struct S3Reader {
    request: GetObjectFluentBuilder,
}

impl S3Reader {
    /// Reader for requester-pays buckets such as the Landsat archive.
    pub fn requester_pays(client: &Client, bucket: &str, key: &str) -> Self {
        let request = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .request_payer(RequestPayer::Requester);
        Self { request }
    }

    /// Split `s3://bucket/key` into bucket and key.
    pub fn parse_uri(uri: &str) -> Option<(&str, &str)> {
        let rest = uri.strip_prefix("s3://")?;
        let (bucket, key) = rest.split_once('/')?;
        (!bucket.is_empty() && !key.is_empty()).then_some((bucket, key))
    }
}

impl fmt::Debug for S3Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Reader")
            .field("bucket", &self.request.get_bucket().as_ref())
            .field("key", &self.request.get_key().as_ref())
            .finish()
    }
}

impl AsyncReadRange for S3Reader {
    fn read_range_async<'a>(
        &'a self,
        start: u64,
        buf: &'a mut [u8],
    ) -> BoxFuture<'a, Result<usize>> {
        let n = buf.len();
        let end = start + (n as u64).max(1) - 1; // GOTCHA byte range includes end
        let request_builder = self.request.clone().range(format!("bytes={start}-{end}"));

        Box::pin(async move {
            if n == 0 {
                return Ok(0);
            }
            let mut response = request_builder
                .send()
                .await
                .map_err(|e| Error::new(ErrorKind::NotConnected, format!("{e:?}")))?;

            let mut pos = 0;
            while let Some(bytes) = response.body.try_next().await.map_err(|err| {
                Error::new(
                    ErrorKind::Interrupted,
                    format!("Failed to read from S3 download stream: {err:?}"),
                )
            })? {
                let count = bytes.len().min(n - pos);
                buf[pos..pos + count].copy_from_slice(&bytes[..count]);
                pos += count;
                if pos == n {
                    break;
                }
            }
            Ok(pos)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_s3_uris() {
        assert_eq!(
            S3Reader::parse_uri("s3://usgs-landsat/collection02/B4.TIF"),
            Some(("usgs-landsat", "collection02/B4.TIF"))
        );
        assert_eq!(S3Reader::parse_uri("s3://bucket"), None);
        assert_eq!(S3Reader::parse_uri("https://example.com/a"), None);
    }
}
