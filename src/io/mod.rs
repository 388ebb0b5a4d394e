// Stateless range I/O
//   AsyncReadRange takes &self, so one reader can serve many concurrent tile
//   requests. Implemented for HTTP range requests, S3 GetObject ranges and
//   anything AsyncRead + AsyncSeek behind a tokio Mutex (local files, buffers).

use futures::future::BoxFuture;
use futures::FutureExt;
use std::io::{Error, ErrorKind, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio::sync::Mutex as TokioMutex;

mod http;
#[cfg(feature = "s3")]
mod s3;

pub use http::HttpReader;
#[cfg(feature = "s3")]
pub use s3::S3Reader;

pub trait AsyncReadRange: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `start`, returning the count.
    ///
    /// Short counts only happen at the end of the resource.
    fn read_range_async<'a>(&'a self, start: u64, buf: &'a mut [u8])
        -> BoxFuture<'a, Result<usize>>;

    fn read_range_exact_async<'a>(
        &'a self,
        start: u64,
        buf: &'a mut [u8],
    ) -> BoxFuture<'a, Result<()>> {
        let n = buf.len();
        async move {
            match self.read_range_async(start, buf).await? {
                bytes_read if bytes_read == n => Ok(()),
                bytes_read => Err(Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("Failed to completely fill buffer: {bytes_read} < {n}"),
                )),
            }
        }
        .boxed()
    }

    fn read_range_to_vec_async(&self, start: u64, end: u64) -> BoxFuture<'_, Result<Vec<u8>>> {
        let n = end.saturating_sub(start) as usize;
        async move {
            let mut buf = vec![0; n];
            self.read_range_exact_async(start, &mut buf).await?;
            Ok(buf)
        }
        .boxed()
    }
}

impl<R: AsyncRead + AsyncSeek + Send + Sync + Unpin> AsyncReadRange for TokioMutex<R> {
    fn read_range_async<'a>(
        &'a self,
        start: u64,
        buf: &'a mut [u8],
    ) -> BoxFuture<'a, Result<usize>> {
        async move {
            let mut locked_self = self.lock().await;
            locked_self.seek(std::io::SeekFrom::Start(start)).await?;
            let mut filled = 0;
            while filled < buf.len() {
                match locked_self.read(&mut buf[filled..]).await? {
                    0 => break,
                    n => filled += n,
                }
            }
            Ok(filled)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn mutex_reader_reads_ranges() {
        let reader = TokioMutex::new(Cursor::new((0u8..100).collect::<Vec<_>>()));
        let bytes = reader.read_range_to_vec_async(10, 14).await.unwrap();
        assert_eq!(bytes, vec![10, 11, 12, 13]);
    }

    #[tokio::test]
    async fn short_reads_at_end() {
        let reader = TokioMutex::new(Cursor::new(vec![1u8; 8]));
        let mut buf = [0; 16];
        assert_eq!(reader.read_range_async(4, &mut buf).await.unwrap(), 4);
        let err = reader.read_range_to_vec_async(4, 20).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }
}
