use super::{CogError, CogResult, Level};
use crate::io::AsyncReadRange;
use crate::raster::Raster;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::*;

pub type TileCache = HashMap<usize, Raster>;

/// Fetch tiles concurrently and decode them in parallel.
///
/// Failed tiles are logged and left out of the cache. Fails only when every
/// requested tile failed.
pub async fn get_tiles(
    reader: &Arc<dyn AsyncReadRange>,
    level: &Level,
    indices: Vec<usize>,
) -> CogResult<TileCache> {
    let requested = indices.len();
    let mut first_error: Option<CogError> = None;
    let mut note = |e: CogError| {
        warn!("Failed to get tile: {e}");
        if first_error.is_none() {
            first_error = Some(e);
        }
    };

    let mut tile_infos = vec![];
    for index in indices {
        match level.tile_byte_range(index) {
            Ok(range) => tile_infos.push((index, range)),
            Err(e) => note(e),
        }
    }

    // Async tile reading (IO)
    let fetches = tile_infos.into_iter().map(|(index, (start, end))| {
        let reader = reader.clone();
        tokio::spawn(async move {
            reader
                .read_range_to_vec_async(start, end)
                .await
                .map(|bytes| (index, bytes))
        })
    });
    let mut tile_bytes = vec![];
    for result in futures::future::join_all(fetches).await {
        match result {
            Ok(Ok(bytes)) => tile_bytes.push(bytes),
            Ok(Err(e)) => note(e.into()),
            Err(e) => note(e.into()),
        }
    }

    // Parallel tile extraction (decompression)
    let decoded: Vec<_> = tile_bytes
        .into_par_iter()
        .map(|(index, bytes)| level.extract_tile_from_bytes(&bytes).map(|t| (index, t)))
        .collect();

    let mut cache = TileCache::new();
    for result in decoded {
        match result {
            Ok((index, tile)) => {
                cache.insert(index, tile);
            }
            Err(e) => note(e),
        }
    }
    debug!("Decoded {}/{requested} tiles", cache.len());

    match first_error {
        Some(e) if cache.is_empty() && requested > 0 => Err(e),
        _ => Ok(cache),
    }
}

/// First sample of the level pixel at each position, NaN where no tile is available.
pub fn sample_tiles(cache: &TileCache, level: &Level, pixels: &[Option<(u32, u32)>]) -> Vec<f32> {
    pixels
        .iter()
        .map(|pixel| {
            pixel
                .and_then(|(x, y)| level.tile_at_pixel(x, y))
                .and_then(|(index, tx, ty)| cache.get(&index)?.get(0, tx, ty))
                .unwrap_or(f32::NAN)
        })
        .collect()
}
