use std::sync::Arc;

use bstr::ByteSlice;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::instrument;

use coral_store::cachestore::CacheStore;
use coral_store::storagerpc::StorageRpc;
use coral_store::{chunk_key, Error};

use crate::edge_cache;

/// Walks the chunk tree below a manifest and writes the assembled body
/// to `writer` one chunk at a time, without buffering the whole object.
///
/// Ephemeral: one streamer serves exactly one response. Any writer or
/// storage error aborts the whole stream.
pub struct LargeReadStreamer<W> {
    storage: Arc<dyn StorageRpc>,
    cache: Arc<dyn CacheStore>,
    parent_key: Bytes,
    total_chunks: u64,
    writer: W,
}

/// One level of the walk: children `next..=total` of `key` are still
/// unvisited.
struct Frame {
    key: Bytes,
    total: u64,
    next: u64,
}

impl<W: AsyncWrite + Unpin> LargeReadStreamer<W> {
    pub fn new(
        storage: Arc<dyn StorageRpc>,
        cache: Arc<dyn CacheStore>,
        parent_key: Bytes,
        total_chunks: u64,
        writer: W,
    ) -> Self {
        Self {
            storage,
            cache,
            parent_key,
            total_chunks,
            writer,
        }
    }

    /// Streams the whole object in pre-order of the chunk tree.
    ///
    /// Chunk bodies come from the cache when present there, from
    /// storage otherwise. A child that is itself a manifest is walked
    /// in place; the traversal keeps an explicit stack so nesting depth
    /// doesn't grow the call stack.
    #[instrument(skip(self), fields(object.key=%self.parent_key.as_bstr()), err)]
    pub async fn stream_all(mut self) -> Result<(), Error> {
        let mut stack = vec![Frame {
            key: self.parent_key.clone(),
            total: self.total_chunks,
            next: 1,
        }];

        while let Some(frame) = stack.last_mut() {
            if frame.next > frame.total {
                stack.pop();
                continue;
            }

            let ck = chunk_key(&frame.key, frame.next);
            frame.next += 1;

            if let Some(entry) = edge_cache::get_quiet(&*self.cache, &ck).await {
                if !entry.is_on_disk() {
                    self.writer.write_all(&entry.body).await?;
                    continue;
                }
            }

            let (meta, body) = self.storage.get(&ck).await?;
            if meta.cnumber > 0 {
                stack.push(Frame {
                    key: ck,
                    total: meta.cnumber,
                    next: 1,
                });
            } else {
                self.writer.write_all(&body).await?;
            }
        }

        self.writer.flush().await?;
        Ok(())
    }

    /// Streams the inclusive byte range `start..=end` of the assembled
    /// object.
    ///
    /// The walk tracks the logical position and decides every leaf's
    /// contribution by comparing its window to the requested range:
    /// skipped entirely (no body fetch), emitted whole, or fetched as a
    /// partial range. It stops as soon as the range is exhausted.
    #[instrument(
        skip(self),
        fields(object.key=%self.parent_key.as_bstr(), range.start=start, range.end=end),
        err
    )]
    pub async fn stream_range(mut self, start: u64, end: u64) -> Result<(), Error> {
        let mut stack = vec![Frame {
            key: self.parent_key.clone(),
            total: self.total_chunks,
            next: 1,
        }];
        let mut cur: u64 = 0;

        while let Some(frame) = stack.last_mut() {
            if cur > end {
                break;
            }
            if frame.next > frame.total {
                stack.pop();
                continue;
            }

            let ck = chunk_key(&frame.key, frame.next);
            frame.next += 1;

            let meta = self.storage.head(&ck).await?;
            if meta.cnumber > 0 {
                stack.push(Frame {
                    key: ck,
                    total: meta.cnumber,
                    next: 1,
                });
                continue;
            }

            let size = meta.dsize;
            if size == 0 {
                continue;
            }
            let chunk_end = cur + size - 1;

            if chunk_end < start {
                // entirely before the range
            } else if cur >= start && chunk_end <= end {
                let (_, body) = self.storage.get(&ck).await?;
                self.writer.write_all(&body).await?;
            } else {
                let from = start.saturating_sub(cur);
                let to = std::cmp::min(size - 1, end - cur);
                let (_, body) = self.storage.get_range(&ck, from, to).await?;
                self.writer.write_all(&body).await?;
            }

            cur += size;
        }

        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use bytes::Bytes;
    use rstest::rstest;

    use coral_store::cachestore::{CacheStore, MemoryCacheStore};
    use coral_store::proto::CachedEntry;
    use coral_store::storagerpc::{MemoryStorage, StorageRpc};
    use coral_store::{chunk_key, md5, unix_now};

    use super::LargeReadStreamer;

    /// Stores `chunks` below `parent` along with the manifest.
    async fn seed_chunked(storage: &MemoryStorage, parent: &[u8], chunks: &[&[u8]]) {
        let mut assembled = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let ck = chunk_key(parent, i as u64 + 1);
            storage
                .put(
                    &ck,
                    Bytes::copy_from_slice(chunk),
                    chunk.len() as u64,
                    i as u64 + 1,
                )
                .await
                .expect("chunk put must succeed");
            assembled.extend_from_slice(chunk);
        }
        storage
            .put_manifest(
                parent,
                assembled.len() as u64,
                chunks.iter().map(|c| c.len()).max().unwrap_or(0) as u64,
                chunks.len() as u64,
                &md5(&assembled),
            )
            .await
            .expect("manifest put must succeed");
    }

    fn streamer(
        storage: &MemoryStorage,
        cache: &MemoryCacheStore,
        parent: &[u8],
        total: u64,
    ) -> LargeReadStreamer<Cursor<Vec<u8>>> {
        LargeReadStreamer::new(
            Arc::new(storage.clone()),
            Arc::new(cache.clone()),
            Bytes::copy_from_slice(parent),
            total,
            Cursor::new(Vec::new()),
        )
    }

    #[tokio::test]
    async fn streams_all_chunks_in_order() {
        let storage = MemoryStorage::default();
        let cache = MemoryCacheStore::default();
        seed_chunked(&storage, b"a/b", &[b"first-", b"second-", b"third"]).await;

        let mut out = Cursor::new(Vec::new());
        LargeReadStreamer::new(
            Arc::new(storage),
            Arc::new(cache),
            Bytes::from_static(b"a/b"),
            3,
            &mut out,
        )
        .stream_all()
        .await
        .expect("stream must succeed");

        assert_eq!(b"first-second-third"[..], out.into_inner()[..]);
    }

    #[tokio::test]
    async fn prefers_cached_chunk_bodies() {
        let storage = MemoryStorage::default();
        let cache = MemoryCacheStore::default();
        seed_chunked(&storage, b"a/b", &[b"AAA", b"BBB"]).await;

        // cache chunk 2 with a marker body to prove it is read from
        // the cache, not storage
        let ck = chunk_key(b"a/b", 2);
        cache
            .put(
                &ck,
                CachedEntry {
                    mtime: unix_now(),
                    etag: md5(b"XXX").into(),
                    content_type: "application/octet-stream".to_string(),
                    body: Bytes::from_static(b"XXX"),
                    size: 3,
                    file_path: "".to_string(),
                },
            )
            .await
            .expect("cache put must succeed");

        let mut out = Cursor::new(Vec::new());
        LargeReadStreamer::new(
            Arc::new(storage),
            Arc::new(cache),
            Bytes::from_static(b"a/b"),
            2,
            &mut out,
        )
        .stream_all()
        .await
        .expect("stream must succeed");

        assert_eq!(b"AAAXXX"[..], out.into_inner()[..]);
    }

    #[tokio::test]
    async fn walks_grand_children() {
        let storage = MemoryStorage::default();
        let cache = MemoryCacheStore::default();

        // child 2 is itself a manifest with two leaves
        let inner = chunk_key(b"a/b", 2);
        seed_chunked(&storage, &inner, &[b"cc", b"dd"]).await;

        let ck1 = chunk_key(b"a/b", 1);
        storage
            .put(&ck1, Bytes::from_static(b"bb"), 2, 1)
            .await
            .expect("chunk put must succeed");
        storage
            .put_manifest(b"a/b", 6, 2, 2, &md5(b"bbccdd"))
            .await
            .expect("manifest put must succeed");

        let mut out = Cursor::new(Vec::new());
        LargeReadStreamer::new(
            Arc::new(storage.clone()),
            Arc::new(cache.clone()),
            Bytes::from_static(b"a/b"),
            2,
            &mut out,
        )
        .stream_all()
        .await
        .expect("stream must succeed");
        assert_eq!(b"bbccdd"[..], out.into_inner()[..]);

        // a range crossing the nested manifest
        let mut out = Cursor::new(Vec::new());
        LargeReadStreamer::new(
            Arc::new(storage),
            Arc::new(cache),
            Bytes::from_static(b"a/b"),
            2,
            &mut out,
        )
        .stream_range(1, 4)
        .await
        .expect("stream must succeed");
        assert_eq!(b"bccd"[..], out.into_inner()[..]);
    }

    #[tokio::test]
    async fn missing_chunk_aborts() {
        let storage = MemoryStorage::default();
        let cache = MemoryCacheStore::default();
        // manifest claims three children, only one exists
        let ck1 = chunk_key(b"a/b", 1);
        storage
            .put(&ck1, Bytes::from_static(b"xx"), 2, 1)
            .await
            .expect("chunk put must succeed");
        storage
            .put_manifest(b"a/b", 6, 2, 3, &md5(b"xxyyzz"))
            .await
            .expect("manifest put must succeed");

        let res = streamer(&storage, &cache, b"a/b", 3).stream_all().await;
        assert!(res.is_err());
    }

    /// The concatenated emitted bytes equal the requested slice of the
    /// assembled object, for ranges aligned and unaligned with chunk
    /// boundaries.
    #[rstest]
    #[case::within_first_chunk(0, 2)]
    #[case::chunk_aligned(4, 7)]
    #[case::crossing_boundary(3, 9)]
    #[case::single_byte(5, 5)]
    #[case::full(0, 11)]
    #[case::tail(9, 11)]
    #[tokio::test]
    async fn range_equals_slice(#[case] start: u64, #[case] end: u64) {
        let storage = MemoryStorage::default();
        let cache = MemoryCacheStore::default();
        let assembled = b"0123456789ab";
        seed_chunked(&storage, b"a/b", &[b"0123", b"4567", b"89ab"]).await;

        let mut out = Cursor::new(Vec::new());
        LargeReadStreamer::new(
            Arc::new(storage),
            Arc::new(cache),
            Bytes::from_static(b"a/b"),
            3,
            &mut out,
        )
        .stream_range(start, end)
        .await
        .expect("stream must succeed");

        assert_eq!(
            assembled[start as usize..=end as usize],
            out.into_inner()[..]
        );
    }

    /// Chunks entirely before the range are skipped without a body
    /// fetch; the position math still lines up.
    #[tokio::test]
    async fn skips_leading_chunks() {
        let storage = MemoryStorage::default();
        let cache = MemoryCacheStore::default();
        seed_chunked(&storage, b"a/b", &[b"aaaa", b"bbbb", b"cccc"]).await;

        let mut out = Cursor::new(Vec::new());
        LargeReadStreamer::new(
            Arc::new(storage),
            Arc::new(cache),
            Bytes::from_static(b"a/b"),
            3,
            &mut out,
        )
        .stream_range(9, 11)
        .await
        .expect("stream must succeed");

        assert_eq!(b"ccc"[..], out.into_inner()[..]);
    }
}
