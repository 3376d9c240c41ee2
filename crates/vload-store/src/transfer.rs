//! Whole-file chunked transfers over a [`StoreFile`].

use std::io;

use crate::{Progress, Result, StoreError, StoreFile};

/// Chunk size used when the caller has no configured value.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Read an entire file, one chunk at a time, until a zero-length read.
///
/// The returned buffer holds exactly the bytes read. `expected` only reserves
/// capacity up front. `progress` is called once per non-empty chunk.
pub async fn read_all<F: StoreFile>(
    file: &mut F,
    chunk_size: usize,
    expected: usize,
    progress: Progress<'_>,
) -> Result<Vec<u8>> {
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut data = Vec::with_capacity(expected);
    let mut offset = 0u64;

    loop {
        let n = file.read_at(offset, &mut chunk).await?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
        offset += n as u64;
        progress(n);
    }

    Ok(data)
}

/// Replace the contents of a file with `bytes`.
///
/// Truncates to zero first, then writes successive chunks from offset 0 and
/// flushes. `progress` is called once per chunk accepted by the store.
pub async fn write_all<F: StoreFile>(
    file: &mut F,
    bytes: &[u8],
    chunk_size: usize,
    progress: Progress<'_>,
) -> Result<()> {
    let chunk_size = chunk_size.max(1);
    file.set_length(0).await?;

    let mut offset = 0usize;
    while offset < bytes.len() {
        let end = (offset + chunk_size).min(bytes.len());
        let n = file.write_at(offset as u64, &bytes[offset..end]).await?;
        if n == 0 {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "store accepted no bytes",
            )));
        }
        offset += n;
        progress(n);
    }

    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LocalStore, MemoryStore};

    #[tokio::test]
    async fn test_read_all_chunks_and_sizes_exactly() {
        let store = MemoryStore::new().with_file("a.dat", vec![7u8; 10_000]);
        store.open(1 << 20).await.unwrap();
        let mut file = store.open_file("a.dat").await.unwrap();

        let mut chunks = Vec::new();
        let data = read_all(&mut file, 4096, 0, &mut |n| chunks.push(n))
            .await
            .unwrap();

        assert_eq!(data.len(), 10_000);
        assert_eq!(chunks, vec![4096, 4096, 1808]);
    }

    #[tokio::test]
    async fn test_read_all_empty_file_reports_nothing() {
        let store = MemoryStore::new();
        store.open(1 << 20).await.unwrap();
        let mut file = store.open_file("empty.dat").await.unwrap();

        let mut calls = 0;
        let data = read_all(&mut file, 4096, 64, &mut |_| calls += 1)
            .await
            .unwrap();

        assert!(data.is_empty());
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_write_all_truncates_previous_contents() {
        let store = MemoryStore::new().with_file("save.sav", b"a much longer old body".to_vec());
        store.open(1 << 20).await.unwrap();
        let mut file = store.open_file("save.sav").await.unwrap();

        let mut total = 0;
        write_all(&mut file, b"new", 2, &mut |n| total += n)
            .await
            .unwrap();

        assert_eq!(total, 3);
        assert_eq!(store.contents("save.sav").unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_write_all_empty_buffer_truncates() {
        let store = MemoryStore::new().with_file("x", b"old".to_vec());
        store.open(1 << 20).await.unwrap();
        let mut file = store.open_file("x").await.unwrap();

        write_all(&mut file, b"", 4096, &mut |_| {}).await.unwrap();
        assert_eq!(store.contents("x").unwrap(), b"");
    }
}
