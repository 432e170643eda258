use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

pub fn calculate_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Streams the whole reader through SHA-256 using a buffer of `buffer_size`
/// bytes. Returns the raw digest and the number of bytes consumed.
pub async fn hash_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    buffer_size: usize,
) -> std::io::Result<([u8; 32], u64)> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        total += n as u64;
    }
    Ok((hasher.finalize().into(), total))
}
