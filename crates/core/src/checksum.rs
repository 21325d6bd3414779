use crate::constants::CHECKSUM_BUFFER_SIZE;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Streams a file through SHA-256 and returns the lowercase hex digest.
///
/// The file is read in fixed-size chunks so arbitrarily large videos never
/// land in memory at once. Empty files yield the SHA-256 of empty input.
pub fn checksum_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open for checksum: {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHECKSUM_BUFFER_SIZE];

    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("failed to read for checksum: {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
