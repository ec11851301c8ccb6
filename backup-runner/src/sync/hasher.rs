//! Content fingerprints for change detection.
//!
//! The remote side publishes MD5 hex digests, so local files are hashed the
//! same way. The digest only answers "did this file change"; it is not used
//! for integrity or security decisions.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer size. Memory use is bounded by this regardless of file size.
const BUFFER_SIZE: usize = 64 * 1024;

/// Hash a file by streaming it through MD5.
///
/// # Returns
/// * `Ok(String)` - Lowercase hex digest
/// * `Err(io::Error)` - If the file cannot be opened or a read fails midway.
///   No partial digest is ever returned.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    hash_reader(file)
}

/// Hash everything a reader yields.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash an in-memory buffer.
pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}
