//! Git blob hashing
//!
//! `sha1("blob " + len + "\0" + content)`, byte-identical to `git hash-object`.

use sha1::{Digest, Sha1};

/// Compute the git blob id of `content` as 40 lowercase hex characters
pub fn blob_hash(content: &[u8]) -> String {
    let header = format!("blob {}\0", content.len());
    let mut hasher = Sha1::new();
    hasher.update(header.as_bytes());
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
