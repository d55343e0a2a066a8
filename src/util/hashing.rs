//! Hashing helpers.
//!
//! Streaming content digests for the content-hash strategy, plus canonical
//! field encodings used to build change-set fingerprints.

use crate::strategy::HashAlgorithm;
use sha2::{Digest, Sha256};
use std::io::Read;

const READ_CHUNK: usize = 8192;

/// Computes the lowercase hex digest of everything `reader` yields.
pub(crate) fn hex_digest<R: Read>(algorithm: HashAlgorithm, reader: R) -> std::io::Result<String> {
    match algorithm {
        HashAlgorithm::Md5 => digest_reader::<md5::Md5, R>(reader),
        HashAlgorithm::Sha1 => digest_reader::<sha1::Sha1, R>(reader),
        HashAlgorithm::Sha256 => digest_reader::<Sha256, R>(reader),
        HashAlgorithm::Blake2s => digest_reader::<blake2::Blake2s256, R>(reader),
    }
}

fn digest_reader<D: Digest, R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0u8; READ_CHUNK];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}

/// Hashes a byte field with an explicit length prefix.
///
/// Length-prefixing avoids delimiter ambiguities (for example embedded `,` or
/// newlines) that can otherwise make distinct data serialize to identical byte
/// streams before hashing.
pub(crate) fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    hasher.update(len.to_be_bytes());
    hasher.update(bytes);
}
