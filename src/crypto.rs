use sha3::{Digest, Sha3_256};

pub type Hash256 = [u8; 32];

/// leading bytes of a digest, kept where a full hex digest does not fit
pub const DIGEST_TAG_SZ: usize = 8;
pub type DigestTag = [u8; DIGEST_TAG_SZ];

pub const DIGEST_HEX_LEN: usize = 2 * core::mem::size_of::<Hash256>();

pub fn sha3_256_any(input: &[u8]) -> Hash256 {
    let mut hasher = Sha3_256::new();

    hasher.update(input);

    hasher.finalize().into()
}

/// lowercase hex of the passphrase digest, as stored in the superblock
pub fn digest_hex(pass: &str) -> String {
    hex::encode(sha3_256_any(pass.as_bytes()))
}

pub fn digest_tag(pass: &str) -> DigestTag {
    let hash = sha3_256_any(pass.as_bytes());
    let mut tag = [0u8; DIGEST_TAG_SZ];
    tag.copy_from_slice(&hash[..DIGEST_TAG_SZ]);
    tag
}
