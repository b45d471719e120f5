//! Data-block checksum computation and verification.
//!
//! XISF checksums are plain cryptographic digests over a block's stored
//! bytes, carried in a `checksum` attribute of the form
//! `<algorithm>:<hex digest>`. SHA-1, SHA-256 and SHA-512 are implemented;
//! the SHA-3 names are part of the format's enumeration and parse cleanly,
//! but computing them surfaces [`Error::UnsupportedAlgorithm`].

use std::fmt;
use std::str::FromStr;

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Error, Result};
use crate::options::CancelToken;

/// Bytes hashed between cancellation checks.
const DIGEST_CHUNK: usize = 800 * 1024;

/// A hash function named by the `checksum` attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha1,
    Sha256,
    Sha512,
    /// Recognized but not computable.
    Sha3_256,
    /// Recognized but not computable.
    Sha3_512,
}

impl ChecksumAlgorithm {
    /// Canonical attribute spelling.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha-1",
            Self::Sha256 => "sha-256",
            Self::Sha512 => "sha-512",
            Self::Sha3_256 => "sha3-256",
            Self::Sha3_512 => "sha3-512",
        }
    }

    /// Digest length in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 | Self::Sha3_256 => 32,
            Self::Sha512 | Self::Sha3_512 => 64,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // The dashless spellings circulate in older writers.
        match s {
            "sha-1" | "sha1" => Ok(Self::Sha1),
            "sha-256" | "sha256" => Ok(Self::Sha256),
            "sha-512" | "sha512" => Ok(Self::Sha512),
            "sha3-256" => Ok(Self::Sha3_256),
            "sha3-512" => Ok(Self::Sha3_512),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// An algorithm/digest pair attached to a data block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub digest: Vec<u8>,
}

impl Checksum {
    /// Compute the checksum of `data` under `algorithm`.
    pub fn compute(data: &[u8], algorithm: ChecksumAlgorithm, cancel: &CancelToken) -> Result<Self> {
        Ok(Self {
            algorithm,
            digest: digest(data, algorithm, cancel)?,
        })
    }

    /// Serialize to the attribute wire form, digest in lowercase hex.
    pub fn to_attr(&self) -> String {
        format!("{}:{}", self.algorithm, hex::encode(&self.digest))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_attr())
    }
}

impl FromStr for Checksum {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, hex_digest) = s
            .split_once(':')
            .ok_or_else(|| Error::MalformedXml(format!("checksum attribute '{s}' lacks ':'")))?;
        let algorithm: ChecksumAlgorithm = name.parse()?;
        let digest = hex::decode(hex_digest)
            .map_err(|e| Error::MalformedXml(format!("checksum digest is not hex: {e}")))?;
        if digest.len() != algorithm.digest_len() {
            return Err(Error::MalformedXml(format!(
                "{name} digest must be {} bytes, found {}",
                algorithm.digest_len(),
                digest.len()
            )));
        }
        Ok(Self { algorithm, digest })
    }
}

/// Digest `data` under `algorithm`, checking `cancel` every ~800 KiB.
pub fn digest(data: &[u8], algorithm: ChecksumAlgorithm, cancel: &CancelToken) -> Result<Vec<u8>> {
    match algorithm {
        ChecksumAlgorithm::Sha1 => digest_chunked::<Sha1>(data, cancel),
        ChecksumAlgorithm::Sha256 => digest_chunked::<Sha256>(data, cancel),
        ChecksumAlgorithm::Sha512 => digest_chunked::<Sha512>(data, cancel),
        ChecksumAlgorithm::Sha3_256 | ChecksumAlgorithm::Sha3_512 => Err(
            Error::UnsupportedAlgorithm(algorithm.wire_name().to_string()),
        ),
    }
}

fn digest_chunked<D: Digest>(data: &[u8], cancel: &CancelToken) -> Result<Vec<u8>> {
    let mut hasher = D::new();
    for chunk in data.chunks(DIGEST_CHUNK.max(1)) {
        cancel.check()?;
        hasher.update(chunk);
    }
    Ok(hasher.finalize().to_vec())
}

/// Check `data` against `expected`, failing with [`Error::ChecksumMismatch`].
pub fn verify(data: &[u8], expected: &Checksum, cancel: &CancelToken) -> Result<()> {
    let actual = digest(data, expected.algorithm, cancel)?;
    if actual == expected.digest {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            expected: hex::encode(&expected.digest),
            actual: hex::encode(&actual),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancelToken {
        CancelToken::new()
    }

    #[test]
    fn sha1_abc_vector() {
        let d = digest(b"abc", ChecksumAlgorithm::Sha1, &token()).unwrap();
        assert_eq!(hex::encode(d), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn sha256_abc_vector() {
        let d = digest(b"abc", ChecksumAlgorithm::Sha256, &token()).unwrap();
        assert_eq!(
            hex::encode(d),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha512_abc_vector() {
        let d = digest(b"abc", ChecksumAlgorithm::Sha512, &token()).unwrap();
        assert_eq!(
            hex::encode(d),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn sha256_empty_input() {
        let d = digest(b"", ChecksumAlgorithm::Sha256, &token()).unwrap();
        assert_eq!(
            hex::encode(d),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_is_deterministic() {
        let data = vec![0x5Au8; 3 * 1024 * 1024];
        let a = digest(&data, ChecksumAlgorithm::Sha512, &token()).unwrap();
        let b = digest(&data, ChecksumAlgorithm::Sha512, &token()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sha3_names_parse_but_do_not_compute() {
        let algo: ChecksumAlgorithm = "sha3-256".parse().unwrap();
        assert_eq!(algo, ChecksumAlgorithm::Sha3_256);
        assert!(matches!(
            digest(b"abc", algo, &token()),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn attr_roundtrip() {
        let sum = Checksum::compute(b"abc", ChecksumAlgorithm::Sha1, &token()).unwrap();
        let attr = sum.to_attr();
        assert!(attr.starts_with("sha-1:"));
        let parsed: Checksum = attr.parse().unwrap();
        assert_eq!(parsed, sum);
    }

    #[test]
    fn attr_parse_accepts_uppercase_hex_and_legacy_names() {
        let parsed: Checksum = "sha1:A9993E364706816ABA3E25717850C26C9CD0D89D"
            .parse()
            .unwrap();
        assert_eq!(parsed.algorithm, ChecksumAlgorithm::Sha1);
        assert_eq!(
            hex::encode(&parsed.digest),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn attr_parse_rejects_wrong_digest_length() {
        assert!(matches!(
            "sha-256:a9993e".parse::<Checksum>(),
            Err(Error::MalformedXml(_))
        ));
    }

    #[test]
    fn verify_detects_corruption() {
        let sum = Checksum::compute(b"payload", ChecksumAlgorithm::Sha256, &token()).unwrap();
        verify(b"payload", &sum, &token()).unwrap();
        assert!(matches!(
            verify(b"payloae", &sum, &token()),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn cancelled_token_aborts() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            digest(b"abc", ChecksumAlgorithm::Sha256, &cancel),
            Err(Error::Cancelled)
        ));
    }
}
