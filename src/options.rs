//! Option records for the read and write entry points, plus the cooperative
//! cancellation token they carry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::checksum::ChecksumAlgorithm;
use crate::compression::CompressionCodec;
use crate::error::{Error, Result};
use crate::stream::{default_file_provider, default_uri_provider, FileStreamProvider, UriStreamProvider};

// ── CancelToken ───────────────────────────────────────────────────────────────

/// Cooperative cancellation signal.
///
/// Clones share one flag. Long-running stages (chunked digesting, per-block
/// compression, block I/O) check the token at each chunk boundary and abandon
/// the operation with [`Error::Cancelled`] once it is set. A cancelled write
/// leaves the target in an unspecified state; callers must treat it as corrupt.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Irrevocable for this token and all its clones.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ── ReaderOptions ─────────────────────────────────────────────────────────────

/// Configuration for [`read_unit`](crate::read_unit) and friends.
#[derive(Clone)]
pub struct ReaderOptions {
    /// Verify data-block checksums while materializing payloads.
    pub validate_checksums: bool,
    /// Materialize thumbnail pixel blocks alongside image pixels.
    pub load_thumbnails: bool,
    /// Resolve `url(...)`/`path(...)` blocks of distributed units through the
    /// stream providers. When off, external blocks stay unresolved references.
    pub load_external_references: bool,
    /// Opens local files for `path(...)` references and `.xisb` carriers.
    pub file_provider: Arc<dyn FileStreamProvider>,
    /// Opens remote resources for `url(...)` references.
    pub uri_provider: Arc<dyn UriStreamProvider>,
    pub cancel: CancelToken,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            validate_checksums: true,
            load_thumbnails: true,
            load_external_references: false,
            file_provider: default_file_provider(),
            uri_provider: default_uri_provider(),
            cancel: CancelToken::new(),
        }
    }
}

// ── WriterOptions ─────────────────────────────────────────────────────────────

/// Configuration for [`write_unit`](crate::write_unit) and friends.
#[derive(Clone)]
pub struct WriterOptions {
    /// Codec applied to every pixel block that does not already carry its own
    /// compression settings. `None` stores payloads verbatim.
    pub default_compression: Option<CompressionCodec>,
    /// Stamp a checksum attribute on every written data block.
    pub calculate_checksums: bool,
    /// Algorithm used when `calculate_checksums` is set.
    pub checksum_algorithm: ChecksumAlgorithm,
    /// Indent the emitted XML header with two spaces per level.
    pub pretty_print_xml: bool,
    pub cancel: CancelToken,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            default_compression: None,
            calculate_checksums: false,
            checksum_algorithm: ChecksumAlgorithm::Sha256,
            pretty_print_xml: true,
            cancel: CancelToken::new(),
        }
    }
}
