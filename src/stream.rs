//! Stream providers: how the engine obtains carriers for paths and URIs.
//!
//! Path and URI resolution is external to the format engine. The engine only
//! consumes these two traits; the defaults cover the local filesystem plus
//! `file://` and (with the `remote-http` feature) `http(s)://` resources.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

/// Object-safe `Read + Seek` bundle for boxed carriers.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Opens seekable carriers for filesystem paths (`path(...)` references,
/// `.xisb` blocks files).
pub trait FileStreamProvider: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>>;
}

/// Opens sequential streams for remote resources (`url(...)` references).
pub trait UriStreamProvider: Send + Sync {
    fn open(&self, url: &Url) -> io::Result<Box<dyn Read>>;
}

/// Default [`FileStreamProvider`]: buffered local files.
#[derive(Debug, Default)]
pub struct LocalFileProvider;

impl FileStreamProvider for LocalFileProvider {
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

/// Default [`UriStreamProvider`]: `file://` always, `http(s)://` when built
/// with the `remote-http` feature.
#[derive(Debug, Default)]
pub struct DefaultUriProvider;

impl UriStreamProvider for DefaultUriProvider {
    fn open(&self, url: &Url) -> io::Result<Box<dyn Read>> {
        match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| io::Error::new(io::ErrorKind::InvalidInput, "non-local file URL"))?;
                Ok(Box::new(BufReader::new(File::open(path)?)))
            }
            #[cfg(feature = "remote-http")]
            "http" | "https" => {
                let response = ureq::get(url.as_str()).call().map_err(io::Error::other)?;
                Ok(Box::new(response.into_reader()))
            }
            other => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("no stream provider for URI scheme '{other}'"),
            )),
        }
    }
}

pub(crate) fn default_file_provider() -> Arc<dyn FileStreamProvider> {
    Arc::new(LocalFileProvider)
}

pub(crate) fn default_uri_provider() -> Arc<dyn UriStreamProvider> {
    Arc::new(DefaultUriProvider)
}

/// Resolve a `path(...)` reference against the unit header's directory.
///
/// The `@header_dir/` prefix anchors a relative path at the directory of the
/// `.xish` header file; anything else passes through untouched.
pub(crate) fn resolve_header_relative(path: &str, header_dir: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("@header_dir/"), header_dir) {
        (Some(rest), Some(dir)) => dir.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn local_provider_reads_files() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"carrier bytes").unwrap();

        let provider = LocalFileProvider;
        let mut stream = provider.open(tmp.path()).unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"carrier bytes");
    }

    #[test]
    fn uri_provider_rejects_unknown_schemes() {
        let provider = DefaultUriProvider;
        let url = Url::parse("gopher://example.org/blocks.xisb").unwrap();
        let err = match provider.open(&url) {
            Ok(_) => panic!("expected error"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn header_dir_prefix_resolves() {
        let dir = Path::new("/data/session");
        assert_eq!(
            resolve_header_relative("@header_dir/pixels.xisb", Some(dir)),
            PathBuf::from("/data/session/pixels.xisb")
        );
        assert_eq!(
            resolve_header_relative("/absolute/pixels.xisb", Some(dir)),
            PathBuf::from("/absolute/pixels.xisb")
        );
        assert_eq!(
            resolve_header_relative("@header_dir/pixels.xisb", None),
            PathBuf::from("@header_dir/pixels.xisb")
        );
    }
}
