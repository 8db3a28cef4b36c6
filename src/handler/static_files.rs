//! Static file serving module
//!
//! The innermost handler: maps the request path onto the site directory and
//! writes the file, or a 404 the interceptors can act on.

use super::sink::{set_static_header, ResponseSink};
use super::{request_path, Handler, HandlerFuture};
use crate::http::{self, cache, mime};
use crate::logger;
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use hyper::{Method, Request, StatusCode};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// File loaded from the site directory
#[derive(Debug)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub content: Vec<u8>,
}

impl LoadedFile {
    /// Content type from the extension, sniffed from the content otherwise
    pub fn content_type(&self) -> &'static str {
        mime::content_type_for_extension(self.path.extension().and_then(|e| e.to_str()))
            .unwrap_or_else(|| mime::detect_content_type(&self.content))
    }
}

/// Serves files under a root directory, answering 404 for anything missing
pub struct FileServer {
    root: PathBuf,
    index_files: Vec<String>,
}

impl FileServer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_files: vec!["index.html".to_string(), "index.htm".to_string()],
        }
    }

    #[must_use]
    pub fn index_files(mut self, index_files: Vec<String>) -> Self {
        self.index_files = index_files;
        self
    }

    /// Load a file for a decoded request path, with index file support
    pub async fn load(&self, path: &[u8]) -> Option<LoadedFile> {
        let start = path.iter().position(|&b| b != b'/').unwrap_or(path.len());
        let relative_path = &path[start..];
        let mut file_path = self.root.join(path_from_bytes(relative_path)?);

        // Security: the resolved file must stay within the root
        let root_canonical = match fs::canonicalize(&self.root).await {
            Ok(p) => p,
            Err(e) => {
                logger::log_warning(&format!(
                    "Site directory not found or inaccessible '{}': {e}",
                    self.root.display()
                ));
                return None;
            }
        };

        if relative_path.is_empty() || relative_path.ends_with(b"/") || is_dir(&file_path).await {
            let mut found = None;
            for index_file in &self.index_files {
                let index_path = file_path.join(index_file);
                if is_file(&index_path).await {
                    found = Some(index_path);
                    break;
                }
            }
            file_path = found?;
        }

        // File not found is common (404), no need to log at warning level
        let Ok(file_canonical) = fs::canonicalize(&file_path).await else {
            return None;
        };
        if !file_canonical.starts_with(&root_canonical) {
            logger::log_warning(&format!(
                "Path traversal attempt blocked: {} -> {}",
                String::from_utf8_lossy(path),
                file_canonical.display()
            ));
            return None;
        }
        if !is_file(&file_canonical).await {
            return None;
        }

        match fs::read(&file_canonical).await {
            Ok(content) => Some(LoadedFile {
                path: file_canonical,
                content,
            }),
            Err(e) => {
                logger::log_error(&format!(
                    "Failed to read file '{}': {e}",
                    file_canonical.display()
                ));
                None
            }
        }
    }
}

impl Handler for FileServer {
    fn serve<'a>(
        &'a self,
        req: &'a Request<()>,
        sink: &'a mut dyn ResponseSink,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let path = request_path(req);
            match self.load(&path).await {
                Some(file) => write_file(req, sink, &file),
                None => http::write_not_found(sink),
            }
        })
    }
}

/// Write a loaded file with `ETag` validation
fn write_file(req: &Request<()>, sink: &mut dyn ResponseSink, file: &LoadedFile) -> io::Result<()> {
    let etag = cache::generate_etag(&file.content);
    let if_none_match = req
        .headers()
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());

    if let Ok(value) = HeaderValue::from_str(&etag) {
        sink.headers_mut().insert(ETAG, value);
    }
    set_static_header(sink, CACHE_CONTROL, cache::ASSET_CACHE_CONTROL);

    if cache::check_etag_match(if_none_match, &etag) {
        sink.write_status(StatusCode::NOT_MODIFIED);
        return Ok(());
    }

    headers_for_body(sink, file);
    sink.write_status(StatusCode::OK);

    if req.method() == Method::HEAD {
        return Ok(());
    }
    sink.write_all(&file.content)
}

fn headers_for_body(sink: &mut dyn ResponseSink, file: &LoadedFile) {
    let headers = sink.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(file.content_type()));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(file.content.len()));
}

/// File names are bytes on unix, so any decoded path can name a file
#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStrExt;
    Some(PathBuf::from(std::ffi::OsStr::from_bytes(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> Option<PathBuf> {
    std::str::from_utf8(bytes).ok().map(PathBuf::from)
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_file())
}
