//! Serving files from a directory under a path prefix.
//!
//! In cached mode the directory is read once, at registration: files added or
//! changed afterwards are not seen. In lazy mode each request reads the disk.
//! Either way a missing file is answered with `404` here, not by the server's
//! not-found handler.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{BoxError, ServerError};
use crate::handler::RequestHandler;
use crate::request::Request;
use crate::response::Response;
use crate::utils::ensure;

const CHUNK_SIZE: usize = 16 * 1024;

pub struct StaticFiles {
    base_path: String,
    source: Source,
}

enum Source {
    Cached(HashMap<String, CachedFile>),
    Lazy { root: PathBuf },
}

struct CachedFile {
    content: Bytes,
    content_type: HeaderValue,
}

impl StaticFiles {
    /// `base_path` must start with `/` and `root_dir` must be a directory.
    pub fn new(base_path: &str, root_dir: impl AsRef<Path>, cache: bool) -> Result<Self, ServerError> {
        let root = root_dir.as_ref();
        ensure!(
            base_path.starts_with('/'),
            ServerError::invalid_argument(format!("static base path '{base_path}' must start with '/'"))
        );
        ensure!(root.is_dir(), ServerError::invalid_argument(format!("static root {} is not a directory", root.display())));

        let base_path = base_path.trim_end_matches('/').to_owned();
        let source = if cache {
            Source::Cached(load_files(&base_path, root)?)
        } else {
            Source::Lazy { root: root.to_path_buf() }
        };

        Ok(Self { base_path, source })
    }

    /// The prefix this provider answers for, without a trailing slash.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    fn map_path(&self, root: &Path, url_path: &str) -> Option<PathBuf> {
        let relative = url_path.strip_prefix(&self.base_path)?;
        // `/staticfile.txt` shares the `/static` prefix but is outside it
        if !relative.is_empty() && !relative.starts_with('/') {
            return None;
        }

        let mut path = root.to_path_buf();
        let mut depth = 0;

        for component in Path::new(relative.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                _ => return None,
            }
        }

        (depth > 0).then_some(path)
    }

    async fn serve_from_disk(&self, root: &Path, req: &Request, res: &Response) -> Result<(), BoxError> {
        let Some(path) = self.map_path(root, req.path()) else {
            warn!(path = req.path(), "reject static file path");
            return not_found(res).await;
        };

        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return not_found(res).await,
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return not_found(res).await;
        }

        res.insert_header(CONTENT_TYPE, content_type(&path));
        res.insert_header(CONTENT_LENGTH, HeaderValue::from(metadata.len()));

        loop {
            let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
            if file.read_buf(&mut buf).await? == 0 {
                break;
            }
            res.write(buf.freeze()).await?;
        }

        res.end().await?;
        Ok(())
    }
}

#[async_trait]
impl RequestHandler for StaticFiles {
    async fn invoke(&self, req: Request, res: Response) -> Result<(), BoxError> {
        match &self.source {
            Source::Cached(files) => match files.get(req.path()) {
                Some(file) => {
                    res.insert_header(CONTENT_TYPE, file.content_type.clone());
                    res.send(file.content.clone()).await?;
                    Ok(())
                }
                None => not_found(&res).await,
            },
            Source::Lazy { root } => self.serve_from_disk(root, &req, &res).await,
        }
    }
}

async fn not_found(res: &Response) -> Result<(), BoxError> {
    res.set_status(StatusCode::NOT_FOUND);
    res.end().await?;
    Ok(())
}

fn content_type(path: &Path) -> HeaderValue {
    let mime = mime_guess::from_path(path).first_or(mime::APPLICATION_OCTET_STREAM);
    HeaderValue::from_str(mime.as_ref()).unwrap_or(HeaderValue::from_static("application/octet-stream"))
}

fn load_files(base_path: &str, root: &Path) -> Result<HashMap<String, CachedFile>, ServerError> {
    let mut files = HashMap::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| ServerError::static_files(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");

        let content = std::fs::read(entry.path()).map_err(|e| ServerError::static_files(entry.path(), e))?;
        files.insert(
            format!("{base_path}/{relative}"),
            CachedFile { content: Bytes::from(content), content_type: content_type(entry.path()) },
        );
    }

    info!(base_path, root = %root.display(), files = files.len(), "static files cached");
    Ok(files)
}

impl std::fmt::Debug for StaticFiles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match &self.source {
            Source::Cached(files) => format!("cached({})", files.len()),
            Source::Lazy { root } => format!("lazy({})", root.display()),
        };
        f.debug_struct("StaticFiles").field("base_path", &self.base_path).field("mode", &mode).finish()
    }
}
