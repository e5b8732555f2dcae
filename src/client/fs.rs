//! Text file access served to the agent.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use super::handlers::ClientFuture;
use super::path_safety::resolve_in_root;
use crate::protocol::client::{ReadTextFileRequest, ReadTextFileResponse, WriteTextFileRequest};
use crate::protocol::Empty;
use crate::{AppError, Result};

/// Backs `fs/readTextFile` and `fs/writeTextFile`.
pub trait FileSystemRuntime: Send + Sync {
    /// Read a text file, optionally sliced by line.
    fn read_text_file(&self, request: ReadTextFileRequest) -> ClientFuture<'_, ReadTextFileResponse>;

    /// Replace a text file's content, creating it if needed.
    fn write_text_file(&self, request: WriteTextFileRequest) -> ClientFuture<'_, Empty>;
}

/// Keep `limit` lines starting at 1-based `line`, line endings intact.
///
/// # Errors
///
/// Returns [`AppError::InvalidParams`] for `line == 0`.
pub fn slice_lines(content: &str, line: Option<u32>, limit: Option<u32>) -> Result<String> {
    if line.is_none() && limit.is_none() {
        return Ok(content.to_owned());
    }
    let skip = match line {
        Some(0) => return Err(AppError::InvalidParams("line is 1-based".into())),
        Some(n) => usize::try_from(n - 1).unwrap_or(usize::MAX),
        None => 0,
    };
    let take = limit.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
    Ok(content.split_inclusive('\n').skip(skip).take(take).collect())
}

/// Local disk access confined to a workspace root.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    /// Serve files under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn write_atomic(target: &Path, content: &str) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| AppError::PathViolation("file path has no parent directory".into()))?;
    std::fs::create_dir_all(parent)
        .map_err(|err| AppError::Io(format!("failed to create {}: {err}", parent.display())))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
    tmp.write_all(content.as_bytes())
        .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;
    tmp.persist(target)
        .map_err(|err| AppError::Io(format!("failed to persist {}: {err}", target.display())))?;
    Ok(())
}

impl FileSystemRuntime for LocalFileSystem {
    fn read_text_file(&self, request: ReadTextFileRequest) -> ClientFuture<'_, ReadTextFileResponse> {
        Box::pin(async move {
            let path = resolve_in_root(&self.root, &request.path)?;
            let content = tokio::fs::read_to_string(&path).await.map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    AppError::NotFound(format!("no such file: {}", request.path))
                } else {
                    AppError::Io(format!("failed to read {}: {err}", path.display()))
                }
            })?;
            debug!(path = %path.display(), bytes = content.len(), "file read");
            Ok(ReadTextFileResponse {
                content: slice_lines(&content, request.line, request.limit)?,
            })
        })
    }

    fn write_text_file(&self, request: WriteTextFileRequest) -> ClientFuture<'_, Empty> {
        Box::pin(async move {
            let path = resolve_in_root(&self.root, &request.path)?;
            let bytes = request.content.len();
            let target = path.clone();
            tokio::task::spawn_blocking(move || write_atomic(&target, &request.content))
                .await
                .map_err(|err| AppError::Io(format!("write task failed: {err}")))??;
            debug!(path = %path.display(), bytes, "file written");
            Ok(Empty {})
        })
    }
}

/// Stand-in for platforms or embeddings without file access.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedFileSystem;

impl FileSystemRuntime for UnsupportedFileSystem {
    fn read_text_file(&self, _request: ReadTextFileRequest) -> ClientFuture<'_, ReadTextFileResponse> {
        Box::pin(async { Err(AppError::Unsupported("file reads are not available".into())) })
    }

    fn write_text_file(&self, _request: WriteTextFileRequest) -> ClientFuture<'_, Empty> {
        Box::pin(async { Err(AppError::Unsupported("file writes are not available".into())) })
    }
}
