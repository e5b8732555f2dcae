//! Integration tests for the local file system runtime.

use acp_engine::client::{FileSystemRuntime, LocalFileSystem, UnsupportedFileSystem};
use acp_engine::protocol::client::{ReadTextFileRequest, WriteTextFileRequest};
use acp_engine::AppError;

fn read(path: &str, line: Option<u32>, limit: Option<u32>) -> ReadTextFileRequest {
    ReadTextFileRequest {
        session_id: "sess_1".into(),
        path: path.into(),
        line,
        limit,
    }
}

fn write(path: &str, content: &str) -> WriteTextFileRequest {
    WriteTextFileRequest {
        session_id: "sess_1".into(),
        path: path.into(),
        content: content.into(),
    }
}

#[tokio::test]
async fn reads_whole_and_sliced_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("notes.txt"), "a\nb\nc\n").expect("seed");
    let fs = LocalFileSystem::new(dir.path());

    let whole = fs.read_text_file(read("notes.txt", None, None)).await.expect("read");
    assert_eq!(whole.content, "a\nb\nc\n");

    let sliced = fs
        .read_text_file(read("notes.txt", Some(2), Some(2)))
        .await
        .expect("read");
    assert_eq!(sliced.content, "b\nc\n");
}

#[tokio::test]
async fn absolute_paths_inside_the_root_are_accepted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().canonicalize().expect("canonical root");
    std::fs::write(root.join("abs.txt"), "x").expect("seed");
    let fs = LocalFileSystem::new(&root);

    let path = root.join("abs.txt");
    let response = fs
        .read_text_file(read(path.to_str().expect("utf-8 path"), None, None))
        .await
        .expect("read");
    assert_eq!(response.content, "x");
}

#[tokio::test]
async fn write_creates_parents_and_overwrites() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fs = LocalFileSystem::new(dir.path());

    fs.write_text_file(write("src/deep/new.rs", "fn main() {}\n"))
        .await
        .expect("create");
    fs.write_text_file(write("src/deep/new.rs", "// replaced\n"))
        .await
        .expect("overwrite");

    let on_disk = std::fs::read_to_string(dir.path().join("src/deep/new.rs")).expect("on disk");
    assert_eq!(on_disk, "// replaced\n");
    let read_back = fs
        .read_text_file(read("src/deep/new.rs", None, None))
        .await
        .expect("read");
    assert_eq!(read_back.content, "// replaced\n");
}

#[tokio::test]
async fn paths_outside_the_root_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fs = LocalFileSystem::new(dir.path().join("workspace"));
    std::fs::create_dir(dir.path().join("workspace")).expect("workspace");
    std::fs::write(dir.path().join("secret.txt"), "s").expect("seed");

    assert!(matches!(
        fs.read_text_file(read("../secret.txt", None, None)).await,
        Err(AppError::PathViolation(_))
    ));
    assert!(matches!(
        fs.write_text_file(write("../escape.txt", "x")).await,
        Err(AppError::PathViolation(_))
    ));
    assert!(matches!(
        fs.read_text_file(read("/etc/hostname", None, None)).await,
        Err(AppError::PathViolation(_))
    ));
    assert!(!dir.path().join("escape.txt").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn symlink_out_of_the_root_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let outside = tempfile::tempdir().expect("outside");
    std::fs::write(outside.path().join("target.txt"), "t").expect("seed");
    std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).expect("symlink");
    let fs = LocalFileSystem::new(dir.path());

    assert!(matches!(
        fs.read_text_file(read("link/target.txt", None, None)).await,
        Err(AppError::PathViolation(_))
    ));
}

#[tokio::test]
async fn missing_file_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fs = LocalFileSystem::new(dir.path());

    assert!(matches!(
        fs.read_text_file(read("absent.txt", None, None)).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn unsupported_runtime_refuses_everything() {
    let fs = UnsupportedFileSystem;
    assert!(matches!(
        fs.read_text_file(read("a", None, None)).await,
        Err(AppError::Unsupported(_))
    ));
    assert!(matches!(
        fs.write_text_file(write("a", "b")).await,
        Err(AppError::Unsupported(_))
    ));
}
