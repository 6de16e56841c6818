//! 파일시스템 트리 작업, zip 가상 파일시스템, 바이트 크기 표시,
//! HTTP 다운로드/리다이렉트 도우미 모음
//!
//! 트리 함수([`system::filesystem`])는 [`VirtualFs`] 를 받으므로
//! 로컬 디스크([`LocalFs`])와 zip 아카이브([`ArchiveHandle::fs`]) 양쪽에서 쓸 수 있다.
//!
//! ```no_run
//! use ioutils::{ArchiveHandle, CopyOptions, LocalFs};
//! use ioutils::system::filesystem::copy_tree;
//! use std::path::Path;
//!
//! # fn main() -> ioutils::Result<()> {
//! let archive = ArchiveHandle::open("bundle.zip")?;
//! copy_tree(archive.fs(), &archive.root(), &LocalFs, Path::new("out"), CopyOptions::new())?;
//! archive.close()?;
//! # Ok(())
//! # }
//! ```

pub mod models;
pub mod system;
pub mod utils;

pub use models::{CopyOptions, FileTreeFilter, RequestConfig};
pub use system::{
    ArchiveHandle, DownloadDescriptor, EntryKind, EntryMetadata, HttpFetcher, LocalFs,
    TreeVisitor, VirtualFs, ZipArchiveFs,
};
pub use utils::error::{IoUtilsError, Result};
