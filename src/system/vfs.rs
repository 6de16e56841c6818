//! 가상 파일시스템 능력 인터페이스
//!
//! 트리 순회/복사/삭제 코드는 이 트레이트만 사용하므로 실제 디스크와
//! zip 아카이브 양쪽에서 그대로 동작한다.

use crate::utils::path::normalize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// 엔트리 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// 심볼릭 링크, 장치 파일 등
    Other,
}

/// 엔트리 메타데이터
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    pub kind: EntryKind,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl EntryMetadata {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// 최소 파일시스템 능력 {list, read, write, create_dir, delete}
pub trait VirtualFs {
    /// 엔트리 자체의 메타데이터 (심볼릭 링크는 따라가지 않고 `Other`)
    fn metadata(&self, path: &Path) -> io::Result<EntryMetadata>;

    /// 심볼릭 링크를 따라간 대상의 메타데이터
    fn target_metadata(&self, path: &Path) -> io::Result<EntryMetadata> {
        self.metadata(path)
    }

    /// 한 단계 자식 목록 (이름순)
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + '_>>;

    /// 파일을 생성하거나 잘라내고 `reader` 내용을 기록
    fn write_from(&self, path: &Path, reader: &mut dyn Read) -> io::Result<u64>;

    /// 단일 디렉토리 생성 (부모가 있어야 함)
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// 빈 디렉토리 삭제
    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    fn set_modified(&self, path: &Path, modified: SystemTime) -> io::Result<()>;

    /// 절대 경로 + 어휘적 정규화
    fn to_absolute(&self, path: &Path) -> io::Result<PathBuf> {
        if path.has_root() {
            Ok(normalize(path))
        } else {
            Ok(normalize(&Path::new("/").join(path)))
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.metadata(path).map(|m| m.is_dir()).unwrap_or(false)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.metadata(path).map(|m| m.is_file()).unwrap_or(false)
    }

    /// 누락된 조상 디렉토리까지 모두 생성
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        if path.as_os_str().is_empty() || self.is_dir(path) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent)?;
        }
        match self.create_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && self.is_dir(path) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// 운영체제 파일시스템
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

impl VirtualFs for LocalFs {
    fn metadata(&self, path: &Path) -> io::Result<EntryMetadata> {
        Ok(entry_metadata(&fs::symlink_metadata(path)?))
    }

    fn target_metadata(&self, path: &Path) -> io::Result<EntryMetadata> {
        Ok(entry_metadata(&fs::metadata(path)?))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut children = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        children.sort();
        Ok(children)
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(File::open(path)?))
    }

    fn write_from(&self, path: &Path, reader: &mut dyn Read) -> io::Result<u64> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        io::copy(reader, &mut file)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn set_modified(&self, path: &Path, modified: SystemTime) -> io::Result<()> {
        filetime::set_file_mtime(path, filetime::FileTime::from_system_time(modified))
    }

    fn to_absolute(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(normalize(&std::path::absolute(path)?))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

fn entry_metadata(metadata: &fs::Metadata) -> EntryMetadata {
    let file_type = metadata.file_type();
    let kind = if file_type.is_symlink() {
        EntryKind::Other
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    };
    EntryMetadata {
        kind,
        len: if kind == EntryKind::File { metadata.len() } else { 0 },
        modified: metadata.modified().ok(),
    }
}
