//! zip 아카이브를 가상 파일시스템으로 노출
//!
//! 아카이브 내용은 열 때 메모리로 읽어 [`ZipArchiveFs`] 에 보관하고,
//! 닫을 때 임시 파일에 다시 쓴 뒤 원래 경로로 교체한다.
//! 엔트리 경로는 `/` 로 시작하는 가상 경로이며 트리 함수에 그대로 넘길 수 있다.

use crate::models::copy_options::CopyOptions;
use crate::system::filesystem::{
    copy_file, copy_preserving_structure, copy_tree, ensure_parent_exists, walk_tree, TreeVisitor,
};
use crate::system::vfs::{EntryKind, EntryMetadata, LocalFs, VirtualFs};
use crate::utils::error::{IoUtilsError, Result};
use crate::utils::path::{file_name, normalize, normalize_separators};
use chrono::{DateTime as ChronoDateTime, Datelike, Local, TimeZone, Timelike};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::{LazyLock, Mutex};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions as ZipFileOptions;
use zip::{CompressionMethod, DateTime as ZipDateTime, ZipArchive, ZipWriter};

/// 현재 프로세스에서 열려 있는 아카이브 (정규화된 경로)
static OPEN_ARCHIVES: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

#[derive(Debug, Clone)]
enum ZipNode {
    Directory {
        modified: Option<SystemTime>,
    },
    File {
        data: Vec<u8>,
        modified: Option<SystemTime>,
    },
}

impl ZipNode {
    fn metadata(&self) -> EntryMetadata {
        match self {
            ZipNode::Directory { modified } => EntryMetadata {
                kind: EntryKind::Directory,
                len: 0,
                modified: *modified,
            },
            ZipNode::File { data, modified } => EntryMetadata {
                kind: EntryKind::File,
                len: data.len() as u64,
                modified: *modified,
            },
        }
    }
}

/// 메모리에 적재된 zip 엔트리 트리
///
/// 키는 루트 기준 `/` 구분 상대 경로이며 루트는 빈 문자열이다.
#[derive(Debug, Default)]
pub struct ZipArchiveFs {
    entries: RefCell<BTreeMap<String, ZipNode>>,
    comment: RefCell<String>,
    dirty: Cell<bool>,
}

impl ZipArchiveFs {
    fn empty() -> Self {
        Self::default()
    }

    fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| map_zip_error(path, e))?;

        let mut entries = BTreeMap::new();
        for idx in 0..archive.len() {
            let mut entry = archive.by_index(idx).map_err(|e| map_zip_error(path, e))?;
            let key = entry_key(Path::new(entry.name()));
            if key.is_empty() {
                continue;
            }

            let modified: Option<ZipDateTime> = entry.last_modified().into();
            let modified = modified.and_then(zip_time_to_system);

            if entry.is_dir() {
                entries.insert(key.clone(), ZipNode::Directory { modified });
            } else {
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                entries.insert(key.clone(), ZipNode::File { data, modified });
            }

            // 디렉토리 엔트리 없이 파일만 있는 아카이브 대응
            let mut parent = parent_key(&key);
            while let Some(dir) = parent {
                if dir.is_empty() {
                    break;
                }
                entries
                    .entry(dir.to_string())
                    .or_insert(ZipNode::Directory { modified: None });
                parent = parent_key(dir);
            }
        }

        let comment = String::from_utf8_lossy(archive.comment()).into_owned();
        tracing::debug!(
            path = %path.display(),
            entries = entries.len(),
            "loaded zip archive"
        );

        Ok(Self {
            entries: RefCell::new(entries),
            comment: RefCell::new(comment),
            dirty: Cell::new(false),
        })
    }

    /// 임시 파일에 기록한 뒤 `path` 로 교체
    fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        // 교체 대상의 권한을 유지하고, 새 파일은 기본 권한으로 만든다
        let permissions = match fs::metadata(path) {
            Ok(metadata) => metadata.permissions(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                File::create(path)?.metadata()?.permissions()
            }
            Err(e) => return Err(e.into()),
        };
        let mut temp = NamedTempFile::new_in(parent)?;

        {
            let mut writer = ZipWriter::new(temp.as_file_mut());
            let comment = self.comment.borrow();
            if !comment.is_empty() {
                writer.set_comment(comment.clone());
            }

            for (key, node) in self.entries.borrow().iter() {
                let mut options =
                    ZipFileOptions::default().compression_method(CompressionMethod::Deflated);
                let modified = match node {
                    ZipNode::Directory { modified } | ZipNode::File { modified, .. } => *modified,
                };
                if let Some(time) = modified.and_then(system_time_to_zip) {
                    options = options.last_modified_time(time);
                }

                match node {
                    ZipNode::Directory { .. } => writer
                        .add_directory(format!("{key}/"), options)
                        .map_err(|e| map_zip_error(path, e))?,
                    ZipNode::File { data, .. } => {
                        writer
                            .start_file(key.clone(), options)
                            .map_err(|e| map_zip_error(path, e))?;
                        io::Write::write_all(&mut writer, data)?;
                    }
                }
            }

            writer.finish().map_err(|e| map_zip_error(path, e))?;
        }

        fs::set_permissions(temp.path(), permissions)?;
        temp.persist(path).map_err(|e| IoUtilsError::Io(e.error))?;
        self.dirty.set(false);
        tracing::debug!(path = %path.display(), "flushed zip archive");
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    fn comment(&self) -> String {
        self.comment.borrow().clone()
    }

    fn set_comment(&self, comment: String) {
        *self.comment.borrow_mut() = comment;
        self.dirty.set(true);
    }

    fn node_metadata(&self, key: &str) -> Option<EntryMetadata> {
        if key.is_empty() {
            return Some(ZipNode::Directory { modified: None }.metadata());
        }
        self.entries.borrow().get(key).map(ZipNode::metadata)
    }

    fn require_parent_dir(&self, key: &str) -> io::Result<()> {
        match parent_key(key) {
            Some(parent) if !matches!(self.node_metadata(parent), Some(m) if m.is_dir()) => {
                Err(not_found(parent))
            }
            _ => Ok(()),
        }
    }

    fn has_children(&self, key: &str) -> bool {
        let prefix = child_prefix(key);
        self.entries
            .borrow()
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(child, _)| child.starts_with(&prefix))
    }
}

impl VirtualFs for ZipArchiveFs {
    fn metadata(&self, path: &Path) -> io::Result<EntryMetadata> {
        let key = entry_key(path);
        self.node_metadata(&key).ok_or_else(|| not_found(&key))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let key = entry_key(path);
        match self.node_metadata(&key) {
            Some(metadata) if metadata.is_dir() => {}
            Some(_) => return Err(invalid_input(&key, "not a directory")),
            None => return Err(not_found(&key)),
        }

        let prefix = child_prefix(&key);
        let children = self
            .entries
            .borrow()
            .range(prefix.clone()..)
            .take_while(|(child, _)| child.starts_with(&prefix))
            .filter(|(child, _)| !child[prefix.len()..].contains('/'))
            .map(|(child, _)| virtual_path(child))
            .collect();
        Ok(children)
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
        let key = entry_key(path);
        match self.entries.borrow().get(&key) {
            Some(ZipNode::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(ZipNode::Directory { .. }) => Err(invalid_input(&key, "is a directory")),
            None if key.is_empty() => Err(invalid_input(&key, "is a directory")),
            None => Err(not_found(&key)),
        }
    }

    fn write_from(&self, path: &Path, reader: &mut dyn Read) -> io::Result<u64> {
        let key = entry_key(path);
        if key.is_empty() || matches!(self.node_metadata(&key), Some(m) if m.is_dir()) {
            return Err(invalid_input(&key, "is a directory"));
        }
        self.require_parent_dir(&key)?;

        let mut data = Vec::new();
        let written = reader.read_to_end(&mut data)? as u64;
        self.entries.borrow_mut().insert(
            key,
            ZipNode::File {
                data,
                modified: Some(SystemTime::now()),
            },
        );
        self.dirty.set(true);
        Ok(written)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        let key = entry_key(path);
        if self.node_metadata(&key).is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("entry already exists: /{key}"),
            ));
        }
        self.require_parent_dir(&key)?;

        self.entries.borrow_mut().insert(
            key,
            ZipNode::Directory {
                modified: Some(SystemTime::now()),
            },
        );
        self.dirty.set(true);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let key = entry_key(path);
        match self.node_metadata(&key) {
            Some(metadata) if metadata.is_file() => {}
            Some(_) => return Err(invalid_input(&key, "is a directory")),
            None => return Err(not_found(&key)),
        }

        self.entries.borrow_mut().remove(&key);
        self.dirty.set(true);
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let key = entry_key(path);
        if key.is_empty() {
            return Err(invalid_input(&key, "cannot remove archive root"));
        }
        match self.node_metadata(&key) {
            Some(metadata) if metadata.is_dir() => {}
            Some(_) => return Err(invalid_input(&key, "not a directory")),
            None => return Err(not_found(&key)),
        }
        if self.has_children(&key) {
            return Err(io::Error::other(format!("directory not empty: /{key}")));
        }

        self.entries.borrow_mut().remove(&key);
        self.dirty.set(true);
        Ok(())
    }

    fn set_modified(&self, path: &Path, time: SystemTime) -> io::Result<()> {
        let key = entry_key(path);
        if key.is_empty() {
            return Ok(());
        }
        match self.entries.borrow_mut().get_mut(&key) {
            Some(ZipNode::Directory { modified }) | Some(ZipNode::File { modified, .. }) => {
                *modified = Some(time);
            }
            None => return Err(not_found(&key)),
        }
        self.dirty.set(true);
        Ok(())
    }
}

/// 열린 zip 아카이브 핸들
///
/// 같은 파일에 대해 프로세스 내에서 하나의 핸들만 열 수 있다.
/// 변경 내용은 [`ArchiveHandle::close`] 에서 디스크에 기록되며, 닫지 않고
/// 버려진 핸들은 `Drop` 에서 기록을 시도한다.
#[derive(Debug)]
pub struct ArchiveHandle {
    path: PathBuf,
    fs: ZipArchiveFs,
    closed: bool,
    _registration: Registration,
}

impl ArchiveHandle {
    /// 아카이브 열기. 파일이 없거나 비어 있으면 빈 아카이브를 만든다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let is_empty = match fs::metadata(&path) {
            Ok(metadata) => metadata.len() == 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        if is_empty {
            ensure_parent_exists(&LocalFs, &path)?;
            ZipArchiveFs::empty().save(&path)?;
            tracing::debug!(path = %path.display(), "created empty zip archive");
        }

        let registration = Registration::acquire(&path)?;
        let fs = ZipArchiveFs::load(&path)?;

        Ok(Self {
            path,
            fs,
            closed: false,
            _registration: registration,
        })
    }

    /// 기존 파일을 지우고 새 아카이브 생성
    pub fn create_new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Registration::ensure_free(path)?;
            fs::remove_file(path)?;
        }
        Self::open(path)
    }

    /// 아카이브 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 트리 함수에 넘길 가상 파일시스템
    pub fn fs(&self) -> &ZipArchiveFs {
        &self.fs
    }

    /// 엔트리 이름을 절대 가상 경로로 변환
    pub fn entry_path(&self, entry_name: &str) -> PathBuf {
        virtual_path(&entry_key(Path::new(&normalize_separators(entry_name))))
    }

    pub fn root(&self) -> PathBuf {
        self.entry_path("/")
    }

    pub fn comment(&self) -> String {
        self.fs.comment()
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.fs.set_comment(comment.into());
    }

    /// 파일을 아카이브 루트에 같은 이름으로 추가
    pub fn add_entry(&mut self, file: &Path) -> Result<()> {
        let name = file_name(file);
        if name.is_empty() {
            return Err(IoUtilsError::invalid_argument(format!(
                "invalid path: {}",
                file.display()
            )));
        }
        self.add_entry_as(file, &name)
    }

    /// 파일을 지정한 엔트리 이름으로 추가 (기존 엔트리는 교체)
    pub fn add_entry_as(&mut self, file: &Path, entry_name: &str) -> Result<()> {
        let target = self.entry_path(entry_name);
        if LocalFs.is_dir(file) {
            return copy_tree(&LocalFs, file, &self.fs, &target, add_options());
        }
        ensure_parent_exists(&self.fs, &target)?;
        copy_file(&LocalFs, file, &self.fs, &target, add_options())
    }

    /// 여러 파일을 공통 조상 기준 디렉토리 구조를 유지해 추가
    pub fn add_entries<I, P>(&mut self, files: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let root = self.root();
        copy_preserving_structure(&LocalFs, files, &self.fs, &root, add_options())
    }

    /// 여러 파일을 모두 루트에 파일 이름으로 추가
    pub fn add_entries_flat<I, P>(&mut self, files: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for file in files {
            self.add_entry(file.as_ref())?;
        }
        Ok(())
    }

    /// 디렉토리 내용 전체를 루트 아래에 추가
    pub fn add_all(&mut self, source_dir: &Path) -> Result<()> {
        let root = self.root();
        copy_tree(&LocalFs, source_dir, &self.fs, &root, add_options())
    }

    /// 엔트리(파일 또는 디렉토리)를 로컬 경로로 추출
    pub fn extract(&self, entry_name: &str, location: &Path, options: CopyOptions) -> Result<()> {
        let source = self.entry_path(entry_name);
        if self.fs.is_dir(&source) {
            copy_tree(&self.fs, &source, &LocalFs, location, options)
        } else {
            copy_file(&self.fs, &source, &LocalFs, location, options)
        }
    }

    pub fn extract_all(&self, location: &Path) -> Result<()> {
        self.extract("/", location, CopyOptions::new())
    }

    pub fn walk<V: TreeVisitor + ?Sized>(&self, entry_name: &str, visitor: &mut V) -> Result<()> {
        walk_tree(&self.fs, &self.entry_path(entry_name), visitor)
    }

    /// 변경 내용을 기록하고 핸들 해제
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.fs.is_dirty() {
            self.fs.save(&self.path)?;
        }
        Ok(())
    }
}

impl Drop for ArchiveHandle {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to flush zip archive");
        }
    }
}

/// 열린 아카이브 등록. 해제 시 자동으로 등록 취소.
#[derive(Debug)]
struct Registration(PathBuf);

impl Registration {
    fn acquire(path: &Path) -> Result<Self> {
        let key = fs::canonicalize(path)?;
        let mut open = OPEN_ARCHIVES.lock().unwrap_or_else(|e| e.into_inner());
        if !open.insert(key.clone()) {
            return Err(IoUtilsError::ArchiveInUse {
                path: path.to_path_buf(),
            });
        }
        Ok(Self(key))
    }

    fn ensure_free(path: &Path) -> Result<()> {
        let key = fs::canonicalize(path)?;
        let open = OPEN_ARCHIVES.lock().unwrap_or_else(|e| e.into_inner());
        if open.contains(&key) {
            return Err(IoUtilsError::ArchiveInUse {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut open = OPEN_ARCHIVES.lock().unwrap_or_else(|e| e.into_inner());
        open.remove(&self.0);
    }
}

fn add_options() -> CopyOptions {
    CopyOptions::replace_existing().with_copy_attributes(true)
}

/// 가상 경로를 엔트리 키로 변환 (`..` 는 루트에서 멈춤)
fn entry_key(path: &Path) -> String {
    normalize(&Path::new("/").join(path))
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn virtual_path(key: &str) -> PathBuf {
    PathBuf::from(format!("/{key}"))
}

fn parent_key(key: &str) -> Option<&str> {
    if key.is_empty() {
        return None;
    }
    Some(key.rsplit_once('/').map_or("", |(parent, _)| parent))
}

fn child_prefix(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}/")
    }
}

fn not_found(key: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such entry: /{key}"))
}

fn invalid_input(key: &str, reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("/{key}: {reason}"))
}

fn map_zip_error(path: &Path, error: ZipError) -> IoUtilsError {
    match error {
        ZipError::Io(e) => IoUtilsError::Io(e),
        other => IoUtilsError::InvalidArchive {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

/// zip 타임스탬프는 로컬 시간 기준
fn zip_time_to_system(time: ZipDateTime) -> Option<SystemTime> {
    let naive = chrono::NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )?
    .and_hms_opt(
        u32::from(time.hour()),
        u32::from(time.minute()),
        u32::from(time.second()),
    )?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(SystemTime::from(local))
}

fn system_time_to_zip(time: SystemTime) -> Option<ZipDateTime> {
    let local: ChronoDateTime<Local> = ChronoDateTime::from(time);
    ZipDateTime::from_date_and_time(
        u16::try_from(local.year()).ok()?,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}
