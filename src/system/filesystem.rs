//! 디렉토리 트리 작업 (순회, 복사, 삭제, 글로브 매칭)
//!
//! 모든 트리 함수는 [`VirtualFs`] 위에서 동작하므로 로컬 디스크와
//! 아카이브 내부 경로에 똑같이 쓸 수 있다. `touch` 계열과 텍스트
//! 읽기/쓰기는 로컬 파일 전용이다.

use crate::models::copy_options::{CopyOptions, FileTreeFilter};
use crate::system::vfs::{EntryMetadata, VirtualFs};
use crate::utils::error::{IoUtilsError, Result};
use crate::utils::glob::compile_glob;
use crate::utils::path::{common_ancestor_of, file_name, normalize, relativize, with_unix_separators};
use encoding_rs::Encoding;
use globset::GlobMatcher;
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(windows)]
const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
const LINE_SEPARATOR: &str = "\n";

/// 깊이 우선 순회 콜백
///
/// 형제 간 순서는 이름순이며, 디렉토리는 항상 자식보다 먼저 `pre_visit_dir`,
/// 자식 이후에 `post_visit_dir` 가 호출된다.
pub trait TreeVisitor {
    fn pre_visit_dir(&mut self, _dir: &Path) -> Result<()> {
        Ok(())
    }

    fn visit_file(&mut self, file: &Path) -> Result<()>;

    /// `error` 는 이 디렉토리 목록을 읽는 중 발생한 오류
    fn post_visit_dir(&mut self, _dir: &Path, error: Option<io::Error>) -> Result<()> {
        match error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// `start` 부터 깊이 우선으로 순회. `start` 가 파일이면 `visit_file` 만 호출된다.
pub fn walk_tree<F, V>(fs: &F, start: &Path, visitor: &mut V) -> Result<()>
where
    F: VirtualFs + ?Sized,
    V: TreeVisitor + ?Sized,
{
    let metadata = metadata_of(fs, start)?;
    walk_entry(fs, start, &metadata, visitor)
}

fn walk_entry<F, V>(fs: &F, path: &Path, metadata: &EntryMetadata, visitor: &mut V) -> Result<()>
where
    F: VirtualFs + ?Sized,
    V: TreeVisitor + ?Sized,
{
    if !metadata.is_dir() {
        return visitor.visit_file(path);
    }

    visitor.pre_visit_dir(path)?;

    let children = match fs.read_dir(path) {
        Ok(children) => children,
        Err(e) => return visitor.post_visit_dir(path, Some(e)),
    };

    for child in children {
        let child_metadata = fs.metadata(&child)?;
        walk_entry(fs, &child, &child_metadata, visitor)?;
    }

    visitor.post_visit_dir(path, None)
}

/// 한 단계 자식 목록
pub fn list_children<F: VirtualFs + ?Sized>(fs: &F, dir: &Path) -> Result<Vec<PathBuf>> {
    require_dir(fs, dir)?;
    Ok(fs.read_dir(dir)?)
}

/// 하위 트리에 디렉토리가 아닌 엔트리가 하나도 없는지 확인 (너비 우선)
pub fn is_tree_empty<F: VirtualFs + ?Sized>(fs: &F, dir: &Path) -> Result<bool> {
    require_dir(fs, dir)?;

    let mut queue = VecDeque::from([dir.to_path_buf()]);
    while let Some(current) = queue.pop_front() {
        for child in fs.read_dir(&current)? {
            if !fs.is_dir(&child) {
                return Ok(false);
            }
            queue.push_back(child);
        }
    }

    Ok(true)
}

/// `path` 의 부모 디렉토리가 없으면 조상까지 모두 생성
pub fn ensure_parent_exists<F: VirtualFs + ?Sized>(fs: &F, path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !fs.is_dir(parent) => {
            fs.create_dir_all(parent)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// 단일 파일 복사 (파일시스템 간 가능)
pub fn copy_file<S, T>(
    source_fs: &S,
    source: &Path,
    target_fs: &T,
    target: &Path,
    options: CopyOptions,
) -> Result<()>
where
    S: VirtualFs + ?Sized,
    T: VirtualFs + ?Sized,
{
    // 링크는 대상 내용을 복사
    let metadata = source_fs.target_metadata(source).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IoUtilsError::PathNotFound {
            path: source.to_path_buf(),
        },
        _ => IoUtilsError::Io(e),
    })?;
    if metadata.is_dir() {
        return Err(IoUtilsError::NotAFile {
            path: source.to_path_buf(),
        });
    }

    if let Ok(existing) = target_fs.metadata(target) {
        if !options.replace_existing {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("target already exists: {}", target.display()),
            )
            .into());
        }
        // 빈 디렉토리만 교체 가능
        if existing.is_dir() {
            target_fs.remove_dir(target)?;
        }
    }

    let mut reader = source_fs.open_read(source)?;
    target_fs.write_from(target, &mut reader)?;

    if options.copy_attributes {
        if let Some(modified) = metadata.modified {
            target_fs.set_modified(target, modified)?;
        }
    }

    Ok(())
}

struct CopyVisitor<'a, S: VirtualFs + ?Sized, T: VirtualFs + ?Sized> {
    source_fs: &'a S,
    source_root: &'a Path,
    target_fs: &'a T,
    target_root: &'a Path,
    options: CopyOptions,
}

impl<S: VirtualFs + ?Sized, T: VirtualFs + ?Sized> CopyVisitor<'_, S, T> {
    fn target_of(&self, path: &Path) -> PathBuf {
        match relativize(self.source_root, path) {
            Some(relative) if !relative.as_os_str().is_empty() => self.target_root.join(relative),
            _ => self.target_root.to_path_buf(),
        }
    }
}

impl<S: VirtualFs + ?Sized, T: VirtualFs + ?Sized> TreeVisitor for CopyVisitor<'_, S, T> {
    fn pre_visit_dir(&mut self, dir: &Path) -> Result<()> {
        let target = self.target_of(dir);
        self.target_fs.create_dir_all(&target)?;
        Ok(())
    }

    fn visit_file(&mut self, file: &Path) -> Result<()> {
        let target = self.target_of(file);
        // 디렉토리 링크는 따라 들어가지 않고 빈 디렉토리로 만든다
        if self.source_fs.target_metadata(file).is_ok_and(|m| m.is_dir()) {
            self.target_fs.create_dir_all(&target)?;
            return Ok(());
        }
        copy_file(self.source_fs, file, self.target_fs, &target, self.options)
    }
}

/// `source_dir` 의 구조를 `target_dir` 아래에 그대로 재현
///
/// 첫 오류에서 중단되며 이미 복사된 결과는 되돌리지 않는다.
pub fn copy_tree<S, T>(
    source_fs: &S,
    source_dir: &Path,
    target_fs: &T,
    target_dir: &Path,
    options: CopyOptions,
) -> Result<()>
where
    S: VirtualFs + ?Sized,
    T: VirtualFs + ?Sized,
{
    require_dir(source_fs, source_dir)?;
    tracing::debug!(
        source = %source_dir.display(),
        target = %target_dir.display(),
        "copying directory tree"
    );

    let mut visitor = CopyVisitor {
        source_fs,
        source_root: source_dir,
        target_fs,
        target_root: target_dir,
        options,
    };
    walk_tree(source_fs, source_dir, &mut visitor)
}

/// 여러 파일을 공통 조상 기준 상대 경로로 `target_dir` 아래에 복사
///
/// 입력이 비어 있으면 아무 일도 하지 않고, 하나뿐이면 파일 이름 그대로
/// `target_dir` 바로 아래에 복사한다. 디렉토리 입력은 트리째 복사된다.
pub fn copy_preserving_structure<S, T, I, P>(
    source_fs: &S,
    files: I,
    target_fs: &T,
    target_dir: &Path,
    options: CopyOptions,
) -> Result<()>
where
    S: VirtualFs + ?Sized,
    T: VirtualFs + ?Sized,
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let sources = files
        .into_iter()
        .map(|path| source_fs.to_absolute(path.as_ref()))
        .collect::<io::Result<BTreeSet<_>>>()?;

    if sources.len() <= 1 {
        if let Some(source) = sources.first() {
            let target = target_dir.join(file_name(source));
            copy_entry(source_fs, source, target_fs, &target, options)?;
        }
        return Ok(());
    }

    let ancestor = common_ancestor_of(&sources)?;
    tracing::debug!(
        count = sources.len(),
        ancestor = %ancestor.display(),
        "copying files preserving structure"
    );

    for source in &sources {
        let relative = relativize(&ancestor, source)
            .filter(|relative| !relative.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(file_name(source)));
        copy_entry(source_fs, source, target_fs, &target_dir.join(relative), options)?;
    }
    Ok(())
}

fn copy_entry<S, T>(
    source_fs: &S,
    source: &Path,
    target_fs: &T,
    target: &Path,
    options: CopyOptions,
) -> Result<()>
where
    S: VirtualFs + ?Sized,
    T: VirtualFs + ?Sized,
{
    if source_fs.is_dir(source) {
        return copy_tree(source_fs, source, target_fs, target, options);
    }
    ensure_parent_exists(target_fs, target)?;
    copy_file(source_fs, source, target_fs, target, options)
}

struct DeleteVisitor<'a, F: VirtualFs + ?Sized> {
    fs: &'a F,
    root: &'a Path,
    filter: &'a FileTreeFilter<'a>,
}

impl<F: VirtualFs + ?Sized> TreeVisitor for DeleteVisitor<'_, F> {
    fn visit_file(&mut self, file: &Path) -> Result<()> {
        if (self.filter)(file) {
            self.fs.remove_file(file)?;
        }
        Ok(())
    }

    fn post_visit_dir(&mut self, dir: &Path, error: Option<io::Error>) -> Result<()> {
        if let Some(e) = error {
            return Err(e.into());
        }

        // 필터에 걸린 하위 디렉토리는 내용과 상관없이 통째로 삭제
        if dir != self.root && (self.filter)(dir) {
            remove_recursively(self.fs, dir)?;
        }
        Ok(())
    }
}

/// `filter` 에 맞는 파일을 삭제하고, 필터에 맞는 하위 디렉토리는 통째로 삭제
///
/// `dir` 자체는 삭제하지 않는다.
pub fn delete_matching<F: VirtualFs + ?Sized>(
    fs: &F,
    dir: &Path,
    filter: &FileTreeFilter<'_>,
) -> Result<()> {
    require_dir(fs, dir)?;
    tracing::debug!(dir = %dir.display(), "deleting matching entries");
    let mut visitor = DeleteVisitor {
        fs,
        root: dir,
        filter,
    };
    walk_tree(fs, dir, &mut visitor)
}

fn remove_recursively<F: VirtualFs + ?Sized>(fs: &F, dir: &Path) -> Result<()> {
    let match_all = |_: &Path| true;
    let mut visitor = DeleteVisitor {
        fs,
        root: dir,
        filter: &match_all,
    };
    walk_tree(fs, dir, &mut visitor)?;
    fs.remove_dir(dir)?;
    Ok(())
}

/// 디렉토리와 그 내용 전체 삭제
pub fn delete_tree<F: VirtualFs + ?Sized>(fs: &F, dir: &Path) -> Result<()> {
    require_dir(fs, dir)?;
    if fs.read_dir(dir)?.is_empty() {
        fs.remove_dir(dir)?;
        return Ok(());
    }
    tracing::debug!(dir = %dir.display(), "deleting directory tree");
    remove_recursively(fs, dir)
}

/// 디렉토리가 있으면 삭제하고 `true`, 없으면 `false`
pub fn delete_tree_if_exists<F: VirtualFs + ?Sized>(fs: &F, dir: &Path) -> Result<bool> {
    if !fs.exists(dir) {
        return Ok(false);
    }
    delete_tree(fs, dir)?;
    Ok(true)
}

struct GlobVisitor<'a> {
    root: &'a Path,
    matcher: &'a GlobMatcher,
    matches: Vec<PathBuf>,
}

impl GlobVisitor<'_> {
    fn check(&mut self, path: &Path) {
        let Some(relative) = relativize(self.root, path) else {
            return;
        };
        if relative.as_os_str().is_empty() {
            return;
        }
        if self.matcher.is_match(with_unix_separators(&relative)) {
            self.matches.push(normalize(path));
        }
    }
}

impl TreeVisitor for GlobVisitor<'_> {
    fn pre_visit_dir(&mut self, dir: &Path) -> Result<()> {
        self.check(dir);
        Ok(())
    }

    fn visit_file(&mut self, file: &Path) -> Result<()> {
        self.check(file);
        Ok(())
    }
}

/// `dir` 기준 상대 경로가 글로브 `pattern` 에 맞는 모든 엔트리 (절대 경로)
pub fn match_glob<F: VirtualFs + ?Sized>(fs: &F, dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    require_dir(fs, dir)?;
    let matcher = compile_glob(pattern)?;
    let root = fs.to_absolute(dir)?;

    let mut visitor = GlobVisitor {
        root: &root,
        matcher: &matcher,
        matches: Vec::new(),
    };
    walk_tree(fs, &root, &mut visitor)?;
    Ok(visitor.matches)
}

/// 파일이 없으면 만들고 수정 시각을 현재로 갱신
pub fn touch(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
    }

    let now = SystemTime::now();
    filetime::set_file_mtime(path, filetime::FileTime::from_system_time(now))?;

    let modified = fs::metadata(path)?.modified()?;
    if to_millis(modified) != to_millis(now) {
        return Err(io::Error::other(format!(
            "could not set last modification time: {}",
            path.display()
        ))
        .into());
    }
    Ok(())
}

/// 수정 시각을 바꿀 수 있는지 시험하고 원래 시각으로 복원
pub fn can_touch(path: &Path) -> bool {
    let attempt = || -> Result<()> {
        let original = fs::metadata(path)?.modified()?;
        touch(path)?;
        filetime::set_file_mtime(path, filetime::FileTime::from_system_time(original))?;
        Ok(())
    };

    match attempt() {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "path is not touchable");
            false
        }
    }
}

/// 파일 전체를 `encoding` 으로 디코딩
pub fn read_to_string(path: &Path, encoding: &'static Encoding) -> Result<String> {
    if !path.is_file() {
        return Err(IoUtilsError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    let bytes = fs::read(path)?;
    let (text, had_errors) = encoding.decode_without_bom_handling(&bytes);
    if had_errors {
        tracing::warn!(path = %path.display(), encoding = encoding.name(), "malformed input replaced");
    }
    Ok(text.into_owned())
}

/// `content` 를 `encoding` 으로 인코딩해 기록
///
/// `force_end_newline` 이면 끝에 줄바꿈이 없을 때 플랫폼 줄 구분자를 붙인다.
pub fn write_string(
    path: &Path,
    content: &str,
    encoding: &'static Encoding,
    force_end_newline: bool,
) -> Result<()> {
    let mut content = content.to_string();
    if force_end_newline && !content.ends_with('\n') {
        content.push_str(LINE_SEPARATOR);
    }

    let (bytes, _, had_errors) = encoding.encode(&content);
    if had_errors {
        tracing::warn!(path = %path.display(), encoding = encoding.name(), "unmappable characters replaced");
    }
    fs::write(path, bytes)?;
    Ok(())
}

fn metadata_of<F: VirtualFs + ?Sized>(fs: &F, path: &Path) -> Result<EntryMetadata> {
    fs.metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IoUtilsError::PathNotFound {
            path: path.to_path_buf(),
        },
        _ => IoUtilsError::Io(e),
    })
}

fn require_dir<F: VirtualFs + ?Sized>(fs: &F, dir: &Path) -> Result<()> {
    if metadata_of(fs, dir)?.is_dir() {
        Ok(())
    } else {
        Err(IoUtilsError::not_a_directory(dir))
    }
}

fn to_millis(time: SystemTime) -> Option<u128> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::vfs::LocalFs;
    use crate::utils::path::common_ancestor;
    use tempfile::TempDir;

    fn create_files(root: &Path, files: &[&str]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|name| {
                let path = root.join(name);
                ensure_parent_exists(&LocalFs, &path).unwrap();
                fs::write(&path, format!("content of {name}")).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_list_children_requires_directory() {
        let temp = TempDir::new().unwrap();
        let files = create_files(temp.path(), &["b.txt", "a.txt"]);

        let children = list_children(&LocalFs, temp.path()).unwrap();
        assert_eq!(children, vec![files[1].clone(), files[0].clone()]);

        assert!(matches!(
            list_children(&LocalFs, &files[0]),
            Err(IoUtilsError::NotADirectory { .. })
        ));
        assert!(matches!(
            list_children(&LocalFs, &temp.path().join("missing")),
            Err(IoUtilsError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_is_tree_empty() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::create_dir_all(root.join("d")).unwrap();
        assert!(is_tree_empty(&LocalFs, &root).unwrap());

        fs::write(root.join("a/b/c/file.txt"), "x").unwrap();
        assert!(!is_tree_empty(&LocalFs, &root).unwrap());
    }

    #[test]
    fn test_ensure_parent_exists() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a/b/c.txt");
        ensure_parent_exists(&LocalFs, &file).unwrap();
        assert!(temp.path().join("a/b").is_dir());
        assert!(!file.exists());

        // 이미 있거나 부모가 없으면 무시
        ensure_parent_exists(&LocalFs, &file).unwrap();
        ensure_parent_exists(&LocalFs, Path::new("relative.txt")).unwrap();
    }

    #[test]
    fn test_copy_tree_then_delete_tree() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        create_files(&source, &["a.txt", "a/b.txt", "a/b/c.txt"]);
        fs::create_dir_all(source.join("empty")).unwrap();

        let target = temp.path().join("target");
        copy_tree(&LocalFs, &source, &LocalFs, &target, CopyOptions::new()).unwrap();

        for name in ["a.txt", "a/b.txt", "a/b/c.txt"] {
            assert_eq!(
                fs::read_to_string(target.join(name)).unwrap(),
                format!("content of {name}")
            );
        }
        assert!(target.join("empty").is_dir());

        delete_tree(&LocalFs, &target).unwrap();
        assert!(!target.exists());
        assert!(source.join("a/b/c.txt").exists());
    }

    #[test]
    fn test_copy_file_respects_replace_existing() {
        let temp = TempDir::new().unwrap();
        let files = create_files(temp.path(), &["src.txt", "dst.txt"]);

        let result = copy_file(&LocalFs, &files[0], &LocalFs, &files[1], CopyOptions::new());
        assert!(matches!(result, Err(IoUtilsError::Io(ref e)) if e.kind() == io::ErrorKind::AlreadyExists));
        assert_eq!(fs::read_to_string(&files[1]).unwrap(), "content of dst.txt");

        copy_file(
            &LocalFs,
            &files[0],
            &LocalFs,
            &files[1],
            CopyOptions::replace_existing(),
        )
        .unwrap();
        assert_eq!(fs::read_to_string(&files[1]).unwrap(), "content of src.txt");
    }

    #[test]
    fn test_copy_file_copies_modified_time() {
        let temp = TempDir::new().unwrap();
        let files = create_files(temp.path(), &["src.txt"]);
        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&files[0], old).unwrap();

        let target = temp.path().join("copy.txt");
        copy_file(
            &LocalFs,
            &files[0],
            &LocalFs,
            &target,
            CopyOptions::new().with_copy_attributes(true),
        )
        .unwrap();

        let copied = filetime::FileTime::from_last_modification_time(&fs::metadata(&target).unwrap());
        assert_eq!(copied.unix_seconds(), 1_000_000_000);
    }

    #[test]
    fn test_copy_preserving_structure() {
        let temp = TempDir::new().unwrap();
        let files = create_files(temp.path(), &["a/b/c/d.txt", "a/b/c.txt"]);
        let target = temp.path().join("target");

        copy_preserving_structure(&LocalFs, &files, &LocalFs, &target, CopyOptions::new())
            .unwrap();

        assert!(target.join("c/d.txt").is_file());
        assert!(target.join("c.txt").is_file());
        assert_eq!(
            fs::read_to_string(target.join("c/d.txt")).unwrap(),
            "content of a/b/c/d.txt"
        );
    }

    #[test]
    fn test_copy_preserving_structure_roundtrip_many() {
        let temp = TempDir::new().unwrap();
        let names = ["x/one.txt", "x/y/two.txt", "x/y/z/three.txt", "x/w/four.txt"];
        let files = create_files(temp.path(), &names);
        let target = temp.path().join("out");

        copy_preserving_structure(&LocalFs, &files, &LocalFs, &target, CopyOptions::new())
            .unwrap();

        let ancestor = common_ancestor_of(&files).unwrap();
        for file in &files {
            let relative = relativize(&ancestor, file).unwrap();
            assert_eq!(
                fs::read_to_string(target.join(relative)).unwrap(),
                fs::read_to_string(file).unwrap()
            );
        }
    }

    #[test]
    fn test_copy_preserving_structure_single_and_empty() {
        let temp = TempDir::new().unwrap();
        let files = create_files(temp.path(), &["deep/nested/only.txt"]);
        let target = temp.path().join("target");

        copy_preserving_structure(
            &LocalFs,
            Vec::<PathBuf>::new(),
            &LocalFs,
            &target,
            CopyOptions::new(),
        )
        .unwrap();
        assert!(!target.exists());

        // 중복은 하나로 취급
        let duplicated = vec![files[0].clone(), files[0].clone()];
        copy_preserving_structure(&LocalFs, &duplicated, &LocalFs, &target, CopyOptions::new())
            .unwrap();
        assert!(target.join("only.txt").is_file());
    }

    #[test]
    fn test_delete_matching_keeps_directories() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("a");
        let files = create_files(&dir, &["b/c.txt"]);

        delete_matching(&LocalFs, &dir, &|path: &Path| path.is_file()).unwrap();

        assert!(dir.join("b").is_dir());
        assert!(!files[0].exists());
    }

    #[test]
    fn test_delete_matching_removes_matched_directories_wholesale() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("root");
        create_files(&dir, &["old/keep.txt", "new/old.txt", "new/fresh.txt"]);

        let filter = |path: &Path| file_name(path).starts_with("old");
        delete_matching(&LocalFs, &dir, &filter).unwrap();

        // 필터에 맞는 디렉토리는 내용이 필터에 맞지 않아도 삭제된다
        assert!(!dir.join("old").exists());
        assert!(!dir.join("new/old.txt").exists());
        assert!(dir.join("new/fresh.txt").is_file());
        assert!(dir.is_dir());
    }

    /// 지정한 경로에서만 `read_dir`/`remove_file` 이 실패하는 로컬 파일시스템
    struct FailingFs {
        inner: LocalFs,
        read_dir_error: Option<PathBuf>,
        remove_error: Option<PathBuf>,
    }

    impl FailingFs {
        fn new() -> Self {
            Self {
                inner: LocalFs,
                read_dir_error: None,
                remove_error: None,
            }
        }

        fn denied(what: &str) -> io::Error {
            io::Error::new(io::ErrorKind::PermissionDenied, format!("{what} denied"))
        }
    }

    impl VirtualFs for FailingFs {
        fn metadata(&self, path: &Path) -> io::Result<EntryMetadata> {
            self.inner.metadata(path)
        }
        fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
            if self.read_dir_error.as_deref() == Some(path) {
                return Err(Self::denied("read_dir"));
            }
            self.inner.read_dir(path)
        }
        fn open_read(&self, path: &Path) -> io::Result<Box<dyn io::Read + '_>> {
            self.inner.open_read(path)
        }
        fn write_from(&self, path: &Path, reader: &mut dyn io::Read) -> io::Result<u64> {
            self.inner.write_from(path, reader)
        }
        fn create_dir(&self, path: &Path) -> io::Result<()> {
            self.inner.create_dir(path)
        }
        fn remove_file(&self, path: &Path) -> io::Result<()> {
            if self.remove_error.as_deref() == Some(path) {
                return Err(Self::denied("remove"));
            }
            self.inner.remove_file(path)
        }
        fn remove_dir(&self, path: &Path) -> io::Result<()> {
            self.inner.remove_dir(path)
        }
        fn set_modified(&self, path: &Path, modified: SystemTime) -> io::Result<()> {
            self.inner.set_modified(path, modified)
        }
    }

    #[test]
    fn test_delete_matching_stops_on_read_error() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("root");
        let files = create_files(&dir, &["a/x.txt", "b/y.txt", "c.txt"]);

        let failing = FailingFs {
            read_dir_error: Some(dir.join("a")),
            ..FailingFs::new()
        };
        let result = delete_matching(&failing, &dir, &|_: &Path| true);

        assert!(matches!(result, Err(IoUtilsError::Io(ref e)) if e.kind() == io::ErrorKind::PermissionDenied));
        // "a" 이후의 엔트리는 손대지 않는다
        assert!(files.iter().all(|path| path.is_file()));
        assert!(dir.join("a").is_dir());
    }

    #[test]
    fn test_delete_tree_fails_when_entry_cannot_be_removed() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("root");
        let files = create_files(&dir, &["a.txt", "b.txt", "c.txt"]);

        let failing = FailingFs {
            remove_error: Some(files[1].clone()),
            ..FailingFs::new()
        };
        let result = delete_tree(&failing, &dir);

        assert!(matches!(result, Err(IoUtilsError::Io(ref e)) if e.kind() == io::ErrorKind::PermissionDenied));
        assert!(!files[0].exists());
        assert!(files[1].is_file());
        assert!(files[2].is_file());
        assert!(dir.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_delete_tree_removes_links_not_targets() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let outside = create_files(&temp.path().join("outside"), &["precious.txt"]);
        let dir = temp.path().join("root");
        create_files(&dir, &["a.txt"]);
        symlink(temp.path().join("outside"), dir.join("link")).unwrap();
        symlink(temp.path().join("nowhere"), dir.join("dangling")).unwrap();

        delete_tree(&LocalFs, &dir).unwrap();

        assert!(!dir.exists());
        assert!(outside[0].is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_delete_matching_unlinks_matched_links() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let outside = create_files(&temp.path().join("outside"), &["old.txt"]);
        let dir = temp.path().join("root");
        create_files(&dir, &["keep.txt"]);
        symlink(temp.path().join("outside"), dir.join("old_link")).unwrap();
        symlink(temp.path().join("nowhere"), dir.join("old_dangling")).unwrap();

        let filter = |path: &Path| file_name(path).starts_with("old");
        delete_matching(&LocalFs, &dir, &filter).unwrap();

        assert!(fs::symlink_metadata(dir.join("old_link")).is_err());
        assert!(fs::symlink_metadata(dir.join("old_dangling")).is_err());
        assert!(dir.join("keep.txt").is_file());
        assert!(outside[0].is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_does_not_descend_into_linked_directories() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        create_files(&temp.path().join("outside"), &["precious.txt"]);
        let source = temp.path().join("source");
        create_files(&source, &["real.txt"]);
        symlink(source.join("real.txt"), source.join("file_link")).unwrap();
        symlink(temp.path().join("outside"), source.join("dir_link")).unwrap();
        symlink(&source, source.join("loop")).unwrap();

        let target = temp.path().join("target");
        copy_tree(&LocalFs, &source, &LocalFs, &target, CopyOptions::new()).unwrap();

        let copied = fs::symlink_metadata(target.join("file_link")).unwrap();
        assert!(copied.file_type().is_file());
        assert_eq!(
            fs::read_to_string(target.join("file_link")).unwrap(),
            "content of real.txt"
        );
        assert!(target.join("dir_link").is_dir());
        assert!(!target.join("dir_link/precious.txt").exists());
        assert!(target.join("loop").is_dir());
        assert!(fs::read_dir(target.join("loop")).unwrap().next().is_none());
    }

    #[test]
    fn test_delete_tree_if_exists() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("a");
        fs::create_dir_all(first.join("b")).unwrap();
        let second = temp.path().join("c");

        assert!(delete_tree_if_exists(&LocalFs, &first).unwrap());
        assert!(!first.exists());
        assert!(!delete_tree_if_exists(&LocalFs, &second).unwrap());
    }

    #[test]
    fn test_match_glob() {
        let temp = TempDir::new().unwrap();
        create_files(
            temp.path(),
            &["aa/bb.txt", "aa/bc.txt", "ab/bb.txt", "ab/ab.txt", "bb/bb.txt"],
        );

        let matches = match_glob(&LocalFs, temp.path(), "a*/b*.txt").unwrap();
        assert_eq!(matches.len(), 3);

        let root = normalize(&std::path::absolute(temp.path()).unwrap());
        assert_eq!(matches[0], root.join("aa/bb.txt"));
        assert!(matches.iter().all(|path| path.is_absolute()));
    }

    #[test]
    fn test_match_glob_includes_directories() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), &["src/lib.rs", "src/nested/mod.rs", "docs/readme.md"]);

        let dirs = match_glob(&LocalFs, temp.path(), "s*").unwrap();
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].ends_with("src"));

        let sources = match_glob(&LocalFs, temp.path(), "**/*.rs").unwrap();
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn test_walk_tree_order() {
        struct Recorder(Vec<String>);
        impl TreeVisitor for Recorder {
            fn pre_visit_dir(&mut self, dir: &Path) -> Result<()> {
                self.0.push(format!("pre {}", file_name(dir)));
                Ok(())
            }
            fn visit_file(&mut self, file: &Path) -> Result<()> {
                self.0.push(format!("file {}", file_name(file)));
                Ok(())
            }
            fn post_visit_dir(&mut self, dir: &Path, _: Option<io::Error>) -> Result<()> {
                self.0.push(format!("post {}", file_name(dir)));
                Ok(())
            }
        }

        let temp = TempDir::new().unwrap();
        let root = temp.path().join("r");
        create_files(&root, &["b/2.txt", "a.txt"]);

        let mut recorder = Recorder(Vec::new());
        walk_tree(&LocalFs, &root, &mut recorder).unwrap();
        assert_eq!(
            recorder.0,
            vec!["pre r", "file a.txt", "pre b", "file 2.txt", "post b", "post r"]
        );
    }

    #[test]
    fn test_touch_and_can_touch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("touched");

        assert!(!can_touch(&path));
        touch(&path).unwrap();
        assert!(path.is_file());

        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&path, old).unwrap();
        assert!(can_touch(&path));
        let restored = filetime::FileTime::from_last_modification_time(&fs::metadata(&path).unwrap());
        assert_eq!(restored.unix_seconds(), 1_000_000_000);
    }

    #[test]
    fn test_read_and_write_string() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("text.txt");

        write_string(&path, "caf\u{e9}", encoding_rs::WINDOWS_1252, true).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"caf\xe9");
        assert!(bytes.ends_with(LINE_SEPARATOR.as_bytes()));

        let text = read_to_string(&path, encoding_rs::WINDOWS_1252).unwrap();
        assert_eq!(text, format!("caf\u{e9}{LINE_SEPARATOR}"));

        write_string(&path, "no newline", encoding_rs::UTF_8, false).unwrap();
        assert_eq!(read_to_string(&path, encoding_rs::UTF_8).unwrap(), "no newline");

        assert!(matches!(
            read_to_string(temp.path(), encoding_rs::UTF_8),
            Err(IoUtilsError::NotAFile { .. })
        ));
    }

    #[test]
    fn test_common_ancestor_of_inputs() {
        let paths = [
            PathBuf::from("/a/b/c/d/e/file.txt"),
            PathBuf::from("/a/b/c/file.txt"),
            PathBuf::from("/a/b/file.txt"),
        ];
        assert_eq!(common_ancestor_of(&paths).unwrap(), PathBuf::from("/a/b"));
        assert_eq!(
            common_ancestor(&paths[0], &paths[1]),
            common_ancestor(&paths[1], &paths[0])
        );
    }
}
