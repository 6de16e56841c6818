//! 경로 문자열/`Path` 조작 유틸리티. 파일시스템에 접근하지 않는다.

use crate::utils::error::{IoUtilsError, Result};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

const UNIX_SEPARATOR: char = '/';
const WINDOWS_SEPARATOR: char = '\\';

/// 현재 플랫폼 문법으로 해석 가능한 경로인지 확인
pub fn is_valid_path(path: &str) -> bool {
    if path.contains('\0') {
        return false;
    }

    #[cfg(windows)]
    {
        const RESERVED: [char; 6] = ['<', '>', '"', '|', '?', '*'];
        // 드라이브 문자 뒤의 ':' 외에는 허용하지 않음
        let body = match path.char_indices().nth(1) {
            Some((idx, ':')) if path.starts_with(|c: char| c.is_ascii_alphabetic()) => {
                &path[idx + 1..]
            }
            _ => path,
        };
        if body.contains(':') || body.contains(RESERVED) {
            return false;
        }
    }

    true
}

/// 마지막 경로 요소를 문자열로 반환 (없으면 빈 문자열)
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `ancestor` 가 `child` 의 조상인지 확인. 경로는 자기 자신의 조상이 아니다.
pub fn is_ancestor(ancestor: &Path, child: &Path) -> bool {
    let ancestor = normalize(ancestor);
    let child = normalize(child);
    child.ancestors().skip(1).any(|parent| parent == ancestor)
}

/// 두 경로의 가장 가까운 공통 조상
///
/// # Examples
/// ```
/// use std::path::{Path, PathBuf};
/// use ioutils::utils::path::common_ancestor;
///
/// assert_eq!(
///     common_ancestor(Path::new("/a/b/c/d/file.txt"), Path::new("/a/b/c/file.txt")),
///     PathBuf::from("/a/b/c")
/// );
/// ```
pub fn common_ancestor(first: &Path, second: &Path) -> PathBuf {
    if first == second {
        return first.to_path_buf();
    }

    let first = normalize(first);
    let second = normalize(second);

    first
        .components()
        .zip(second.components())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a)
        .collect()
}

/// 여러 경로의 가장 가까운 공통 조상. 중복 제거 후 최소 두 개가 필요하다.
pub fn common_ancestor_of<I, P>(paths: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let unique: BTreeSet<PathBuf> = paths
        .into_iter()
        .map(|path| path.as_ref().to_path_buf())
        .collect();

    if unique.len() < 2 {
        return Err(IoUtilsError::invalid_argument(
            "paths should contain at least two distinct elements",
        ));
    }

    let mut iter = unique.iter();
    let mut ancestor = iter.next().cloned().unwrap_or_default();
    for path in iter {
        ancestor = common_ancestor(&ancestor, path);
    }
    Ok(ancestor)
}

/// 역슬래시 구분자를 슬래시로 변환 (글로브에서 역슬래시는 이스케이프 문자)
pub fn normalize_separators(path: &str) -> String {
    path.replace(WINDOWS_SEPARATOR, &UNIX_SEPARATOR.to_string())
}

/// `Path` 를 Unix 구분자 문자열로 변환
pub fn with_unix_separators(path: &Path) -> String {
    normalize_separators(&path.to_string_lossy())
}

/// `.` 와 `..` 를 어휘적으로 정리 (심볼릭 링크는 해석하지 않음)
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                // 루트 위로는 올라갈 수 없음
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    parts.iter().collect()
}

/// `base` 기준 상대 경로. `path` 가 `base` 아래가 아니면 `None`
pub fn relativize(base: &Path, path: &Path) -> Option<PathBuf> {
    normalize(path)
        .strip_prefix(normalize(base))
        .ok()
        .map(Path::to_path_buf)
}
