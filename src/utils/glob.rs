//! 글로브 패턴 컴파일 (globset 기반)
//!
//! - `*`    : 구분자를 제외한 0개 이상의 문자
//! - `**`   : 구분자를 포함한 0개 이상의 문자 (경로 요소 단위)
//! - `?`    : 임의 1문자
//! - `[...]`: 문자 클래스

use crate::utils::error::{IoUtilsError, Result};
use crate::utils::path::normalize_separators;
use globset::{GlobBuilder, GlobMatcher};

/// 패턴에 글로브 메타 문자가 포함되어 있는지 확인
pub fn is_glob_pattern(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

/// 슬래시 구분 경로에 대해 매칭하는 글로브 컴파일
///
/// 역슬래시는 먼저 슬래시로 바꾼다.
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    let pattern = normalize_separators(pattern);
    let glob = GlobBuilder::new(&pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| IoUtilsError::InvalidPattern(e.to_string()))?;
    Ok(glob.compile_matcher())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_glob_pattern() {
        assert!(is_glob_pattern("*.rs"));
        assert!(is_glob_pattern("test?"));
        assert!(is_glob_pattern("[ab].txt"));
        assert!(!is_glob_pattern("hello"));
        assert!(!is_glob_pattern(""));
    }

    #[test]
    fn test_star_does_not_cross_separator() {
        let matcher = compile_glob("a*/b*.txt").unwrap();
        assert!(matcher.is_match("aa/bb.txt"));
        assert!(matcher.is_match("ab/bc.txt"));
        assert!(!matcher.is_match("bb/bb.txt"));
        assert!(!matcher.is_match("aa/x/bb.txt"));
    }

    #[test]
    fn test_double_star_crosses_separators() {
        let matcher = compile_glob("**/*.txt").unwrap();
        assert!(matcher.is_match("a/b/c.txt"));
        assert!(matcher.is_match("c.txt"));
        assert!(!matcher.is_match("a/b/c.rs"));
    }

    #[test]
    fn test_question_and_class() {
        let matcher = compile_glob("file?.[ch]").unwrap();
        assert!(matcher.is_match("file1.c"));
        assert!(matcher.is_match("fileX.h"));
        assert!(!matcher.is_match("file12.c"));
        assert!(!matcher.is_match("file1.rs"));
    }

    #[test]
    fn test_backslash_separators_are_normalized() {
        let matcher = compile_glob("dir\\*.txt").unwrap();
        assert!(matcher.is_match("dir/a.txt"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            compile_glob("[unclosed"),
            Err(IoUtilsError::InvalidPattern(_))
        ));
    }
}
