//! 복사/삭제 작업 옵션
//!
//! 트리 복사와 필터 삭제에 넘기는 호출 단위 설정

use std::path::Path;

/// 삭제/복사 중 각 엔트리 포함 여부를 판단하는 필터
///
/// 평가 시 파일시스템 상태를 바꾸면 안 된다.
pub type FileTreeFilter<'a> = dyn Fn(&Path) -> bool + 'a;

/// 복사 옵션
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyOptions {
    /// 대상이 이미 있으면 덮어쓰기
    pub replace_existing: bool,
    /// 수정 시각 복사
    pub copy_attributes: bool,
}

impl CopyOptions {
    /// 기본 옵션 (덮어쓰지 않음)
    pub fn new() -> Self {
        Self::default()
    }

    /// 덮어쓰기 허용 옵션
    pub fn replace_existing() -> Self {
        Self {
            replace_existing: true,
            ..Self::default()
        }
    }

    pub fn with_replace_existing(mut self, replace_existing: bool) -> Self {
        self.replace_existing = replace_existing;
        self
    }

    pub fn with_copy_attributes(mut self, copy_attributes: bool) -> Self {
        self.copy_attributes = copy_attributes;
        self
    }
}
