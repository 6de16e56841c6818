//! 열린 HTTP 응답에 대한 다운로드 정보

use crate::system::net::{content_disposition_directive, error_for_status, resolve_file_name, save_new_file};
use crate::utils::error::{IoUtilsError, Result};
use crate::utils::formatter;
use encoding_rs::Encoding;
use reqwest::blocking::Response;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use url::Url;

/// 이미 연결된 응답을 감싸 메타데이터를 필요할 때 계산
///
/// 파생 값은 캐시하지 않으며 본문은 `download*` 호출 시 소비된다.
#[derive(Debug)]
pub struct DownloadDescriptor {
    response: Response,
    encoding: &'static Encoding,
}

impl DownloadDescriptor {
    pub(crate) fn new(response: Response, encoding: &'static Encoding) -> Self {
        Self { response, encoding }
    }

    /// 최종 응답 URL (리다이렉트 후)
    pub fn url(&self) -> &Url {
        self.response.url()
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    pub fn content_disposition(&self) -> Option<&str> {
        self.header(CONTENT_DISPOSITION.as_str())
    }

    pub fn content_disposition_directive(&self, directive: &str) -> Option<String> {
        self.content_disposition()
            .and_then(|disposition| content_disposition_directive(disposition, directive))
    }

    /// `Content-Length` (없으면 `None`)
    pub fn size(&self) -> Option<u64> {
        self.response.content_length()
    }

    pub fn decimal_size(&self) -> Option<String> {
        self.size().map(|size| formatter::decimal(clamp_size(size)))
    }

    pub fn binary_size(&self) -> Option<String> {
        self.size().map(|size| formatter::binary(clamp_size(size)))
    }

    pub fn file_name(&self) -> Option<String> {
        resolve_file_name(self.url(), self.content_disposition(), self.encoding)
    }

    /// 본문을 새 파일로 저장
    pub fn download(self, path: &Path) -> Result<u64> {
        let response = error_for_status(self.response, self.encoding)?;
        save_new_file(response, path)
    }

    /// 응답 파일 이름으로 `dir` 아래에 저장하고 경로 반환
    pub fn download_to_directory(self, dir: &Path) -> Result<PathBuf> {
        if !dir.is_dir() {
            return Err(IoUtilsError::not_a_directory(dir));
        }
        let name = self.file_name().filter(|name| !name.is_empty()).ok_or_else(|| {
            IoUtilsError::invalid_argument(format!(
                "could not determine a file name for {}",
                self.url()
            ))
        })?;

        // 이름에 경로 구분자가 섞여 있어도 dir 밖으로 나가지 않도록 마지막 요소만 사용
        let name = Path::new(&name)
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| IoUtilsError::invalid_argument(format!("invalid file name: {name}")))?;

        let path = dir.join(name);
        self.download(&path)?;
        Ok(path)
    }

    pub fn into_response(self) -> Response {
        self.response
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    }
}

fn clamp_size(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}
