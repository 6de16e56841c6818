//! HTTP 요청 설정 (헤더, 타임아웃, 인코딩)

use crate::utils::error::{IoUtilsError, Result};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/60.0.3112.113 Safari/537.36";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.8";
pub const DEFAULT_REFERER: &str = "google.com";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_ENCODING: &str = "UTF-8";

pub const USER_AGENT: &str = "User-Agent";
pub const ACCEPT_LANGUAGE: &str = "Accept-Language";
pub const REFERER: &str = "Referer";
pub const UPGRADE_INSECURE_REQUESTS: &str = "Upgrade-Insecure-Requests";

/// 연결 시점에 읽히는 요청 설정
///
/// 헤더 키는 저장된 그대로 대소문자를 구분한다. 타임아웃 0 은 무제한.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub headers: BTreeMap<String, String>,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub encoding: String,
    /// `HTTP_PROXY` 등 환경 변수의 프록시 사용
    pub use_system_proxy: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(USER_AGENT.to_string(), DEFAULT_USER_AGENT.to_string());
        headers.insert(
            ACCEPT_LANGUAGE.to_string(),
            DEFAULT_ACCEPT_LANGUAGE.to_string(),
        );
        headers.insert(REFERER.to_string(), DEFAULT_REFERER.to_string());
        headers.insert(UPGRADE_INSECURE_REQUESTS.to_string(), "1".to_string());

        Self {
            headers,
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            encoding: DEFAULT_ENCODING.to_string(),
            use_system_proxy: true,
        }
    }
}

impl RequestConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// 설정된 인코딩 레이블을 `encoding_rs` 인코딩으로 해석
    pub fn resolve_encoding(&self) -> Result<&'static Encoding> {
        resolve_encoding(&self.encoding)
    }

    /// 인코딩 레이블 검증
    pub fn validate(&self) -> Result<()> {
        self.resolve_encoding().map(|_| ())
    }

    pub fn from_toml_str(data: &str) -> Result<Self> {
        let config: RequestConfig =
            toml::from_str(data).map_err(|e| IoUtilsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| IoUtilsError::Config(e.to_string()))
    }

    /// TOML 파일에서 설정 로드
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 설정을 TOML 파일로 저장
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = self.to_toml_string()?;
        fs::write(path, content)?;
        Ok(())
    }
}

pub(crate) fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| IoUtilsError::invalid_argument(format!("unsupported encoding: {label}")))
}
