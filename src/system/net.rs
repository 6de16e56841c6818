//! HTTP 요청, 리다이렉트 추적, 다운로드
//!
//! 모든 호출은 동기식이며 연결 시점에 [`RequestConfig`] 를 읽는다.

use crate::models::request_config::{
    resolve_encoding, RequestConfig, ACCEPT_LANGUAGE, REFERER, UPGRADE_INSECURE_REQUESTS,
    USER_AGENT,
};
use crate::system::download::DownloadDescriptor;
use crate::utils::error::{IoUtilsError, Result};
use encoding_rs::Encoding;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// 리다이렉트 최대 추적 횟수 기본값
pub const DEFAULT_MAX_HOPS: usize = 100;

/// 설정을 보관하고 요청마다 클라이언트를 구성하는 HTTP 도우미
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    config: RequestConfig,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 주어진 설정으로 생성 (인코딩 레이블 검증)
    pub fn with_config(config: RequestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.config.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.config.headers.get(key).map(String::as_str)
    }

    /// 헤더 설정. `None` 이면 제거. 이전 값 반환.
    pub fn set_header(&mut self, key: impl Into<String>, value: Option<String>) -> Option<String> {
        let key = key.into();
        match value {
            Some(value) => self.config.headers.insert(key, value),
            None => self.config.headers.remove(&key),
        }
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header(USER_AGENT)
    }

    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) -> Option<String> {
        self.set_header(USER_AGENT, Some(user_agent.into()))
    }

    pub fn accept_language(&self) -> Option<&str> {
        self.header(ACCEPT_LANGUAGE)
    }

    pub fn set_accept_language(&mut self, accept_language: impl Into<String>) -> Option<String> {
        self.set_header(ACCEPT_LANGUAGE, Some(accept_language.into()))
    }

    pub fn referer(&self) -> Option<&str> {
        self.header(REFERER)
    }

    pub fn set_referer(&mut self, referer: impl Into<String>) -> Option<String> {
        self.set_header(REFERER, Some(referer.into()))
    }

    pub fn upgrade_insecure_requests(&self) -> bool {
        self.header(UPGRADE_INSECURE_REQUESTS) == Some("1")
    }

    /// 이전 값이 켜져 있었는지 반환
    pub fn set_upgrade_insecure_requests(&mut self, enabled: bool) -> bool {
        let value = if enabled { "1" } else { "0" };
        self.set_header(UPGRADE_INSECURE_REQUESTS, Some(value.to_string()))
            .is_some_and(|previous| previous == "1")
    }

    pub fn encoding(&self) -> &str {
        &self.config.encoding
    }

    /// 응답 본문/URL 디코딩에 쓸 인코딩 설정
    pub fn set_encoding(&mut self, label: &str) -> Result<()> {
        let encoding = resolve_encoding(label)?;
        self.config.encoding = encoding.name().to_string();
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        self.config.connect_timeout()
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.config.connect_timeout_ms = duration_to_millis(timeout);
    }

    pub fn read_timeout(&self) -> Duration {
        self.config.read_timeout()
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.config.read_timeout_ms = duration_to_millis(timeout);
    }

    /// 요청을 보내고 응답 반환 (리다이렉트 자동 추적, 상태 코드 검사 안 함)
    pub fn connect(&self, url: &Url) -> Result<Response> {
        let client = self.client(Policy::default())?;
        Ok(self.request(&client, url).send()?)
    }

    /// 본문 전체를 설정된 인코딩으로 디코딩
    pub fn read(&self, url: &Url) -> Result<String> {
        let encoding = self.config.resolve_encoding()?;
        let response = error_for_status(self.connect(url)?, encoding)?;
        let bytes = response.bytes()?;
        let (text, _, had_errors) = encoding.decode(&bytes);
        if had_errors {
            tracing::warn!(url = %url, encoding = encoding.name(), "malformed response body");
        }
        Ok(text.into_owned())
    }

    /// 본문을 새 파일로 저장. 이미 있으면 실패.
    pub fn download(&self, url: &Url, path: &Path) -> Result<u64> {
        let encoding = self.config.resolve_encoding()?;
        let response = error_for_status(self.connect(url)?, encoding)?;
        save_new_file(response, path)
    }

    /// 본문을 `writer` 로 스트리밍
    pub fn download_to_writer<W: Write + ?Sized>(&self, url: &Url, writer: &mut W) -> Result<u64> {
        let encoding = self.config.resolve_encoding()?;
        let mut response = error_for_status(self.connect(url)?, encoding)?;
        Ok(io::copy(&mut response, writer)?)
    }

    /// 연결만 열어 두고 메타데이터 조회/다운로드를 나중에 수행
    pub fn download_info(&self, url: &Url) -> Result<DownloadDescriptor> {
        let encoding = self.config.resolve_encoding()?;
        Ok(DownloadDescriptor::new(self.connect(url)?, encoding))
    }

    pub fn resolve_redirects(&self, url: &Url) -> Result<Url> {
        self.resolve_redirects_with(url, DEFAULT_MAX_HOPS, false)
    }

    /// `Location` 헤더를 직접 따라가며 최종 URL 계산
    ///
    /// 이전 응답의 `Set-Cookie` 값은 다음 요청의 `Set-Cookie` 헤더로 그대로 전달한다.
    /// `Location` 이 없거나, 직전 값과 같거나, `max_hops` 를 다 쓰면 멈춘다.
    /// 해석할 수 없는 `Location` 을 만나면 그때까지의 URL 을 반환한다.
    pub fn resolve_redirects_with(
        &self,
        url: &Url,
        max_hops: usize,
        keep_encoded_plus: bool,
    ) -> Result<Url> {
        if max_hops == 0 {
            return Err(IoUtilsError::invalid_argument("max_hops should be positive"));
        }

        let encoding = self.config.resolve_encoding()?;
        let client = self.client(Policy::none())?;

        let mut current = url.clone();
        let mut previous_location: Option<String> = None;
        let mut cookies: Option<String> = None;

        for hop in 0..max_hops {
            let mut request = self.request(&client, &current);
            if let Some(cookies) = &cookies {
                request = request.header(SET_COOKIE, cookies.as_str());
            }
            let response = request.send()?;

            cookies = last_header(&response, SET_COOKIE.as_str());
            let location = last_header(&response, LOCATION.as_str()).map(|location| {
                if keep_encoded_plus {
                    location.replace("%2B", "+")
                } else {
                    location
                }
            });

            let Some(location) = location else {
                break;
            };
            if previous_location.as_deref() == Some(location.as_str()) {
                break;
            }

            tracing::debug!(hop, from = %current, location = %location, "following redirect");
            let next = url_from_location(&current, &location, encoding, keep_encoded_plus);
            previous_location = Some(location);

            match next {
                Some(next) => current = next,
                None => {
                    tracing::warn!(
                        url = %current,
                        location = previous_location.as_deref().unwrap_or_default(),
                        "invalid redirect location"
                    );
                    return Ok(current);
                }
            }
        }

        Ok(current)
    }

    fn client(&self, redirect: Policy) -> Result<Client> {
        let mut builder = Client::builder().redirect(redirect);

        let connect_timeout = self.config.connect_timeout();
        if !connect_timeout.is_zero() {
            builder = builder.connect_timeout(connect_timeout);
        }
        let read_timeout = self.config.read_timeout();
        builder = builder.timeout((!read_timeout.is_zero()).then_some(read_timeout));

        if !self.config.use_system_proxy {
            builder = builder.no_proxy();
        }

        Ok(builder.build()?)
    }

    fn request(&self, client: &Client, url: &Url) -> RequestBuilder {
        self.config
            .headers
            .iter()
            .fold(client.get(url.clone()), |request, (key, value)| {
                request.header(key.as_str(), value.as_str())
            })
    }
}

/// 4xx/5xx 응답이면 본문을 읽어 오류에 포함
///
/// 본문을 읽지 못하면 본문 없이 상태 코드만 보고한다.
pub(crate) fn error_for_status(response: Response, encoding: &'static Encoding) -> Result<Response> {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = match response.bytes() {
        Ok(bytes) if !bytes.is_empty() => Some(encoding.decode(&bytes).0.into_owned()),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "could not read error body");
            None
        }
    };

    Err(IoUtilsError::HttpStatus {
        url,
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn save_new_file(mut response: Response, path: &Path) -> Result<u64> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let written = io::copy(&mut response, &mut file)?;
    tracing::debug!(path = %path.display(), bytes = written, "downloaded");
    Ok(written)
}

fn last_header(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(name)
        .iter()
        .last()
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// `Location` 값을 URL 로 해석
///
/// 절대 URL, 현재 URL 기준 상대 경로 순으로 시도하고, 둘 다 실패하거나 결과가
/// 유효하지 않으면 현재 URL 의 마지막 경로 요소를 인코딩해 본다.
pub(crate) fn url_from_location(
    current: &Url,
    location: &str,
    encoding: &'static Encoding,
    keep_encoded_plus: bool,
) -> Option<Url> {
    let parsed = match Url::parse(location) {
        Err(url::ParseError::RelativeUrlWithoutBase) => current.join(location),
        other => other,
    };

    match parsed {
        Ok(url) if has_valid_syntax(&url) => Some(url),
        _ => Some(encode_url_path(current, encoding, keep_encoded_plus)).filter(has_valid_syntax),
    }
}

/// 계층형 URL (호스트 포함) 인지 확인
fn has_valid_syntax(url: &Url) -> bool {
    !url.cannot_be_a_base() && url.has_host()
}

/// 문자열이 유효한 계층형 URL 인지 확인
pub fn is_valid_url(url: &str) -> bool {
    parse_url(url).is_ok()
}

pub fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| IoUtilsError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !has_valid_syntax(&parsed) {
        return Err(IoUtilsError::InvalidUrl {
            url: url.to_string(),
            reason: "URL has no host".to_string(),
        });
    }
    Ok(parsed)
}

/// 마지막 경로 요소를 `encoding` 기준 폼 인코딩으로 다시 인코딩
///
/// `keep_encoded_plus` 이면 `%2B` 를 `+` 로 되돌린다.
pub fn encode_url_path(url: &Url, encoding: &'static Encoding, keep_encoded_plus: bool) -> Url {
    let path = url.path();
    let split = path.rfind('/').map_or(0, |idx| idx + 1);
    let (directory, name) = path.split_at(split);

    let decoded = percent_decode_str(name).decode_utf8_lossy();
    let (bytes, _, _) = encoding.encode(&decoded);
    let mut encoded: String = url::form_urlencoded::byte_serialize(&bytes).collect();
    if keep_encoded_plus {
        encoded = encoded.replace("%2B", "+");
    }

    let mut result = url.clone();
    result.set_path(&format!("{directory}{encoded}"));
    result
}

/// 폼 인코딩 문자열 디코딩 (`+` 는 공백)
pub fn url_decode(value: &str, encoding: &'static Encoding) -> String {
    let spaced = value.replace('+', " ");
    let bytes: Vec<u8> = percent_decode_str(&spaced).collect();
    encoding.decode_without_bom_handling(&bytes).0.into_owned()
}

/// URL 경로의 마지막 요소를 디코딩한 파일 이름
///
/// 경로 끝의 `/` 는 무시하고, 이름 안의 탭은 공백으로 바꾼다.
pub fn file_name_from_url(url: &Url, encoding: &'static Encoding) -> Option<String> {
    let segment = url.path().trim_end_matches('/').rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    Some(url_decode(segment, encoding).replace('\t', " "))
}

/// `Content-Disposition` 값에서 지시자 값 추출 (대소문자 무시)
pub fn content_disposition_directive(disposition: &str, directive: &str) -> Option<String> {
    if directive.is_empty() {
        return None;
    }
    let pattern = format!(r#"(?i)^.*; {}="?([^"]+)"?.*$"#, regex::escape(directive));
    let regex = Regex::new(&pattern).ok()?;
    regex
        .captures(disposition)
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().to_string())
}

/// 응답 파일 이름: `filename*`, `filename`, URL 마지막 요소 순
pub(crate) fn resolve_file_name(
    url: &Url,
    disposition: Option<&str>,
    encoding: &'static Encoding,
) -> Option<String> {
    if let Some(disposition) = disposition {
        if let Some(value) = content_disposition_directive(disposition, "filename*") {
            // charset'language'value 형식
            let mut parts = value.splitn(3, '\'');
            if let (Some(charset), Some(_), Some(encoded)) = (parts.next(), parts.next(), parts.next())
            {
                let charset = Encoding::for_label(charset.as_bytes()).unwrap_or(encoding);
                return Some(url_decode(encoded, charset));
            }
            return Some(url_decode(&value, encoding));
        }
        if let Some(value) = content_disposition_directive(disposition, "filename") {
            return Some(url_decode(&value, encoding));
        }
    }
    file_name_from_url(url, encoding)
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
