//! Store file persistence + HTTP fetch utilities for LOTO6 sync.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use loto6_core::DrawRecord;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "https://www.ohtashp.com/topics/takarakuji/loto6/";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Literal text before the JSON payload. Readers strip it verbatim.
pub const STORE_PREFIX: &str = "const LOTO6_DATA = ";
/// Literal text after the JSON payload.
pub const STORE_SUFFIX: &str = ";";

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Renders records inside the `const LOTO6_DATA = ...;` envelope.
///
/// The records are written in the order given; callers sort first.
pub fn render_store(records: &[DrawRecord]) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string_pretty(records)?;
    Ok(format!("{STORE_PREFIX}{json}{STORE_SUFFIX}"))
}

/// Parses store text. The envelope is optional so a bare JSON array also loads.
pub fn parse_store(text: &str) -> Result<Vec<DrawRecord>, serde_json::Error> {
    let body = text.trim_start_matches('\u{feff}').trim();
    let body = body.strip_prefix(STORE_PREFIX).unwrap_or(body).trim();
    let body = body.trim_end_matches(';').trim_end();
    serde_json::from_str(body)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reading store {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing store {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("encoding store records: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("writing store {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    pub content_hash: String,
    pub byte_size: usize,
}

/// The flat store file. It is only ever replaced as a whole.
#[derive(Debug, Clone)]
pub struct StoreFile {
    path: PathBuf,
}

impl StoreFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `Ok(None)` when the file does not exist.
    pub async fn load(&self) -> Result<Option<Vec<DrawRecord>>, StoreError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        parse_store(&text)
            .map(Some)
            .map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    /// Replace the file contents by writing a sibling temp file and renaming it over the target.
    pub async fn write(&self, records: &[DrawRecord]) -> Result<StoredFile, StoreError> {
        let content = render_store(records).map_err(StoreError::Encode)?;
        self.replace_contents(content.as_bytes())
            .await
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        Ok(StoredFile {
            path: self.path.clone(),
            content_hash: sha256_hex(content.as_bytes()),
            byte_size: content.len(),
        })
    }

    async fn replace_contents(&self, bytes: &[u8]) -> std::io::Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).await?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        let temp_path = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await?;
        let written = async {
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        let renamed = match written {
            Ok(()) => fs::rename(&temp_path, &self.path).await,
            Err(err) => Err(err),
        };
        if renamed.is_err() {
            let _ = fs::remove_file(&temp_path).await;
        }
        renamed
    }
}

/// How the charset of a fetched page was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetSource {
    ByteOrderMark,
    ContentTypeHeader,
    MetaTag,
    ValidUtf8,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct DecodedPage {
    pub text: String,
    pub encoding: &'static Encoding,
    pub charset_source: CharsetSource,
    /// Malformed byte sequences were replaced with U+FFFD.
    pub had_errors: bool,
}

const META_SNIFF_LIMIT: usize = 1024;

/// Decodes a page body: BOM, then the header charset, then a `<meta>` declaration,
/// then UTF-8 if valid, else Shift_JIS.
pub fn decode_page(body: &[u8], content_type: Option<&str>) -> DecodedPage {
    let (encoding, charset_source) = if let Some((enc, _)) = Encoding::for_bom(body) {
        (enc, CharsetSource::ByteOrderMark)
    } else if let Some(enc) = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        (enc, CharsetSource::ContentTypeHeader)
    } else if let Some(enc) = sniff_meta_charset(body) {
        (enc, CharsetSource::MetaTag)
    } else if std::str::from_utf8(body).is_ok() {
        (UTF_8, CharsetSource::ValidUtf8)
    } else {
        (SHIFT_JIS, CharsetSource::Fallback)
    };

    let (text, encoding, had_errors) = encoding.decode(body);
    DecodedPage {
        text: text.into_owned(),
        encoding,
        charset_source,
        had_errors,
    }
}

fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches(['"', '\'']);
        (!value.is_empty()).then_some(value)
    })
}

fn sniff_meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(META_SNIFF_LIMIT)];
    let head: Cow<'_, str> = String::from_utf8_lossy(head);
    let head = head.to_ascii_lowercase();

    let mut from = 0;
    while let Some(rel) = head[from..].find("<meta") {
        let start = from + rel;
        let end = head[start..].find('>').map_or(head.len(), |e| start + e);
        if let Some(enc) = charset_in_tag(&head[start..end])
            .and_then(|label| Encoding::for_label(label.as_bytes()))
        {
            return Some(enc);
        }
        from = end;
    }
    None
}

fn charset_in_tag(tag: &str) -> Option<&str> {
    let idx = tag.find("charset")?;
    let rest = tag[idx + "charset".len()..].trim_start();
    let rest = rest.strip_prefix('=')?.trim_start();
    let rest = rest.trim_start_matches(['"', '\'']);
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')))
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDisposition {
    Success,
    NotFound,
    Retryable,
}

/// Only 200 is success and only 404 is an authoritative miss; everything else is retried.
pub fn classify_status(status: u16) -> StatusDisposition {
    match status {
        200 => StatusDisposition::Success,
        404 => StatusDisposition::NotFound,
        _ => StatusDisposition::Retryable,
    }
}

/// Fixed pause between attempts of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }
}

impl BackoffPolicy {
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{0}")]
    Message(String),
}

/// One GET against the source. Implementations do not retry.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = resp.bytes().await?.to_vec();
        Ok(RawResponse {
            status,
            final_url,
            content_type,
            body,
        })
    }
}

/// Maps a calendar year to its result page.
#[derive(Debug, Clone)]
pub struct YearUrls {
    base_url: String,
}

impl Default for YearUrls {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl YearUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { base_url }
    }

    /// The current year lives on the index page; past years have their own archive page.
    pub fn url_for_year(&self, year: i32, current_year: i32) -> String {
        if year == current_year {
            self.base_url.clone()
        } else {
            format!("{}index_{year}.html", self.base_url)
        }
    }
}

#[derive(Debug, Clone)]
pub enum YearPage {
    Found {
        url: String,
        page: DecodedPage,
        attempts: usize,
    },
    /// The source answered 404 for this year.
    NotFound { url: String },
    /// Every attempt failed with a retryable status or transport error.
    Exhausted {
        url: String,
        attempts: usize,
        last_error: String,
    },
}

impl YearPage {
    pub fn url(&self) -> &str {
        match self {
            YearPage::Found { url, .. }
            | YearPage::NotFound { url }
            | YearPage::Exhausted { url, .. } => url,
        }
    }

    pub fn attempts(&self) -> usize {
        match self {
            YearPage::Found { attempts, .. } | YearPage::Exhausted { attempts, .. } => *attempts,
            YearPage::NotFound { .. } => 1,
        }
    }
}

/// Per-year page retrieval with the 404/200/retry status policy.
#[derive(Debug)]
pub struct FetchClient<S> {
    source: S,
    urls: YearUrls,
    backoff: BackoffPolicy,
}

impl<S: PageSource> FetchClient<S> {
    pub fn new(source: S, urls: YearUrls, backoff: BackoffPolicy) -> Self {
        Self {
            source,
            urls,
            backoff,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn fetch_year(&self, year: i32, current_year: i32) -> YearPage {
        let url = self.urls.url_for_year(year, current_year);
        let span = info_span!("http_fetch", year, url = %url);
        self.fetch_with_retries(url).instrument(span).await
    }

    async fn fetch_with_retries(&self, url: String) -> YearPage {
        let max_attempts = self.backoff.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.source.get(&url).await {
                Ok(resp) => match classify_status(resp.status) {
                    StatusDisposition::Success => {
                        let page = decode_page(&resp.body, resp.content_type.as_deref());
                        debug!(
                            encoding = page.encoding.name(),
                            charset_source = ?page.charset_source,
                            had_errors = page.had_errors,
                            bytes = resp.body.len(),
                            "decoded page"
                        );
                        return YearPage::Found {
                            url,
                            page,
                            attempts: attempt,
                        };
                    }
                    StatusDisposition::NotFound => {
                        info!("404 not found, skipping year");
                        return YearPage::NotFound { url };
                    }
                    StatusDisposition::Retryable => {
                        last_error = format!("http status {}", resp.status);
                    }
                },
                Err(err) => {
                    last_error = err.to_string();
                }
            }

            if attempt < max_attempts {
                warn!(attempt, max_attempts, error = %last_error, "fetch failed, retrying");
                tokio::time::sleep(self.backoff.delay).await;
            }
        }

        warn!(attempts = max_attempts, error = %last_error, "fetch retries exhausted");
        YearPage::Exhausted {
            url,
            attempts: max_attempts,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn record(round: u32, date: &str, numbers: [u8; 6], bonus: Option<u8>) -> DrawRecord {
        DrawRecord {
            round,
            date: date.to_string(),
            numbers,
            bonus,
        }
    }

    struct ScriptedSource {
        script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<RawResponse, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Message(format!("script empty for {url}"))))
        }
    }

    fn status(code: u16, body: &str) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status: code,
            final_url: "https://example.test/".into(),
            content_type: Some("text/html; charset=utf-8".into()),
            body: body.as_bytes().to_vec(),
        })
    }

    fn client(source: ScriptedSource) -> FetchClient<ScriptedSource> {
        FetchClient::new(
            source,
            YearUrls::new("https://example.test/loto6"),
            BackoffPolicy::fixed(3, Duration::ZERO),
        )
    }

    #[test]
    fn default_backoff_is_three_attempts_with_fixed_two_second_delay() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(2));
        assert_eq!(HttpClientConfig::default().backoff, policy);
    }

    #[test]
    fn status_policy_only_accepts_200_and_only_skips_404() {
        assert_eq!(classify_status(200), StatusDisposition::Success);
        assert_eq!(classify_status(404), StatusDisposition::NotFound);
        for code in [204, 301, 403, 429, 500, 503] {
            assert_eq!(classify_status(code), StatusDisposition::Retryable, "{code}");
        }
    }

    #[test]
    fn current_year_uses_index_and_past_years_use_archive_pages() {
        let urls = YearUrls::default();
        assert_eq!(
            urls.url_for_year(2024, 2024),
            "https://www.ohtashp.com/topics/takarakuji/loto6/"
        );
        assert_eq!(
            urls.url_for_year(2001, 2024),
            "https://www.ohtashp.com/topics/takarakuji/loto6/index_2001.html"
        );
        assert_eq!(
            YearUrls::new("http://mirror").url_for_year(2010, 2024),
            "http://mirror/index_2010.html"
        );
    }

    #[tokio::test]
    async fn not_found_short_circuits_after_one_attempt() {
        let source = ScriptedSource::new(vec![status(404, ""), status(200, "<table></table>")]);
        let fetch = client(source);
        let page = fetch.fetch_year(2001, 2024).await;

        assert!(matches!(page, YearPage::NotFound { .. }));
        assert_eq!(fetch.source().calls(), 1);
        assert_eq!(page.url(), "https://example.test/loto6/index_2001.html");
    }

    #[tokio::test]
    async fn retryable_statuses_are_retried_until_success() {
        let source = ScriptedSource::new(vec![
            status(500, "oops"),
            Err(TransportError::Message("connection reset".into())),
            status(200, "<p>ok</p>"),
        ]);
        let fetch = client(source);
        let page = fetch.fetch_year(2024, 2024).await;

        match page {
            YearPage::Found { page, attempts, url } => {
                assert_eq!(attempts, 3);
                assert_eq!(page.text, "<p>ok</p>");
                assert_eq!(url, "https://example.test/loto6/");
            }
            other => panic!("expected page, got {other:?}"),
        }
        assert_eq!(fetch.source().calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_report_last_error() {
        let source = ScriptedSource::new(vec![
            status(503, ""),
            status(503, ""),
            status(502, ""),
            status(200, "never reached"),
        ]);
        let fetch = client(source);
        let page = fetch.fetch_year(2005, 2024).await;

        match page {
            YearPage::Exhausted {
                attempts, last_error, ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "http status 502");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(fetch.source().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_sleeps_only_between_attempts() {
        let source = ScriptedSource::new(vec![status(500, ""), status(500, ""), status(500, "")]);
        let fetch = FetchClient::new(
            source,
            YearUrls::default(),
            BackoffPolicy::fixed(3, Duration::from_secs(2)),
        );
        let started = tokio::time::Instant::now();
        let page = fetch.fetch_year(2005, 2024).await;

        assert_eq!(page.attempts(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_does_not_sleep() {
        let fetch = FetchClient::new(
            ScriptedSource::new(vec![status(404, "")]),
            YearUrls::default(),
            BackoffPolicy::default(),
        );
        let started = tokio::time::Instant::now();
        fetch.fetch_year(2005, 2024).await;
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn zero_attempt_policy_still_tries_once() {
        let source = ScriptedSource::new(vec![status(500, "")]);
        let fetch = FetchClient::new(
            source,
            YearUrls::default(),
            BackoffPolicy::fixed(0, Duration::ZERO),
        );
        let page = fetch.fetch_year(2005, 2024).await;
        assert_eq!(page.attempts(), 1);
        assert_eq!(fetch.source().calls(), 1);
    }

    #[test]
    fn header_charset_wins_over_meta() {
        let (bytes, _, _) = SHIFT_JIS.encode("<meta charset=\"utf-8\"><td>第1回</td>");
        let page = decode_page(&bytes, Some("text/html; charset=Shift_JIS"));
        assert_eq!(page.encoding, SHIFT_JIS);
        assert_eq!(page.charset_source, CharsetSource::ContentTypeHeader);
        assert!(page.text.contains("第1回"));
        assert!(!page.had_errors);
    }

    #[test]
    fn meta_http_equiv_declaration_is_used_without_header_charset() {
        let html = "<html><head><META HTTP-EQUIV=\"Content-Type\" CONTENT=\"text/html; charset=EUC-JP\"></head><body>第2回</body></html>";
        let (bytes, _, _) = encoding_rs::EUC_JP.encode(html);
        let page = decode_page(&bytes, Some("text/html"));
        assert_eq!(page.encoding, encoding_rs::EUC_JP);
        assert_eq!(page.charset_source, CharsetSource::MetaTag);
        assert!(page.text.contains("第2回"));
    }

    #[test]
    fn undeclared_pages_fall_back_to_utf8_then_shift_jis() {
        let page = decode_page("<td>第3回</td>".as_bytes(), None);
        assert_eq!(page.charset_source, CharsetSource::ValidUtf8);
        assert_eq!(page.encoding, UTF_8);

        let (bytes, _, _) = SHIFT_JIS.encode("<td>第4回</td>");
        let page = decode_page(&bytes, None);
        assert_eq!(page.charset_source, CharsetSource::Fallback);
        assert_eq!(page.text, "<td>第4回</td>");
    }

    #[test]
    fn unknown_header_label_falls_through() {
        let page = decode_page(b"<p>1</p>", Some("text/html; charset=\"x-made-up\""));
        assert_eq!(page.charset_source, CharsetSource::ValidUtf8);
    }

    #[test]
    fn byte_order_mark_overrides_declarations() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("第5回".as_bytes());
        let page = decode_page(&bytes, Some("text/html; charset=Shift_JIS"));
        assert_eq!(page.charset_source, CharsetSource::ByteOrderMark);
        assert_eq!(page.text, "第5回");
    }

    #[test]
    fn store_envelope_is_exact() {
        let text = render_store(&[record(2, "2000/10/12", [2, 3, 4, 5, 6, 7], None)]).unwrap();
        let expected = "const LOTO6_DATA = [\n  {\n    \"round\": 2,\n    \"date\": \"2000/10/12\",\n    \"numbers\": [\n      2,\n      3,\n      4,\n      5,\n      6,\n      7\n    ],\n    \"bonus\": 0\n  }\n];";
        assert_eq!(text, expected);
        assert_eq!(render_store(&[]).unwrap(), "const LOTO6_DATA = [];");
    }

    #[test]
    fn non_ascii_dates_are_written_literally() {
        let text = render_store(&[record(9, "2000年12月7日", [1, 2, 3, 4, 5, 6], Some(7))]).unwrap();
        assert!(text.contains("\"2000年12月7日\""));
    }

    #[test]
    fn parse_accepts_enveloped_and_bare_payloads() {
        let records = vec![
            record(2, "2000/10/12", [2, 3, 4, 5, 6, 7], Some(8)),
            record(1, "2000/10/05", [1, 2, 3, 4, 5, 6], None),
        ];
        let text = render_store(&records).unwrap();
        assert_eq!(parse_store(&text).unwrap(), records);
        assert_eq!(parse_store(&format!("\u{feff}{text}\n")).unwrap(), records);

        let bare = parse_store(r#"[{"round":1,"date":"2000/10/05","numbers":[1,2,3,4,5,6],"bonus":0}]"#)
            .unwrap();
        assert_eq!(bare, vec![records[1].clone()]);

        assert!(parse_store("const LOTO6_DATA = [{\"round\": 1};").is_err());
    }

    #[tokio::test]
    async fn missing_store_loads_as_none() {
        let dir = tempdir().expect("tempdir");
        let store = StoreFile::new(dir.path().join("loto6_data.js"));
        assert!(store.load().await.expect("load").is_none());
    }

    #[tokio::test]
    async fn corrupt_store_is_a_parse_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("loto6_data.js");
        std::fs::write(&path, "const LOTO6_DATA = [oops];").unwrap();
        let err = StoreFile::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[tokio::test]
    async fn write_replaces_whole_file_and_leaves_no_temp_files() {
        let dir = tempdir().expect("tempdir");
        let store = StoreFile::new(dir.path().join("nested").join("loto6_data.js"));

        let first = vec![record(1, "2000/10/05", [1, 2, 3, 4, 5, 6], Some(7))];
        store.write(&first).await.expect("first write");

        let second = vec![
            record(2, "2000/10/12", [2, 3, 4, 5, 6, 7], Some(8)),
            record(1, "2000/10/05", [1, 2, 3, 4, 5, 6], Some(7)),
        ];
        let stored = store.write(&second).await.expect("second write");

        let on_disk = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(on_disk, render_store(&second).unwrap());
        assert_eq!(stored.content_hash, sha256_hex(on_disk.as_bytes()));
        assert_eq!(stored.byte_size, on_disk.len());
        assert_eq!(store.load().await.unwrap(), Some(second));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn content_hashing_is_stable() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
