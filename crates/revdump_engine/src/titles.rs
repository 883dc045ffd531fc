use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::PathBuf;
use std::sync::Arc;

use revdump_core::{ContinuationCursor, ExportRequest, HttpMethod, Params};
use revdump_logging::{dump_debug, dump_warn};
use serde_json::Value;

use crate::client::ApiClient;
use crate::namespaces::NamespaceSource;
use crate::retry::{RetryPolicy, RetryingClient};
use crate::SourceError;

/// Ordered group of titles queried together.
pub type TitleBatch = Vec<String>;

/// Marker line written at the end of a complete titles file.
pub const TITLES_END_MARKER: &str = "--END--";

/// Lazy title sequence of one export run.
#[async_trait::async_trait]
pub trait TitleCursor: Send {
    async fn next_title(&mut self) -> Result<Option<String>, SourceError>;
}

/// Supplies page titles for the per-title strategy.
#[async_trait::async_trait]
pub trait TitleSource: Send + Sync {
    /// Opens a title sequence covering the request's namespace scope.
    /// With `start`, titles before its first occurrence are skipped.
    async fn open(
        &self,
        request: &ExportRequest,
        start: Option<&str>,
    ) -> Result<Box<dyn TitleCursor>, SourceError>;
}

/// Pulls up to `size` titles. `None` once the cursor is exhausted.
pub async fn next_group(
    cursor: &mut dyn TitleCursor,
    size: usize,
) -> Result<Option<TitleBatch>, SourceError> {
    let mut batch = Vec::with_capacity(size.max(1));
    while batch.len() < size.max(1) {
        match cursor.next_title().await? {
            Some(title) => batch.push(title),
            None => break,
        }
    }
    Ok((!batch.is_empty()).then_some(batch))
}

/// Skips titles until the resume point is seen.
struct ResumeCursor {
    inner: Box<dyn TitleCursor>,
    start: Option<String>,
}

impl ResumeCursor {
    fn wrap(inner: Box<dyn TitleCursor>, start: Option<&str>) -> Box<dyn TitleCursor> {
        match start {
            Some(start) => Box::new(Self {
                inner,
                start: Some(start.to_string()),
            }),
            None => inner,
        }
    }
}

#[async_trait::async_trait]
impl TitleCursor for ResumeCursor {
    async fn next_title(&mut self) -> Result<Option<String>, SourceError> {
        while let Some(start) = self.start.as_deref() {
            match self.inner.next_title().await? {
                Some(title) if title == start => {
                    self.start = None;
                    return Ok(Some(title));
                }
                Some(title) => dump_debug!("Skipping {} before resume point", title),
                None => {
                    dump_warn!("Resume title {:?} was never listed", start);
                    self.start = None;
                    return Ok(None);
                }
            }
        }
        self.inner.next_title().await
    }
}

/// Titles from a file with one title per line.
///
/// Reading stops at [`TITLES_END_MARKER`]. The file is assumed to already be
/// limited to the wanted namespaces.
pub struct FileTitleSource {
    path: PathBuf,
}

impl FileTitleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl TitleSource for FileTitleSource {
    async fn open(
        &self,
        _request: &ExportRequest,
        start: Option<&str>,
    ) -> Result<Box<dyn TitleCursor>, SourceError> {
        let file = File::open(&self.path)?;
        let cursor = FileTitleCursor {
            lines: BufReader::new(file).lines(),
            done: false,
        };
        Ok(ResumeCursor::wrap(Box::new(cursor), start))
    }
}

struct FileTitleCursor {
    lines: Lines<BufReader<File>>,
    done: bool,
}

#[async_trait::async_trait]
impl TitleCursor for FileTitleCursor {
    async fn next_title(&mut self) -> Result<Option<String>, SourceError> {
        while !self.done {
            let Some(line) = self.lines.next().transpose()? else {
                self.done = true;
                break;
            };
            let title = line.trim();
            if title == TITLES_END_MARKER {
                self.done = true;
            } else if !title.is_empty() {
                return Ok(Some(title.to_string()));
            }
        }
        Ok(None)
    }
}

/// Titles listed live with `list=allpages`, namespace by namespace.
///
/// Listing requests that time out are retried under the source's
/// [`RetryPolicy`], so a slow wiki does not end the export.
pub struct ApiTitleSource {
    client: Arc<dyn ApiClient>,
    namespaces: Arc<dyn NamespaceSource>,
    policy: RetryPolicy,
}

impl ApiTitleSource {
    pub fn new(client: Arc<dyn ApiClient>, namespaces: Arc<dyn NamespaceSource>) -> Self {
        Self {
            client,
            namespaces,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait::async_trait]
impl TitleSource for ApiTitleSource {
    async fn open(
        &self,
        request: &ExportRequest,
        start: Option<&str>,
    ) -> Result<Box<dyn TitleCursor>, SourceError> {
        let namespaces = self.namespaces.namespace_indices(request).await?;
        let cursor = AllPagesCursor {
            client: RetryingClient::new(self.client.clone(), self.policy.clone()),
            namespaces: namespaces.into(),
            current: None,
            buffered: VecDeque::new(),
        };
        Ok(ResumeCursor::wrap(Box::new(cursor), start))
    }
}

struct AllPagesCursor {
    client: RetryingClient,
    namespaces: VecDeque<i64>,
    /// Namespace being listed and the cursor for its next page, if any.
    current: Option<(i64, Option<ContinuationCursor>)>,
    buffered: VecDeque<String>,
}

impl AllPagesCursor {
    async fn fetch(
        &mut self,
        namespace: i64,
        cursor: Option<&ContinuationCursor>,
    ) -> Result<Option<ContinuationCursor>, SourceError> {
        let mut base = Params::new();
        base.insert("action".into(), "query".into());
        base.insert("list".into(), "allpages".into());
        base.insert("apnamespace".into(), namespace.to_string());
        base.insert("aplimit".into(), "500".into());
        let params = match cursor {
            Some(cursor) => cursor.apply(&base),
            None => base,
        };

        let response = self.client.call(HttpMethod::Get, &params).await?;
        let pages = response
            .get("query")
            .and_then(|query| query.get("allpages"))
            .and_then(Value::as_array)
            .ok_or_else(|| SourceError::Unexpected("allpages list missing".into()))?;
        self.buffered.extend(
            pages
                .iter()
                .filter_map(|page| page.get("title").and_then(Value::as_str))
                .map(ToOwned::to_owned),
        );
        Ok(ContinuationCursor::from_response(&response))
    }
}

#[async_trait::async_trait]
impl TitleCursor for AllPagesCursor {
    async fn next_title(&mut self) -> Result<Option<String>, SourceError> {
        loop {
            if let Some(title) = self.buffered.pop_front() {
                return Ok(Some(title));
            }
            match self.current.take() {
                Some((namespace, Some(cursor))) => {
                    let next = self.fetch(namespace, Some(&cursor)).await?;
                    self.current = Some((namespace, next));
                }
                Some((_, None)) | None => {
                    let Some(namespace) = self.namespaces.pop_front() else {
                        return Ok(None);
                    };
                    dump_debug!("Listing titles in namespace {}", namespace);
                    let next = self.fetch(namespace, None).await?;
                    self.current = Some((namespace, next));
                }
            }
        }
    }
}
