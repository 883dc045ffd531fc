//! Pull-based revision export.
//!
//! [`RevisionCrawler`] turns a wiki into a sequence of `<page>` fragments.
//! Strategy decisions (bulk per namespace, per-title fallback, abort) come
//! from the pure state machine in `revdump_core`; this module executes the
//! resulting effects and runs the pagination loops. Revision queries and
//! exports go through a [`RequestRunner`]; the namespace and title sources
//! retry their own listing reads. Calls are strictly sequential, and no
//! revision request is issued before the fragments of the previous response
//! have been handed out.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use futures_util::Stream;
use revdump_core::{
    update, CallOutcome, ContinuationCursor, CrawlState, Effect, ExportMode, ExportRequest, Msg,
    Params, Strategy,
};
use revdump_logging::{dump_debug, dump_error, dump_info, dump_warn};
use serde_json::Value;

use crate::client::ApiClient;
use crate::errlog::ErrorLog;
use crate::namespaces::NamespaceSource;
use crate::record::RecordBuilder;
use crate::retry::{CallStats, RequestRunner, RetryPolicy};
use crate::titles::{next_group, TitleBatch, TitleCursor, TitleSource};
use crate::CrawlError;

const REVISION_PROPS: &str =
    "ids|timestamp|user|userid|size|sha1|contentmodel|comment|content|flags";
const BULK_LIMIT: &str = "50";
const PROGRESS_EVERY: u64 = 10;

/// Collaborators a crawler needs besides the request itself.
#[derive(Clone)]
pub struct CrawlerParts {
    pub client: Arc<dyn ApiClient>,
    pub namespaces: Arc<dyn NamespaceSource>,
    pub titles: Arc<dyn TitleSource>,
    pub builder: Arc<dyn RecordBuilder>,
    pub errors: Arc<dyn ErrorLog>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrawlSummary {
    /// Fragments handed to the caller.
    pub fragments: u64,
    /// Items logged to the error log and left out.
    pub skipped: u64,
    /// Titles processed by the per-title strategy.
    pub titles: u64,
    pub strategy: Option<Strategy>,
    pub fell_back: bool,
    pub calls: CallStats,
}

struct BulkLoop {
    namespace: i64,
    mode: ExportMode,
    cursor: Option<ContinuationCursor>,
    started: bool,
    /// Revision ids listed but not yet exported (current-only listing).
    revids: VecDeque<String>,
    /// Pages whose latest revision is already queued.
    seen_pages: HashSet<String>,
}

impl BulkLoop {
    fn new(namespace: i64, mode: ExportMode) -> Self {
        Self {
            namespace,
            mode,
            cursor: None,
            started: false,
            revids: VecDeque::new(),
            seen_pages: HashSet::new(),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.started && self.cursor.is_none() && self.revids.is_empty()
    }

    fn params(&self) -> Params {
        let mut base = params(&[
            ("action", "query"),
            ("list", "allrevisions"),
            ("arvlimit", BULK_LIMIT),
        ]);
        base.insert("arvnamespace".into(), self.namespace.to_string());
        match self.mode {
            ExportMode::FullHistory => {
                base.insert("arvprop".into(), REVISION_PROPS.into());
                base.insert("arvslots".into(), "main".into());
            }
            // Only the ids; content comes from one raw export per revision.
            ExportMode::CurrentOnly => {
                base.insert("arvprop".into(), "ids".into());
            }
        }
        match &self.cursor {
            Some(cursor) => cursor.apply(&base),
            None => base,
        }
    }
}

struct BatchLoop {
    titles: TitleBatch,
    cursor: Option<ContinuationCursor>,
    started: bool,
}

impl BatchLoop {
    fn new(titles: TitleBatch) -> Self {
        Self {
            titles,
            cursor: None,
            started: false,
        }
    }

    fn label(&self) -> String {
        self.titles.join("; ")
    }

    fn params(&self) -> Params {
        let mut base = params(&[
            ("action", "query"),
            ("prop", "revisions"),
            ("rvprop", REVISION_PROPS),
            ("rvslots", "main"),
        ]);
        base.insert("titles".into(), self.titles.join("|"));
        // rvlimit is only accepted for a single page; batches get the latest
        // revision of each page.
        if self.titles.len() == 1 {
            base.insert("rvlimit".into(), BULK_LIMIT.into());
            base.insert("rvdir".into(), "newer".into());
        }
        match &self.cursor {
            Some(cursor) => cursor.apply(&base),
            None => base,
        }
    }
}

enum Work {
    Idle,
    Bulk(BulkLoop),
    CurrentTitles(Box<dyn TitleCursor>),
    HistoryTitles {
        titles: Box<dyn TitleCursor>,
        batch: Option<BatchLoop>,
    },
}

pub struct RevisionCrawler {
    request: ExportRequest,
    runner: RequestRunner,
    parts: CrawlerParts,
    state: CrawlState,
    effects: VecDeque<Effect>,
    work: Work,
    pending: VecDeque<String>,
    started: bool,
    done: bool,
    failure: Option<CrawlError>,
    summary: CrawlSummary,
}

impl RevisionCrawler {
    pub fn new(request: ExportRequest, parts: CrawlerParts, policy: RetryPolicy) -> Self {
        let runner = RequestRunner::new(parts.client.clone(), request.http_method(), policy);
        Self {
            state: CrawlState::new(&request),
            request,
            runner,
            parts,
            effects: VecDeque::new(),
            work: Work::Idle,
            pending: VecDeque::new(),
            started: false,
            done: false,
            failure: None,
            summary: CrawlSummary::default(),
        }
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn summary(&self) -> CrawlSummary {
        CrawlSummary {
            calls: self.runner.stats(),
            ..self.summary
        }
    }

    /// Next fragment of the export, `Ok(None)` at the end of the wiki.
    ///
    /// A fatal error is returned once; afterwards the crawler is exhausted
    /// and keeps returning `Ok(None)`.
    pub async fn next_fragment(&mut self) -> Result<Option<String>, CrawlError> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                self.summary.fragments += 1;
                return Ok(Some(fragment));
            }
            if self.done {
                return Ok(None);
            }
            if !self.started {
                self.started = true;
                self.dispatch(Msg::Start);
                continue;
            }
            if let Some(effect) = self.effects.pop_front() {
                self.apply(effect).await?;
                continue;
            }
            self.step().await;
        }
    }

    /// Wraps the crawler as a stream that ends after the last fragment or
    /// after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<String, CrawlError>> + Send {
        futures_util::stream::unfold(Some(self), |crawler| async move {
            let mut crawler = crawler?;
            match crawler.next_fragment().await {
                Ok(Some(fragment)) => Some((Ok(fragment), Some(crawler))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    fn dispatch(&mut self, msg: Msg) {
        let (next, effects) = update(self.state.clone(), msg);
        self.state = next;
        if let Some(strategy) = self.state.strategy() {
            self.summary.strategy = Some(strategy);
        }
        self.effects.extend(effects);
    }

    fn fail(&mut self, error: CrawlError) {
        let reason = error.to_string();
        self.failure = Some(error);
        self.dispatch(Msg::Fatal { reason });
    }

    async fn apply(&mut self, effect: Effect) -> Result<(), CrawlError> {
        match effect {
            Effect::ResolveNamespaces => {
                match self.parts.namespaces.namespace_indices(&self.request).await {
                    Ok(namespaces) => self.dispatch(Msg::NamespacesResolved(namespaces)),
                    Err(err) => self.fail(CrawlError::Namespaces(err.to_string())),
                }
            }
            Effect::ExportNamespace { namespace, mode } => {
                dump_info!("Trying to export all revisions from namespace {}", namespace);
                self.work = Work::Bulk(BulkLoop::new(namespace, mode));
            }
            Effect::AnnounceFallback { reason } => {
                dump_warn!("{}", reason);
                dump_warn!(
                    "Could not use allrevisions, the wiki may be too old. Falling back to titles"
                );
                self.summary.fell_back = true;
                self.work = Work::Idle;
            }
            Effect::ExportTitles { mode, start } => {
                match self.parts.titles.open(&self.request, start.as_deref()).await {
                    Ok(titles) => {
                        self.work = match mode {
                            ExportMode::CurrentOnly => {
                                dump_info!("Getting titles to export the latest revision for each");
                                Work::CurrentTitles(titles)
                            }
                            ExportMode::FullHistory => {
                                dump_info!("Getting titles to export all the revisions of each");
                                Work::HistoryTitles {
                                    titles,
                                    batch: None,
                                }
                            }
                        };
                    }
                    Err(err) => self.fail(CrawlError::Titles(err.to_string())),
                }
            }
            Effect::Finish => {
                dump_info!(
                    "Export finished: {} fragments, {} skipped",
                    self.summary.fragments + self.pending.len() as u64,
                    self.summary.skipped
                );
                self.done = true;
                self.work = Work::Idle;
            }
            Effect::Abort { reason } => {
                let error = self
                    .failure
                    .take()
                    .unwrap_or(CrawlError::Incompatible(reason));
                dump_error!("{}", error);
                dump_error!("{}", error.exit_notice());
                self.done = true;
                self.work = Work::Idle;
                self.effects.clear();
                return Err(error);
            }
        }
        Ok(())
    }

    /// Issues at most one query or export request. Pulling the next title
    /// may fetch a listing page first, so a per-title step can make two
    /// calls, one after the other.
    async fn step(&mut self) {
        match std::mem::replace(&mut self.work, Work::Idle) {
            Work::Idle => {
                // Nothing scheduled and no effect pending: nothing can make progress.
                dump_warn!("Crawler has no work left; stopping");
                self.done = true;
            }
            Work::Bulk(bulk) => self.step_bulk(bulk).await,
            Work::CurrentTitles(titles) => self.step_current_title(titles).await,
            Work::HistoryTitles { titles, batch } => self.step_history(titles, batch).await,
        }
    }

    async fn step_bulk(&mut self, mut bulk: BulkLoop) {
        if let Some(revid) = bulk.revids.pop_front() {
            let params = params(&[
                ("action", "query"),
                ("export", "1"),
                ("revids", revid.as_str()),
            ]);
            let context = format!("revision {revid}");
            self.export_raw(&params, &context).await;
            self.work = Work::Bulk(bulk);
            return;
        }
        if bulk.is_exhausted() {
            dump_debug!("Namespace {} done", bulk.namespace);
            self.dispatch(Msg::NamespaceExhausted);
            return;
        }

        let response = match self.runner.call(&bulk.params()).await {
            CallOutcome::Ok(response) => response,
            CallOutcome::Unsupported(reason) => {
                self.dispatch(Msg::BulkUnsupported { reason });
                return;
            }
            CallOutcome::Transient(reason) => {
                self.fail(CrawlError::RetriesExhausted(reason));
                return;
            }
            CallOutcome::Fatal(reason) => {
                self.fail(CrawlError::Incompatible(reason));
                return;
            }
        };

        let Some(pages) = response
            .get("query")
            .and_then(|query| query.get("allrevisions"))
            .and_then(Value::as_array)
        else {
            self.dispatch(Msg::BulkUnsupported {
                reason: "response has no query.allrevisions list".into(),
            });
            return;
        };

        match bulk.mode {
            ExportMode::FullHistory => {
                for page in pages {
                    let context = page_label(page);
                    self.build_api_record(page, &context);
                }
            }
            ExportMode::CurrentOnly => {
                for page in pages {
                    let label = page_label(page);
                    let key = page.get("pageid").map_or_else(|| label.clone(), Value::to_string);
                    // Later listing pages carry older revisions of pages already queued.
                    if !bulk.seen_pages.insert(key) {
                        continue;
                    }
                    match newest_revid(page) {
                        Some(revid) => bulk.revids.push_back(revid),
                        None => self.skip(&label, "Error: empty revision from API"),
                    }
                }
                if let Some(last) = bulk.revids.back() {
                    dump_info!("{} more revisions listed, until {}", bulk.revids.len(), last);
                }
            }
        }

        // Only a successful response moves the cursor, so a retried call
        // is never applied twice.
        bulk.cursor = ContinuationCursor::from_response(&response);
        bulk.started = true;
        self.work = Work::Bulk(bulk);
    }

    async fn step_current_title(&mut self, mut titles: Box<dyn TitleCursor>) {
        match titles.next_title().await {
            Ok(Some(title)) => {
                dump_info!("    {}", title);
                let params = params(&[
                    ("action", "query"),
                    ("export", "1"),
                    ("titles", title.as_str()),
                ]);
                self.export_raw(&params, &title).await;
                self.count_titles(1);
                self.work = Work::CurrentTitles(titles);
            }
            Ok(None) => self.dispatch(Msg::TitlesExhausted),
            Err(err) => self.fail(CrawlError::Titles(err.to_string())),
        }
    }

    async fn step_history(&mut self, mut titles: Box<dyn TitleCursor>, batch: Option<BatchLoop>) {
        let Some(mut batch) = batch else {
            match next_group(titles.as_mut(), self.request.title_batch_size()).await {
                Ok(Some(group)) => {
                    for title in &group {
                        dump_info!("    {}", title);
                    }
                    self.work = Work::HistoryTitles {
                        titles,
                        batch: Some(BatchLoop::new(group)),
                    };
                }
                Ok(None) => self.dispatch(Msg::TitlesExhausted),
                Err(err) => self.fail(CrawlError::Titles(err.to_string())),
            }
            return;
        };

        if batch.started && batch.cursor.is_none() {
            self.count_titles(batch.titles.len() as u64);
            self.work = Work::HistoryTitles {
                titles,
                batch: None,
            };
            return;
        }

        let keep_batch = match self.runner.call(&batch.params()).await {
            CallOutcome::Ok(response) => match response_pages(&response) {
                Some(pages) => {
                    let label = batch.label();
                    for page in pages {
                        self.build_api_record(page, &label);
                    }
                    batch.cursor = ContinuationCursor::from_response(&response);
                    batch.started = true;
                    if batch.cursor.is_some() {
                        dump_info!("Getting more revisions for the page");
                    }
                    true
                }
                None => {
                    self.skip(&batch.label(), "Error: page inaccessible? Could not export page");
                    false
                }
            },
            CallOutcome::Unsupported(reason) | CallOutcome::Transient(reason) => {
                self.skip(&batch.label(), &format!("Could not export page: {reason}"));
                false
            }
            CallOutcome::Fatal(reason) => {
                self.fail(CrawlError::Incompatible(reason));
                return;
            }
        };

        let batch = if keep_batch {
            Some(batch)
        } else {
            self.count_titles(batch.titles.len() as u64);
            None
        };
        self.work = Work::HistoryTitles { titles, batch };
    }

    /// One `export=1` request whose embedded document becomes one fragment.
    async fn export_raw(&mut self, params: &Params, context: &str) {
        match self.runner.call(params).await {
            CallOutcome::Ok(response) => match export_xml(&response) {
                Some(xml) => match self.parts.builder.from_raw_export(xml) {
                    Ok(fragment) => self.pending.push_back(fragment),
                    Err(err) => self.skip(context, &format!("Could not export page: {err}")),
                },
                None => self.skip(context, "Could not export page: response has no export data"),
            },
            CallOutcome::Unsupported(reason) | CallOutcome::Transient(reason) => {
                self.skip(context, &format!("Could not export page: {reason}"));
            }
            CallOutcome::Fatal(reason) => self.fail(CrawlError::Incompatible(reason)),
        }
    }

    fn build_api_record(&mut self, page: &Value, context: &str) {
        match self.parts.builder.from_api_record(page) {
            Ok(fragment) => self.pending.push_back(fragment),
            Err(err) => self.skip(
                context,
                &format!("Error: empty revision from API. Could not export page: {err}"),
            ),
        }
    }

    fn skip(&mut self, context: &str, message: &str) {
        dump_warn!("{}: {}", context, message);
        self.parts.errors.log(context, message);
        self.summary.skipped += 1;
    }

    fn count_titles(&mut self, count: u64) {
        let before = self.summary.titles;
        self.summary.titles += count;
        if before / PROGRESS_EVERY != self.summary.titles / PROGRESS_EVERY {
            dump_info!("-> Downloaded {} pages", self.summary.titles);
        }
    }
}

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn page_label(page: &Value) -> String {
    page.get("title")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .or_else(|| page.get("pageid").map(|id| format!("page id {id}")))
        .unwrap_or_else(|| "<unknown page>".to_string())
}

/// `query.pages` is keyed by page id in formatversion 1 and a list in 2.
fn response_pages(response: &Value) -> Option<Vec<&Value>> {
    match response.get("query")?.get("pages")? {
        Value::Object(map) => Some(map.values().collect()),
        Value::Array(items) => Some(items.iter().collect()),
        _ => None,
    }
}

/// Highest revision id of a listed page, which is its current revision.
fn newest_revid(page: &Value) -> Option<String> {
    page.get("revisions")?
        .as_array()?
        .iter()
        .filter_map(|rev| match rev.get("revid")? {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.parse().ok(),
            _ => None,
        })
        .max()
        .map(|revid| revid.to_string())
}

fn export_xml(response: &Value) -> Option<&str> {
    let export = response.get("query")?.get("export")?;
    export
        .as_str()
        .or_else(|| export.get("*").and_then(Value::as_str))
}
