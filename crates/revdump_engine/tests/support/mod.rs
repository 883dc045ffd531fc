#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use revdump_core::{ExportMode, ExportRequest, HttpMethod, NamespaceScope, Params};
use revdump_engine::{
    ApiClient, ApiError, ApiNamespaceSource, ApiTitleSource, CrawlerParts, FailureKind,
    MemoryErrorLog, RetryPolicy, RevisionCrawler, SourceError, TitleCursor, TitleSource,
    XmlRecordBuilder,
};
use serde_json::{json, Value};

pub const API: &str = "https://wiki.example.org/w/api.php";

/// Answers calls from a fixed script, in order, and records what was asked.
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<Value, ApiError>>>,
    calls: Mutex<Vec<(HttpMethod, Params)>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<Value, ApiError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(HttpMethod, Params)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ApiClient for ScriptedClient {
    async fn call(&self, method: HttpMethod, params: &Params) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push((method, params.clone()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted call: {method} {params:?}"))
    }
}

/// Title source over a fixed list.
pub struct ListTitles(pub Vec<String>);

struct ListCursor(VecDeque<String>);

#[async_trait::async_trait]
impl TitleCursor for ListCursor {
    async fn next_title(&mut self) -> Result<Option<String>, SourceError> {
        Ok(self.0.pop_front())
    }
}

#[async_trait::async_trait]
impl TitleSource for ListTitles {
    async fn open(
        &self,
        _request: &ExportRequest,
        start: Option<&str>,
    ) -> Result<Box<dyn TitleCursor>, SourceError> {
        let titles: VecDeque<String> = match start {
            Some(start) => self
                .0
                .iter()
                .skip_while(|title| title.as_str() != start)
                .cloned()
                .collect(),
            None => self.0.iter().cloned().collect(),
        };
        Ok(Box::new(ListCursor(titles)))
    }
}

pub fn request(namespaces: Vec<i64>, mode: ExportMode) -> ExportRequest {
    ExportRequest::new(API, NamespaceScope::Explicit(namespaces), mode).unwrap()
}

pub struct Harness {
    pub client: Arc<ScriptedClient>,
    pub errors: Arc<MemoryErrorLog>,
    pub crawler: RevisionCrawler,
}

pub fn harness(
    request: ExportRequest,
    titles: &[&str],
    responses: Vec<Result<Value, ApiError>>,
) -> Harness {
    let client = ScriptedClient::new(responses);
    let titles = Arc::new(ListTitles(titles.iter().map(|t| t.to_string()).collect()));
    assemble(request, client, titles)
}

/// Like [`harness`], but titles are listed through `list=allpages` on the
/// same scripted client.
pub fn harness_listing_titles(
    request: ExportRequest,
    responses: Vec<Result<Value, ApiError>>,
) -> Harness {
    let client = ScriptedClient::new(responses);
    let namespaces = Arc::new(
        ApiNamespaceSource::new(client.clone()).with_retry_policy(RetryPolicy::immediate()),
    );
    let titles = Arc::new(
        ApiTitleSource::new(client.clone(), namespaces)
            .with_retry_policy(RetryPolicy::immediate()),
    );
    assemble(request, client, titles)
}

fn assemble(
    request: ExportRequest,
    client: Arc<ScriptedClient>,
    titles: Arc<dyn TitleSource>,
) -> Harness {
    revdump_logging::initialize_for_tests();
    let errors = Arc::new(MemoryErrorLog::new());
    let parts = CrawlerParts {
        client: client.clone(),
        namespaces: Arc::new(
            ApiNamespaceSource::new(client.clone()).with_retry_policy(RetryPolicy::immediate()),
        ),
        titles,
        builder: Arc::new(XmlRecordBuilder),
        errors: errors.clone(),
    };
    let crawler = RevisionCrawler::new(request, parts, RetryPolicy::immediate());
    Harness {
        client,
        errors,
        crawler,
    }
}

pub async fn drain(crawler: &mut RevisionCrawler) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(fragment) = crawler.next_fragment().await.expect("no fatal error") {
        out.push(fragment);
    }
    out
}

pub fn status(code: u16) -> Result<Value, ApiError> {
    Err(ApiError::new(FailureKind::HttpStatus(code), format!("status {code}")))
}

pub fn timeout() -> Result<Value, ApiError> {
    Err(ApiError::new(FailureKind::Timeout, "operation timed out"))
}

pub fn revision(revid: u64, text: &str) -> Value {
    json!({
        "revid": revid,
        "parentid": revid.saturating_sub(1),
        "timestamp": "2024-01-01T00:00:00Z",
        "user": "Alice",
        "userid": 7,
        "size": text.len(),
        "sha1": "abc",
        "contentmodel": "wikitext",
        "comment": "edit",
        "*": text
    })
}

pub fn page(pageid: u64, title: &str, revisions: Vec<Value>) -> Value {
    json!({"pageid": pageid, "ns": 0, "title": title, "revisions": revisions})
}

/// An `allrevisions` page of results with an optional continuation token.
pub fn allrevisions(pages: Vec<Value>, next: Option<&str>) -> Result<Value, ApiError> {
    let mut body = json!({"query": {"allrevisions": pages}});
    if let Some(token) = next {
        body["continue"] = json!({"arvcontinue": token, "continue": "-||"});
    }
    Ok(body)
}

pub fn export_doc(title: &str, revid: u64) -> Result<Value, ApiError> {
    let xml = format!(
        "<mediawiki xmlns=\"http://www.mediawiki.org/xml/export-0.10/\" version=\"0.10\">\
         <siteinfo><sitename>Test</sitename></siteinfo>\
         <page><title>{title}</title><ns>0</ns><id>1</id>\
         <revision><id>{revid}</id><text xml:space=\"preserve\">body</text></revision>\
         </page></mediawiki>"
    );
    Ok(json!({"query": {"export": {"*": xml}}}))
}

pub fn param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).map(String::as_str)
}

pub fn title_of(fragment: &str) -> &str {
    let start = fragment.find("<title>").expect("title start") + "<title>".len();
    let end = fragment.find("</title>").expect("title end");
    &fragment[start..end]
}
