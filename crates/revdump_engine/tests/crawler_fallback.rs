mod support;

use pretty_assertions::assert_eq;
use revdump_core::{ExportMode, HttpMethod, Strategy};
use revdump_engine::{ApiError, CrawlError, FailureKind};
use serde_json::{json, Value};
use support::*;

fn no_allrevisions() -> Result<Value, ApiError> {
    Ok(json!({
        "warnings": {"query": {"*": "Unrecognized value for parameter 'list': allrevisions"}}
    }))
}

fn pages(entries: Vec<Value>) -> Value {
    let mut map = serde_json::Map::new();
    for entry in entries {
        let id = entry["pageid"].to_string();
        map.insert(id, entry);
    }
    json!({"query": {"pages": map}})
}

fn titles_sent(calls: &[(HttpMethod, revdump_core::Params)]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|(_, params)| param(params, "titles").map(ToOwned::to_owned))
        .collect()
}

#[tokio::test]
async fn missing_allrevisions_switches_whole_run_to_titles() {
    let mut h = harness(
        request(vec![0, 1, 2], ExportMode::FullHistory),
        &["A", "B"],
        vec![
            no_allrevisions(),
            Ok(pages(vec![page(1, "A", vec![revision(1, "a")])])),
            Ok(pages(vec![page(2, "B", vec![revision(2, "b")])])),
        ],
    );

    let fragments = drain(&mut h.crawler).await;
    assert_eq!(
        fragments.iter().map(|f| title_of(f)).collect::<Vec<_>>(),
        vec!["A", "B"]
    );

    let calls = h.client.calls();
    assert_eq!(calls.len(), 3);
    let bulk_calls = calls
        .iter()
        .filter(|(_, params)| param(params, "list") == Some("allrevisions"))
        .count();
    assert_eq!(bulk_calls, 1, "bulk is not retried for later namespaces");
    assert_eq!(titles_sent(&calls), vec!["A", "B"]);
    assert_eq!(param(&calls[1].1, "prop"), Some("revisions"));
    assert_eq!(param(&calls[1].1, "rvlimit"), Some("50"));

    let summary = h.crawler.summary();
    assert!(summary.fell_back);
    assert_eq!(summary.strategy, Some(Strategy::PerTitle));
    assert_eq!(summary.titles, 2);
}

#[tokio::test]
async fn fallback_mid_scope_restarts_from_the_first_title() {
    let mut h = harness(
        request(vec![0, 1], ExportMode::FullHistory),
        &["Main", "Talk:Main"],
        vec![
            allrevisions(vec![page(1, "Main", vec![revision(1, "m")])], None),
            Err(ApiError::new(FailureKind::Malformed, "not json")),
            Ok(pages(vec![page(1, "Main", vec![revision(1, "m")])])),
            Ok(pages(vec![page(2, "Talk:Main", vec![revision(2, "t")])])),
        ],
    );

    let fragments = drain(&mut h.crawler).await;
    assert_eq!(
        fragments.iter().map(|f| title_of(f)).collect::<Vec<_>>(),
        vec!["Main", "Main", "Talk:Main"]
    );
    assert_eq!(titles_sent(&h.client.calls()), vec!["Main", "Talk:Main"]);
}

#[tokio::test]
async fn current_only_titles_yield_one_fragment_each() {
    let mut h = harness(
        request(vec![0], ExportMode::CurrentOnly),
        &["A", "B", "C"],
        vec![
            no_allrevisions(),
            export_doc("A", 1),
            status(404),
            export_doc("C", 3),
        ],
    );

    let fragments = drain(&mut h.crawler).await;
    assert_eq!(
        fragments.iter().map(|f| title_of(f)).collect::<Vec<_>>(),
        vec!["A", "C"]
    );

    let calls = h.client.calls();
    assert_eq!(titles_sent(&calls), vec!["A", "B", "C"]);
    assert!(calls[1..]
        .iter()
        .all(|(_, params)| param(params, "export") == Some("1")));
    let errors = h.errors.entries();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "B");
    assert_eq!(h.crawler.summary().titles, 3);
}

#[tokio::test]
async fn history_loop_follows_modern_then_legacy_continuation() {
    let mut first = pages(vec![page(1, "A", vec![revision(1, "one")])]);
    first["continue"] = json!({"rvcontinue": "20240101|2", "continue": "||"});
    let mut second = pages(vec![page(1, "A", vec![revision(2, "two")])]);
    second["query-continue"] = json!({"revisions": {"rvstartid": 3}});
    let third = pages(vec![page(1, "A", vec![revision(3, "three")])]);

    let mut h = harness(
        request(vec![0], ExportMode::FullHistory),
        &["A"],
        vec![no_allrevisions(), Ok(first), Ok(second), Ok(third)],
    );
    let fragments = drain(&mut h.crawler).await;

    assert_eq!(fragments.len(), 3);
    assert!(fragments[0].contains("<id>1</id>"));
    assert!(fragments[2].contains("three"));

    let calls = h.client.calls();
    assert_eq!(param(&calls[1].1, "rvcontinue"), None);
    assert_eq!(param(&calls[2].1, "rvcontinue"), Some("20240101|2"));
    assert_eq!(param(&calls[3].1, "rvstartid"), Some("3"));
    assert_eq!(
        param(&calls[3].1, "rvcontinue"),
        None,
        "continuation keys from an earlier response must not linger"
    );
    assert_eq!(h.crawler.summary().titles, 1);
}

#[tokio::test]
async fn missing_pages_key_abandons_only_that_batch() {
    let mut first = pages(vec![page(1, "A", vec![revision(1, "one")])]);
    first["continue"] = json!({"rvcontinue": "x", "continue": "||"});

    let mut h = harness(
        request(vec![0], ExportMode::FullHistory),
        &["A", "B"],
        vec![
            no_allrevisions(),
            Ok(first),
            Ok(json!({"batchcomplete": ""})),
            Ok(pages(vec![page(2, "B", vec![revision(9, "b")])])),
        ],
    );
    let fragments = drain(&mut h.crawler).await;

    assert_eq!(
        fragments.iter().map(|f| title_of(f)).collect::<Vec<_>>(),
        vec!["A", "B"]
    );
    let errors = h.errors.entries();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "A");
    assert!(errors[0].1.contains("inaccessible"));
}

#[tokio::test]
async fn batches_join_titles_and_drop_rvlimit() {
    let req = request(vec![0], ExportMode::FullHistory)
        .with_title_batch_size(2)
        .unwrap();
    let mut h = harness(
        req,
        &["A", "B", "C"],
        vec![
            no_allrevisions(),
            Ok(pages(vec![
                page(1, "A", vec![revision(1, "a")]),
                page(2, "B", vec![revision(2, "b")]),
            ])),
            Ok(pages(vec![page(3, "C", vec![revision(3, "c")])])),
        ],
    );
    let fragments = drain(&mut h.crawler).await;
    assert_eq!(fragments.len(), 3);

    let calls = h.client.calls();
    assert_eq!(titles_sent(&calls), vec!["A|B", "C"]);
    assert_eq!(param(&calls[1].1, "rvlimit"), None);
    assert_eq!(param(&calls[2].1, "rvlimit"), Some("50"));
}

#[tokio::test]
async fn resume_title_seeds_the_title_source() {
    let req = request(vec![0], ExportMode::CurrentOnly).with_resume_title(Some("B".into()));
    let mut h = harness(
        req,
        &["A", "B", "C"],
        vec![no_allrevisions(), export_doc("B", 2), export_doc("C", 3)],
    );
    let fragments = drain(&mut h.crawler).await;
    assert_eq!(
        fragments.iter().map(|f| title_of(f)).collect::<Vec<_>>(),
        vec!["B", "C"]
    );
}

#[tokio::test]
async fn denied_api_access_aborts_the_run() {
    let mut h = harness(
        request(vec![0], ExportMode::FullHistory),
        &["A", "B"],
        vec![
            no_allrevisions(),
            Err(ApiError::new(
                FailureKind::Api {
                    code: "readapidenied".into(),
                },
                "You need read permission",
            )),
        ],
    );

    let err = h.crawler.next_fragment().await.unwrap_err();
    assert!(matches!(err, CrawlError::Incompatible(ref reason) if reason.contains("read permission")));
    assert_eq!(h.crawler.next_fragment().await.unwrap(), None);
    assert_eq!(h.client.calls().len(), 2);
    assert!(h.crawler.state().is_terminal());
}

#[tokio::test]
async fn method_rejected_on_get_is_fatal() {
    let req = request(vec![0], ExportMode::FullHistory).with_http_method(HttpMethod::Get);
    let mut h = harness(req, &[], vec![status(405)]);

    let err = h.crawler.next_fragment().await.unwrap_err();
    assert!(matches!(err, CrawlError::Incompatible(_)));
    assert_eq!(h.client.calls().len(), 1);
}

#[tokio::test]
async fn title_listing_timeout_is_retried_not_fatal() {
    let mut h = harness_listing_titles(
        request(vec![0], ExportMode::CurrentOnly),
        vec![
            no_allrevisions(),
            timeout(),
            Ok(json!({"query": {"allpages": [{"title": "Alpha"}, {"title": "Beta"}]}})),
            export_doc("Alpha", 1),
            export_doc("Beta", 2),
        ],
    );

    let fragments = drain(&mut h.crawler).await;
    assert_eq!(
        fragments.iter().map(|f| title_of(f)).collect::<Vec<_>>(),
        vec!["Alpha", "Beta"]
    );

    let calls = h.client.calls();
    assert_eq!(param(&calls[1].1, "list"), Some("allpages"));
    assert_eq!(calls[1], calls[2], "the listing request is re-sent unchanged");
    assert!(h.errors.entries().is_empty());
}

#[tokio::test]
async fn batch_pages_keep_server_order() {
    let req = request(vec![0], ExportMode::FullHistory)
        .with_title_batch_size(2)
        .unwrap();
    // Keyed by page id; "10" sorts before "9" as a string.
    let body = r#"{"query": {"pages": {
        "9": {"pageid": 9, "ns": 0, "title": "Nine", "revisions": [
            {"revid": 90, "timestamp": "2024-01-01T00:00:00Z", "user": "A", "*": "nine"}
        ]},
        "10": {"pageid": 10, "ns": 0, "title": "Ten", "revisions": [
            {"revid": 100, "timestamp": "2024-01-01T00:00:00Z", "user": "A", "*": "ten"}
        ]}
    }}}"#;
    let mut h = harness(
        req,
        &["Nine", "Ten"],
        vec![no_allrevisions(), Ok(serde_json::from_str(body).unwrap())],
    );

    let fragments = drain(&mut h.crawler).await;
    assert_eq!(
        fragments.iter().map(|f| title_of(f)).collect::<Vec<_>>(),
        vec!["Nine", "Ten"]
    );
}
