use revdump_core::{update, CrawlState, ExportMode, ExportRequest, Msg, NamespaceScope};

fn request() -> ExportRequest {
    ExportRequest::new(
        "https://wiki.example.org/w/api.php",
        NamespaceScope::Explicit(vec![0]),
        ExportMode::FullHistory,
    )
    .unwrap()
}

#[test]
fn messages_before_start_are_noops() {
    let state = CrawlState::new(&request());
    for msg in [
        Msg::NamespaceExhausted,
        Msg::TitlesExhausted,
        Msg::NamespacesResolved(vec![0, 1]),
        Msg::BulkUnsupported {
            reason: "missing key".into(),
        },
    ] {
        let (next, effects) = update(state.clone(), msg);
        assert_eq!(state, next);
        assert!(effects.is_empty());
    }
}
