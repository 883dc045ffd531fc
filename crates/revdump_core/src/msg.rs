/// Events reported by the crawler back into the strategy state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// The run begins.
    Start,
    /// The namespace source answered an `all` scope.
    NamespacesResolved(Vec<i64>),
    /// The bulk stream of the current namespace has no continuation left.
    NamespaceExhausted,
    /// The server does not support the bulk revisions query.
    BulkUnsupported { reason: String },
    /// The title source has no titles left.
    TitlesExhausted,
    /// The client cannot continue against this server.
    Fatal { reason: String },
}
