use crate::request::ExportMode;

/// Work the crawler must carry out after a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ResolveNamespaces,
    ExportNamespace { namespace: i64, mode: ExportMode },
    AnnounceFallback { reason: String },
    /// Drive the whole namespace scope through the title source.
    ExportTitles {
        mode: ExportMode,
        start: Option<String>,
    },
    Finish,
    Abort { reason: String },
}
