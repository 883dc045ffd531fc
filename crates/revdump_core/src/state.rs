use crate::request::{ExportMode, ExportRequest, NamespaceScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One `list=allrevisions` stream per namespace.
    Bulk,
    /// Title enumeration, one query per title or title batch.
    PerTitle,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    ResolvingNamespaces,
    Bulk {
        namespaces: Vec<i64>,
        position: usize,
    },
    PerTitle,
    Finished,
    Aborted {
        reason: String,
    },
}

/// Strategy-level state of one export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlState {
    phase: Phase,
    mode: ExportMode,
    scope: NamespaceScope,
    resume_title: Option<String>,
    bulk_abandoned: bool,
}

impl CrawlState {
    pub fn new(request: &ExportRequest) -> Self {
        Self {
            phase: Phase::Idle,
            mode: request.mode(),
            scope: request.scope().clone(),
            resume_title: request.resume_title().map(ToOwned::to_owned),
            bulk_abandoned: false,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn mode(&self) -> ExportMode {
        self.mode
    }

    pub fn strategy(&self) -> Option<Strategy> {
        match self.phase {
            Phase::Bulk { .. } => Some(Strategy::Bulk),
            Phase::PerTitle => Some(Strategy::PerTitle),
            _ => None,
        }
    }

    pub fn current_namespace(&self) -> Option<i64> {
        match &self.phase {
            Phase::Bulk {
                namespaces,
                position,
            } => namespaces.get(*position).copied(),
            _ => None,
        }
    }

    /// True once bulk export was found unsupported. Never reset.
    pub fn bulk_abandoned(&self) -> bool {
        self.bulk_abandoned
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Finished | Phase::Aborted { .. })
    }

    pub(crate) fn scope(&self) -> &NamespaceScope {
        &self.scope
    }

    pub(crate) fn resume_title(&self) -> Option<&str> {
        self.resume_title.as_deref()
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn abandon_bulk(&mut self) {
        self.bulk_abandoned = true;
    }
}
