use std::str::FromStr;

use url::Url;

use crate::method::HttpMethod;

/// Which namespaces an export run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceScope {
    /// Every namespace the wiki reports.
    All,
    /// An explicit, ordered list of namespace ids.
    Explicit(Vec<i64>),
}

impl NamespaceScope {
    pub fn explicit(&self) -> Option<&[i64]> {
        match self {
            NamespaceScope::All => None,
            NamespaceScope::Explicit(ids) => Some(ids),
        }
    }
}

impl FromStr for NamespaceScope {
    type Err = RequestError;

    /// Accepts `all` or a comma separated list such as `0,1,14`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(NamespaceScope::All);
        }
        let mut ids: Vec<i64> = Vec::new();
        for part in trimmed.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("all") {
                return Ok(NamespaceScope::All);
            }
            let id = part
                .parse::<i64>()
                .map_err(|_| RequestError::InvalidNamespace(part.to_string()))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Err(RequestError::InvalidNamespace(s.to_string()));
        }
        Ok(NamespaceScope::Explicit(ids))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    CurrentOnly,
    FullHistory,
}

impl ExportMode {
    pub fn from_current_only(current_only: bool) -> Self {
        if current_only {
            ExportMode::CurrentOnly
        } else {
            ExportMode::FullHistory
        }
    }

    pub fn is_current_only(self) -> bool {
        self == ExportMode::CurrentOnly
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("invalid api endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("invalid namespace {0:?}")]
    InvalidNamespace(String),
    #[error("title batch size must be at least 1")]
    ZeroBatchSize,
}

/// Immutable configuration of one export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    api: Url,
    scope: NamespaceScope,
    mode: ExportMode,
    http_method: HttpMethod,
    resume_title: Option<String>,
    title_batch_size: usize,
}

impl ExportRequest {
    pub fn new(api: &str, scope: NamespaceScope, mode: ExportMode) -> Result<Self, RequestError> {
        let parsed = Url::parse(api).map_err(|err| RequestError::InvalidEndpoint {
            url: api.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RequestError::InvalidEndpoint {
                url: api.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        Ok(Self {
            api: parsed,
            scope,
            mode,
            http_method: HttpMethod::Post,
            resume_title: None,
            title_batch_size: 1,
        })
    }

    pub fn with_http_method(mut self, method: HttpMethod) -> Self {
        self.http_method = method;
        self
    }

    pub fn with_resume_title(mut self, title: Option<String>) -> Self {
        self.resume_title = title.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_title_batch_size(mut self, size: usize) -> Result<Self, RequestError> {
        if size == 0 {
            return Err(RequestError::ZeroBatchSize);
        }
        self.title_batch_size = size;
        Ok(self)
    }

    pub fn api(&self) -> &Url {
        &self.api
    }

    pub fn scope(&self) -> &NamespaceScope {
        &self.scope
    }

    pub fn mode(&self) -> ExportMode {
        self.mode
    }

    /// Preferred verb at the start of the run.
    pub fn http_method(&self) -> HttpMethod {
        self.http_method
    }

    pub fn resume_title(&self) -> Option<&str> {
        self.resume_title.as_deref()
    }

    pub fn title_batch_size(&self) -> usize {
        self.title_batch_size
    }
}
