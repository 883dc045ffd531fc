use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown http method {0:?}, expected GET or POST")]
pub struct ParseMethodError(pub String);

impl FromStr for HttpMethod {
    type Err = ParseMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            _ => Err(ParseMethodError(s.to_string())),
        }
    }
}

/// Run-scoped preferred HTTP verb.
///
/// The only transition is POST -> GET. Once a server has rejected POST the
/// run keeps using GET until it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodPreference {
    current: HttpMethod,
}

impl MethodPreference {
    pub fn new(initial: HttpMethod) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> HttpMethod {
        self.current
    }

    /// Switches POST to GET. Returns `false` when already on GET.
    pub fn downgrade(&mut self) -> bool {
        match self.current {
            HttpMethod::Post => {
                self.current = HttpMethod::Get;
                true
            }
            HttpMethod::Get => false,
        }
    }
}
