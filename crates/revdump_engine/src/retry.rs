use std::sync::Arc;
use std::time::Duration;

use revdump_core::{CallOutcome, HttpMethod, MethodPreference, Params};
use revdump_logging::{dump_debug, dump_warn};
use serde_json::Value;

use crate::client::ApiClient;
use crate::{ApiError, FailureKind};

/// API error codes that mean the server is busy rather than unwilling.
const TRANSIENT_API_CODES: &[&str] = &["maxlag", "ratelimited", "readonly"];
/// API error codes that mean this client will never get an answer.
const FATAL_API_CODES: &[&str] = &["readapidenied", "mwoauth-invalid-authorization"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before re-issuing a request that failed transiently.
    pub cooldown: Duration,
    /// `None` retries without limit.
    pub max_cooldowns: Option<u32>,
    /// Pause before every request, for politeness towards the wiki.
    pub request_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(20),
            max_cooldowns: None,
            request_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// No waiting anywhere; retries stay unbounded.
    pub fn immediate() -> Self {
        Self {
            cooldown: Duration::ZERO,
            max_cooldowns: None,
            request_delay: Duration::ZERO,
        }
    }

    fn allows_cooldown(&self, used: u32) -> bool {
        self.max_cooldowns.map_or(true, |max| used < max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallStats {
    /// Requests handed to the client, retries included.
    pub requests: u64,
    pub cooldowns: u64,
    pub downgrades: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    DowngradeMethod,
    Cooldown,
    Unsupported,
    Fatal,
}

pub(crate) fn classify(err: &ApiError, method: HttpMethod) -> Disposition {
    match &err.kind {
        FailureKind::HttpStatus(405) => match method {
            HttpMethod::Post => Disposition::DowngradeMethod,
            HttpMethod::Get => Disposition::Fatal,
        },
        FailureKind::HttpStatus(429) => Disposition::Cooldown,
        FailureKind::HttpStatus(code) if *code >= 500 => Disposition::Cooldown,
        FailureKind::HttpStatus(_) => Disposition::Unsupported,
        FailureKind::Timeout | FailureKind::Network => Disposition::Cooldown,
        FailureKind::Malformed => Disposition::Unsupported,
        FailureKind::Api { code } if TRANSIENT_API_CODES.contains(&code.as_str()) => {
            Disposition::Cooldown
        }
        FailureKind::Api { code } if FATAL_API_CODES.contains(&code.as_str()) => {
            Disposition::Fatal
        }
        FailureKind::Api { .. } => Disposition::Unsupported,
        FailureKind::InvalidEndpoint | FailureKind::Client => Disposition::Fatal,
    }
}

/// Uniform wrapper every crawler request goes through.
///
/// Owns the run's [`MethodPreference`], so a downgrade seen by one request
/// applies to every later one.
pub struct RequestRunner {
    client: Arc<dyn ApiClient>,
    method: MethodPreference,
    policy: RetryPolicy,
    stats: CallStats,
}

impl RequestRunner {
    pub fn new(client: Arc<dyn ApiClient>, initial: HttpMethod, policy: RetryPolicy) -> Self {
        Self {
            client,
            method: MethodPreference::new(initial),
            policy,
            stats: CallStats::default(),
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method.current()
    }

    pub fn stats(&self) -> CallStats {
        self.stats
    }

    /// Issues `params` until it yields something other than a transient
    /// failure. The same parameters are re-sent on every attempt.
    pub async fn call(&mut self, params: &Params) -> CallOutcome<Value> {
        let mut cooldowns_used: u32 = 0;
        loop {
            if !self.policy.request_delay.is_zero() {
                dump_debug!("Sleeping {:?} before request", self.policy.request_delay);
                tokio::time::sleep(self.policy.request_delay).await;
            }

            let method = self.method.current();
            self.stats.requests += 1;
            let err = match self.client.call(method, params).await {
                Ok(value) => return CallOutcome::Ok(value),
                Err(err) => err,
            };

            match classify(&err, method) {
                Disposition::DowngradeMethod => {
                    if self.method.downgrade() {
                        self.stats.downgrades += 1;
                        dump_warn!("POST request to the API failed, retrying with GET");
                    }
                }
                Disposition::Cooldown => {
                    if !self.policy.allows_cooldown(cooldowns_used) {
                        return CallOutcome::Transient(err.to_string());
                    }
                    cooldowns_used += 1;
                    self.stats.cooldowns += 1;
                    dump_warn!(
                        "ERROR: {}. Sleeping for {:?} before retrying",
                        err,
                        self.policy.cooldown
                    );
                    tokio::time::sleep(self.policy.cooldown).await;
                }
                Disposition::Unsupported => return CallOutcome::Unsupported(err.to_string()),
                Disposition::Fatal => return CallOutcome::Fatal(err.to_string()),
            }
        }
    }
}

/// Client decorator that cools down and retries transient failures.
///
/// Used by the namespace and title sources, whose small listing reads
/// always go out as GET. Every other failure is returned unchanged.
pub struct RetryingClient {
    inner: Arc<dyn ApiClient>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn ApiClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait::async_trait]
impl ApiClient for RetryingClient {
    async fn call(&self, method: HttpMethod, params: &Params) -> Result<Value, ApiError> {
        let mut cooldowns_used: u32 = 0;
        loop {
            if !self.policy.request_delay.is_zero() {
                tokio::time::sleep(self.policy.request_delay).await;
            }
            let err = match self.inner.call(method, params).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if classify(&err, method) != Disposition::Cooldown
                || !self.policy.allows_cooldown(cooldowns_used)
            {
                return Err(err);
            }
            cooldowns_used += 1;
            dump_warn!(
                "ERROR: {}. Sleeping for {:?} before retrying",
                err,
                self.policy.cooldown
            );
            tokio::time::sleep(self.policy.cooldown).await;
        }
    }
}
