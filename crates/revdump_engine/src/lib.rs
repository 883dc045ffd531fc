//! Revdump engine: API client, retry wrapper, sources and the revision
//! crawler that produces XML dump fragments.
mod client;
mod crawler;
mod engine;
mod errlog;
mod namespaces;
mod persist;
mod record;
mod retry;
mod titles;
mod types;

pub use client::{parse_api_body, ApiClient, ClientSettings, ReqwestApiClient};
pub use crawler::{CrawlSummary, CrawlerParts, RevisionCrawler};
pub use engine::{ExportEvent, ExportHandle};
pub use errlog::{ErrorLog, FileErrorLog, MemoryErrorLog};
pub use namespaces::{ApiNamespaceSource, NamespaceSource};
pub use persist::{ensure_output_dir, DumpWriter, PersistError, DUMP_FOOTER, DUMP_HEADER};
pub use record::{RecordBuilder, RecordError, XmlRecordBuilder};
pub use retry::{CallStats, RequestRunner, RetryPolicy, RetryingClient};
pub use titles::{
    next_group, ApiTitleSource, FileTitleSource, TitleBatch, TitleCursor, TitleSource,
    TITLES_END_MARKER,
};
pub use types::{ApiError, CrawlError, FailureKind, SourceError};
