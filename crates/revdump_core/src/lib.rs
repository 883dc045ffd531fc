//! Revdump core: run configuration, continuation handling and the pure
//! strategy state machine that drives an export run.
mod cursor;
mod effect;
mod method;
mod msg;
mod outcome;
mod request;
mod state;
mod update;

pub use cursor::{ContinuationCursor, Params};
pub use effect::Effect;
pub use method::{HttpMethod, MethodPreference, ParseMethodError};
pub use msg::Msg;
pub use outcome::CallOutcome;
pub use request::{ExportMode, ExportRequest, NamespaceScope, RequestError};
pub use state::{CrawlState, Phase, Strategy};
pub use update::update;
