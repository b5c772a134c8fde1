//! Vote-a-tron: bulk actions on Gerrit changes.
//!
//! Runs a Gerrit search query and applies one action to every matching
//! change: a Code-Review/Workflow vote with a message, abandoning the change,
//! or setting its topic. Dry-run is the default; nothing is sent unless the
//! caller asks for it explicitly.

pub mod cli;
pub mod dispatch;
pub mod executor;
pub mod gerrit;
pub mod types;

pub use cli::{is_dry_run, parse_args};
pub use dispatch::run;
pub use executor::{Outcome, execute};
pub use gerrit::{DEFAULT_HOST, GerritHttp, changes_query_url, encode_query, get_reviews};
pub use types::{
    ActionRequest, Change, ChangeAction, ChangeError, Credentials, GerritApi, HttpMethod,
    HttpReply, RevisionInfo, RunSpec, RunSummary,
};
