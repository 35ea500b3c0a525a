#![warn(missing_docs)]

//! # sandpiper-data
//!
//! Shared data model for the sandpiper scripting sandbox.
//!
//! Everything here is plain serde data: environment variables and the
//! two-tier environment store shape, test descriptors and expectation
//! results, the request/response objects scripts see, `Set-Cookie`
//! parsing, and `<<name>>` template resolution. No V8 anywhere — the
//! sandbox crate depends on this one, never the other way around.

pub mod cookie;
pub mod environment;
pub mod request;
pub mod response;
pub mod template;
pub mod test_result;

pub use cookie::{cookies_from_headers, parse_set_cookie, Cookie};
pub use environment::{EnvironmentVariable, Environments};
pub use request::{KeyValuePair, RequestData};
pub use response::ResponseData;
pub use template::{resolve_template, resolve_with};
pub use test_result::{ExpectResult, ExpectStatus, PreRequestResult, TestDescriptor, TestResult};
