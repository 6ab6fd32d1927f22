pub mod diff;
pub mod error;
pub mod github;
pub mod presubmit;
pub mod profile;
pub mod qiniu;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod store;
