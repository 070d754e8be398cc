// Catalog: paginated fetch from the remote plant service, session-local merge
// and environment filtering.

pub mod cache;
pub mod client;
pub mod handlers;
