pub(crate) mod fs;
pub mod http;
pub mod log;

pub use http::{HttpFetch, Pacer};
pub use log::GenLog;
