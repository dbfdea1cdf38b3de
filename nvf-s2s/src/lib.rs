pub mod client;
pub mod context;
pub mod error;
pub mod http_writer;
pub mod receiver;

pub use client::{CallParams, CallPath, SvcClient, UpstreamResponse};
pub use context::S2sContext;
pub use error::S2sError;
pub use http_writer::HttpWriter;
pub use receiver::{receive, SvcReceiver};
