pub mod envelope;
pub mod headers;
pub mod logging;
pub mod problem;
pub mod request_id;

pub use envelope::{Envelope, ErrorBody};
pub use logging::init_tracing;
pub use problem::{Problem, PROBLEM_CONTENT_TYPE};
pub use request_id::{request_id_middleware, RequestId};
