pub mod routes;
pub mod stream;

pub use routes::{router, ApiState};
