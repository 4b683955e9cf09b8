pub mod models;
pub mod overrides;
pub mod writer;

pub use overrides::OverrideStore;
pub use writer::TickWriter;
