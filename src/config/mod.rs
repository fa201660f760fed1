pub mod context;
pub mod settings;

pub use context::{prepare, Context, ContextCell, PrepareOptions, StoredBenchmark};
pub use settings::Settings;
