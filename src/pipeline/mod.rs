pub mod builder;
pub mod defaults;
pub(crate) mod model_runtime;
pub mod oracle;
pub mod runtime;
pub mod traits;
