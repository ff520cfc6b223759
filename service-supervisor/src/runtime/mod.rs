pub mod local;
pub mod traits;

pub use local::LocalRuntime;
pub use traits::WorkerRuntime;
