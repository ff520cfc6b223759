pub mod launcher;
pub mod logs;
pub mod models;

pub use launcher::spawn;
pub use models::command::LaunchCommand;
pub use models::handle::{EarlyExitSignal, ExitNotifier, ProcessHandle};
