pub mod command;
pub mod handle;
