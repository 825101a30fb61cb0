pub mod args;
pub mod commands;
pub mod root;

pub use args::{validate_report_args, Args, Commands, ReportArgs};
pub use root::RootCommand;
