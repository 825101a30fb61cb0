pub mod report;
pub mod scan;

pub use report::run_report_command;
pub use scan::run_scan_command;
