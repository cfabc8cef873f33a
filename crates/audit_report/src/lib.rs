pub mod report;

pub use report::{build_report, ReportInput, ReportPaths};
