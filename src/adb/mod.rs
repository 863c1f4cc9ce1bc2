mod commands;
pub(crate) mod executor;
mod parser;

pub(crate) use commands::{
    AdbSyntax, DeviceTool, check_tool_available, query_package_detail, run_list_devices,
    run_list_packages, run_list_system_packages, run_package_operation,
};
pub(crate) use executor::ProcessExecutor;
pub(crate) use parser::{summarize_output_line, truncate_for_summary};
