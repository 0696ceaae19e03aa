use std::time::Duration;

pub const DEFAULT_MAX_CONCURRENT: usize = 4;
/// Used when the configured timeout is zero.
pub const FALLBACK_TIMEOUT: Duration = Duration::from_secs(5);
/// Added to the execution timeout to get the per-request deadline.
pub const EXECUTION_GRACE: Duration = Duration::from_secs(2);
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
/// How long the output drain may outlast a killed interpreter or a spent deadline.
pub const DRAIN_GRACE: Duration = Duration::from_secs(1);

pub const EXECUTE_PATH: &str = "/api/execute";

pub const TEMP_FILE_PREFIX: &str = "projf-code-";
pub const TEMP_DIR_PREFIX: &str = "projf-run-";
pub const SCRIPT_SUFFIX: &str = ".pf";
pub const SCRIPT_NAME: &str = "code.pf";
