//! Fixed names and limits shared across the crate.

/// Object key under which the create script is staged and uploaded.
pub const CREATE_SCRIPT_KEY: &str = "create.sql";

/// Object key under which the delete script is staged and uploaded.
pub const DELETE_SCRIPT_KEY: &str = "delete.sql";

/// Environment key carrying the database endpoint address.
pub const ENV_DB_ENDPOINT: &str = "DB_ENDPOINT";

/// Environment key carrying the credential secret identifier.
pub const ENV_DB_SECRET_ID: &str = "DB_SECRET_ID";

/// Environment key carrying the script storage identifier.
pub const ENV_SCRIPTS_BUCKET: &str = "SCRIPTS_BUCKET";

/// Environment key telling the executor whether a delete script was shipped.
///
/// The value is a stringified boolean (`"true"` / `"false"`).
pub const ENV_RUN_ON_DELETE: &str = "RUN_ON_DELETE";

/// Upper bound on a single executor invocation, in seconds.
pub const EXECUTOR_TIMEOUT_SECS: u64 = 300;

/// Executor memory allocation used when the configuration does not set one.
pub const DEFAULT_MEMORY_MB: u32 = 512;

/// Code artifact shipped with the executor function by default.
pub const DEFAULT_EXECUTOR_ARTIFACT: &str = "executor/handler.zip";

/// Entry point inside the executor artifact.
pub const DEFAULT_EXECUTOR_HANDLER: &str = "index.handler";

/// Characters kept when truncating a full hash for identifiers and display.
pub const HASH_PREFIX_LEN: usize = 20;
