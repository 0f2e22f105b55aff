//! Structured logging conventions.
//!
//! All crates log through `tracing` with structured fields. Field names in
//! use across subsystems: `subsystem`, `provider`, `session`, `path`,
//! `mtime`, `batch_size`, `queue_len`, `attempt`, `delay_ms`,
//! `duration_ms`, `error`.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Retries exhausted, batch writes lost |
//! | WARN  | Per-file extraction failure |
//! | INFO  | Lifecycle events (start, stop, settings change), run summaries |
//! | DEBUG | Batch decisions, retries scheduled, timer arming, skipped writes |
//! | TRACE | Per-file iteration |

/// `subsystem` value for the content processors and providers.
pub const SUBSYSTEM_CONTENT: &str = "content";

/// `subsystem` value for the file database.
pub const SUBSYSTEM_DB: &str = "db";

/// `subsystem` value for the command-line driver.
pub const SUBSYSTEM_CLI: &str = "cli";

/// Env filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "notenav_cli=info,notenav_content=info,notenav_db=info";
