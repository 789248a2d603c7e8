//! Exit codes following sysexits.h conventions.
//!
//! These codes provide semantic meaning for different failure modes,
//! enabling scripts and CI systems to handle errors appropriately.

use thiserror::Error;
use veriframe_core::ClientError;

/// Successful execution (every image verified).
pub const SUCCESS: i32 = 0;

/// General error (catch-all, including failed or cancelled batches).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments, invalid image ids).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Some images could not be verified.
/// Maps to EX_DATAERR from sysexits.h.
pub const VERIFICATION_FAILED: i32 = 65;

/// Cannot open input file, or the requested job does not exist.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Service unavailable (ledger, detection model, server).
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const NETWORK_ERROR: i32 = 69;

/// Failures the CLI reports with a dedicated exit code.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("{unverified} of {total} images could not be verified")]
    Unverified { unverified: usize, total: usize },

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    NotFound(String),
}

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Classify error by inspecting the chain
        let code = err
            .chain()
            .find_map(|cause| {
                if let Some(cli) = cause.downcast_ref::<CliError>() {
                    Some(match cli {
                        CliError::Usage(_) => USAGE_ERROR,
                        CliError::Unverified { .. } => VERIFICATION_FAILED,
                        CliError::Unavailable(_) => NETWORK_ERROR,
                        CliError::NotFound(_) => INPUT_ERROR,
                    })
                } else if cause.is::<std::io::Error>() {
                    Some(INPUT_ERROR)
                } else if cause.is::<ClientError>() || cause.is::<reqwest::Error>() {
                    Some(NETWORK_ERROR)
                } else {
                    None
                }
            })
            .unwrap_or(GENERAL_ERROR);

        Self {
            code,
            message: Some(message),
        }
    }
}
