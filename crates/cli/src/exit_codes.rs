//! CLI exit codes.
//!
//! Scripts driving a backfill rely on these; treat them as part of the
//! command's contract.
//!
//! | Code | Meaning                                                        |
//! |------|----------------------------------------------------------------|
//! | 0    | Success (including dry runs)                                   |
//! | 1    | General error                                                  |
//! | 2    | Usage error (bad arguments, unreadable config file, no store)  |
//! | 3    | Config file does not parse or fails validation                 |
//! | 4    | Setup failure: missing table, index unavailable, store offline |
//! | 5    | CSV input could not be healed                                  |
//! | 6    | Failure while importing                                        |

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Config parse or validation error.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// A required table is missing, the search index is red/closed/absent,
/// or the store cannot be opened. Nothing was written.
pub const EXIT_SETUP: u8 = 4;

/// The same CSV line kept failing after the retry bound.
pub const EXIT_CSV: u8 = 5;

/// Store, search or remap failure after setup succeeded.
pub const EXIT_RUN_FAILURE: u8 = 6;
