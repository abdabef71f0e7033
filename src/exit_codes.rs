//! Exit code constants for the curfew binary.
//!
//! - 0: Success
//! - 1: User error (bad request, operation not permitted, expired session)
//! - 2: External collaborator failure (payment verification, enforcement)
//! - 3: Persistence failure (lock record could not be written)
//! - 4: Daemon failure (socket, runtime, startup)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: malformed request, rejected operation, or unknown bypass session.
pub const USER_ERROR: i32 = 1;

/// An external collaborator failed or rejected the operation.
pub const EXTERNAL_FAILURE: i32 = 2;

/// The lock record could not be written to durable storage.
pub const PERSISTENCE_FAILURE: i32 = 3;

/// The daemon could not start or lost its IPC endpoint.
pub const DAEMON_FAILURE: i32 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            USER_ERROR,
            EXTERNAL_FAILURE,
            PERSISTENCE_FAILURE,
            DAEMON_FAILURE,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }
}
