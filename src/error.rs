use std::io;

use thiserror::Error;

/// Fatal supervisor error, one variant per failure class the original
/// `superserver.c` distinguished with a dedicated `EXIT_*` constant.
///
/// Every variant carries enough context to print a diagnostic naming the
/// failed operation; [`SuperserverError::exit_code`] maps each variant to the
/// stable numeric code operators can grep for in their process supervisor.
#[derive(Debug, Error)]
pub enum SuperserverError {
    #[error("failed to open configuration file: {0}")]
    MissingConfig(io::Error),

    #[error("an error occurred reading the configuration file: {0}")]
    ConfigRead(io::Error),

    #[error("the configuration file is not formatted correctly: {0}")]
    ConfigFormat(String),

    #[error("the creation of the socket was unsuccessful: {0}")]
    SocketCreate(io::Error),

    #[error("the bind of the port was unsuccessful: {0}")]
    SocketBind(io::Error),

    #[error("the listen returned an error: {0}")]
    Listen(io::Error),

    #[error("cannot accept connection: {0}")]
    Accept(io::Error),

    #[error("cannot create a forked process: {0}")]
    Fork(io::Error),

    #[error("the readiness poll returned an error: {0}")]
    Poll(io::Error),

    #[error("the close operation returned an error: {0}")]
    Close(io::Error),

    #[error("the wait operation returned an error: {0}")]
    Wait(io::Error),
}

impl SuperserverError {
    /// Stable exit code for this error class, ported from the original
    /// source's `EXIT_*` constants so operators correlating against the C
    /// supervisor see the same numbers.
    pub fn exit_code(&self) -> i32 {
        match self {
            SuperserverError::ConfigRead(_) => 10,
            SuperserverError::ConfigFormat(_) => 11,
            SuperserverError::SocketCreate(_) => 12,
            SuperserverError::SocketBind(_) => 13,
            SuperserverError::Listen(_) => 14,
            SuperserverError::Accept(_) => 15,
            SuperserverError::Fork(_) => 16,
            SuperserverError::Poll(_) => 17,
            SuperserverError::Close(_) => 18,
            SuperserverError::Wait(_) => 21,
            SuperserverError::MissingConfig(_) => 22,
        }
    }
}

/// Exit codes used by a child process between fork and a successful exec.
/// Distinct from [`SuperserverError`] because these never propagate back to
/// the supervisor as a `Result` — they are observed only as the child's exit
/// status by the Reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildFailure {
    Dup,
    Close,
    Exec,
}

impl ChildFailure {
    pub fn exit_code(self) -> i32 {
        match self {
            ChildFailure::Dup => 19,
            ChildFailure::Exec => 20,
            ChildFailure::Close => 18,
        }
    }
}

/// Logs `err` at `error` level with the failed operation named, then
/// terminates the process with the error's stable exit code. The single
/// exit point for every fatal supervisor condition.
pub fn die(err: SuperserverError) -> ! {
    log::error!("{err}");
    std::process::exit(err.exit_code());
}
