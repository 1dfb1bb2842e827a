//! External process supervision.
//!
//! The supervisor launches one external command at a time, streams its
//! standard output and standard error line by line while it runs, and
//! reports a terminal result distinguishing success, non-zero exit,
//! abnormal termination and launch failure.
//!
//! Privileged commands go through an [`Elevator`] and, on platforms that
//! need it, an operator credential obtained through the
//! [`PrivilegeChannel`](crate::PrivilegeChannel).

mod command;
mod errors;
mod process;

pub use command::{CapturedOutput, CommandSpec, Elevator, ExitReport, OutputLine, OutputStream};
pub use errors::SupervisorError;
pub use process::{ProcessSupervisor, SupervisorOptions};
