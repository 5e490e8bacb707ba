//! Bot runtime - command routing, group enrolment and the stream supervisor.
//!
//! This module contains everything between the transport and the game:
//! - Slash-command routing (`/confess`, `/guess`, `/shh`)
//! - Direct-message enrolment into groups
//! - Group bootstrap at startup
//! - The retrying message-stream loop

pub mod commands;
pub mod groups;
pub mod membership;
pub mod replies;
pub mod supervisor;


pub use commands::CommandRouter;
pub use groups::{bootstrap, ResolvedGroups};
pub use membership::{EnrollmentReport, MembershipSync};
pub use supervisor::{StreamSupervisor, SupervisorExit, SupervisorState};
