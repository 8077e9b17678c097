//! # grove-cascade
//!
//! Dependency-cascade redistribution.
//!
//! Projects are registered with a funding address, a set of dependency
//! project ids and a cascade multiplier. Triggering a cascade pays the
//! project its primary amount and spreads `primary * multiplier` evenly
//! over one level of active dependencies. A separate per-project
//! "failed-potential" pool can be accumulated and later routed through the
//! yield router in one shot.
//!
//! ## Modules
//!
//! - [`project`]: Project records and registration rules
//! - [`pool`]: The cascade pool

pub mod pool;
pub mod project;

use grove_router::RouterError;
use grove_types::{AccessError, BankError, ProjectId, Reentrant};

pub use pool::{CascadePool, CascadeReceipt};
pub use project::Project;

/// Ceiling on the cascade multiplier (50%).
pub const MAX_CASCADE_MULTIPLIER_BPS: u16 = 5_000;

/// Declared ceiling on cascade recursion. Cascades currently pay a single
/// level of dependencies.
pub const MAX_CASCADE_DEPTH: u8 = 3;

/// Maximum number of dependencies per project.
pub const MAX_DEPENDENCIES: usize = 16;

/// Error types for cascade operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CascadeError {
    /// Funding address is the null address.
    #[error("project {project} has a null funding address")]
    ZeroFundingAddress {
        /// The project being registered.
        project: ProjectId,
    },

    /// Multiplier above [`MAX_CASCADE_MULTIPLIER_BPS`].
    #[error("cascade multiplier {multiplier_bps} bps exceeds maximum {max}")]
    MultiplierTooHigh {
        /// Requested multiplier.
        multiplier_bps: u16,
        /// Allowed maximum.
        max: u16,
    },

    /// A project lists itself as a dependency.
    #[error("project {0} cannot depend on itself")]
    SelfDependency(ProjectId),

    /// A dependency id appears more than once.
    #[error("project {project} lists dependency {dependency} twice")]
    DuplicateDependency {
        /// The project being registered.
        project: ProjectId,
        /// The repeated dependency.
        dependency: ProjectId,
    },

    /// More than [`MAX_DEPENDENCIES`] dependencies.
    #[error("{count} dependencies exceeds maximum {max}")]
    TooManyDependencies {
        /// Dependencies supplied.
        count: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// No project with this id.
    #[error("unknown project {0}")]
    UnknownProject(ProjectId),

    /// The project has been deactivated.
    #[error("project {0} is inactive")]
    ProjectInactive(ProjectId),

    /// Amount is zero.
    #[error("amount is zero")]
    ZeroAmount,

    /// The pool's unreserved balance cannot cover the cascade.
    #[error("cascade needs {requested}, pool has {available} available")]
    InsufficientFunds {
        /// Primary plus cascade amount.
        requested: u64,
        /// Pool balance not reserved for failed potential.
        available: u64,
    },

    /// Nothing accumulated for the project.
    #[error("no failed potential accumulated for project {0}")]
    NoFailedPotential(ProjectId),

    /// Arithmetic overflow.
    #[error("arithmetic overflow in cascade calculation")]
    Overflow,

    /// Missing capability.
    #[error(transparent)]
    Unauthorized(#[from] AccessError),

    /// Token movement failed.
    #[error(transparent)]
    Bank(#[from] BankError),

    /// Routing failed potential failed.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Another pool operation is in flight.
    #[error(transparent)]
    Reentrant(#[from] Reentrant),
}

/// Convenience result type for cascade operations.
pub type Result<T> = std::result::Result<T, CascadeError>;
