//! connectehr-core - vendor-neutral pieces of the EHR proxy
//!
//! Nothing in here performs I/O: vendor constants, SMART authorize URLs,
//! Bundle shaping and Binary normalization.

pub mod binary;
pub mod bundle;
pub mod error;
pub mod operation_outcome;
pub mod smart;
pub mod vendor;

pub use binary::{normalize_binary, BinaryContent, BinaryError};
pub use bundle::PatientSummary;
pub use error::{CoreError, Result};
pub use operation_outcome::{IssueSeverity, IssueType, OperationOutcome, OperationOutcomeIssue};
pub use smart::{append_query, AuthorizeRequest, TokenResponse};
pub use vendor::{DocumentKind, ReportCategory, Vendor};
