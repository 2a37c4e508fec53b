use serde::{Deserialize, Serialize};

/// FHIR OperationOutcome resource used as the body of every error response.
/// See: https://www.hl7.org/fhir/operationoutcome.html
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub resource_type: String,
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcomeIssue {
    pub severity: IssueSeverity,
    pub code: IssueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

/// Subset of the FHIR issue-type value set the proxy actually emits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    Invalid,
    Security,
    Login,
    Forbidden,
    Processing,
    NotSupported,
    NotFound,
    Exception,
    Timeout,
    Transient,
    Informational,
}

impl OperationOutcome {
    /// Create a new OperationOutcome with a single issue
    pub fn new(severity: IssueSeverity, code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            issue: vec![OperationOutcomeIssue {
                severity,
                code,
                diagnostics: Some(diagnostics.into()),
            }],
        }
    }

    pub fn error(code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, code, diagnostics)
    }

    pub fn not_found(diagnostics: impl Into<String>) -> Self {
        Self::error(IssueType::NotFound, diagnostics)
    }

    pub fn invalid(diagnostics: impl Into<String>) -> Self {
        Self::error(IssueType::Invalid, diagnostics)
    }

    pub fn unauthorized(diagnostics: impl Into<String>) -> Self {
        Self::error(IssueType::Login, diagnostics)
    }

    pub fn forbidden(diagnostics: impl Into<String>) -> Self {
        Self::error(IssueType::Forbidden, diagnostics)
    }

    /// Error relayed from an upstream EHR
    pub fn upstream(diagnostics: impl Into<String>) -> Self {
        Self::error(IssueType::Processing, diagnostics)
    }

    pub fn exception(diagnostics: impl Into<String>) -> Self {
        Self::error(IssueType::Exception, diagnostics)
    }

    /// Diagnostics text of the first issue, if any
    pub fn diagnostics(&self) -> Option<&str> {
        self.issue.first().and_then(|i| i.diagnostics.as_deref())
    }
}
