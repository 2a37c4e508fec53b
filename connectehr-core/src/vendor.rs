use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// v2-0074 diagnostic service section codes
pub const DIAGNOSTIC_SERVICE_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v2-0074";
pub const LOINC_SYSTEM: &str = "http://loinc.org";
pub const OBSERVATION_CATEGORY_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/observation-category";

/// Supported upstream EHR vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Epic,
    Cerner,
}

impl Vendor {
    pub const ALL: [Vendor; 2] = [Vendor::Epic, Vendor::Cerner];

    /// Path segment and audit value
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Epic => "epic",
            Vendor::Cerner => "cerner",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Vendor::Epic => "Epic",
            Vendor::Cerner => "Cerner",
        }
    }

    /// Header carrying the upstream vendor token when the local JWT
    /// occupies `Authorization`.
    pub fn token_header(&self) -> &'static str {
        match self {
            Vendor::Epic => "Epic-Authorization",
            Vendor::Cerner => "Cerner-Authorization",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "epic" => Ok(Vendor::Epic),
            "cerner" | "oracle" => Ok(Vendor::Cerner),
            _ => Err(CoreError::UnknownVendor(s.to_string())),
        }
    }
}

/// DiagnosticReport categories exposed to the frontend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportCategory {
    Radiology,
    Labs,
}

impl ReportCategory {
    pub fn code(&self) -> &'static str {
        match self {
            ReportCategory::Radiology => "RAD",
            ReportCategory::Labs => "LAB",
        }
    }

    /// `category` search token (`system|code`)
    pub fn search_token(&self) -> String {
        format!("{}|{}", DIAGNOSTIC_SERVICE_SYSTEM, self.code())
    }
}

impl FromStr for ReportCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "radiology" | "rad" => Ok(ReportCategory::Radiology),
            "labs" | "lab" | "laboratory" => Ok(ReportCategory::Labs),
            _ => Err(CoreError::UnknownCategory {
                kind: "report category",
                value: s.to_string(),
            }),
        }
    }
}

/// DocumentReference kinds, keyed by LOINC document type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Lab,
    Radiology,
    Clinical,
}

impl DocumentKind {
    pub fn loinc_code(&self) -> &'static str {
        match self {
            DocumentKind::Lab => "24323-8",
            DocumentKind::Radiology => "18748-4",
            DocumentKind::Clinical => "34109-9",
        }
    }

    /// `type` search token (`system|code`)
    pub fn search_token(&self) -> String {
        format!("{}|{}", LOINC_SYSTEM, self.loinc_code())
    }
}

impl FromStr for DocumentKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lab" | "labs" => Ok(DocumentKind::Lab),
            "radiology" => Ok(DocumentKind::Radiology),
            "clinical" | "notes" => Ok(DocumentKind::Clinical),
            _ => Err(CoreError::UnknownCategory {
                kind: "document kind",
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_parse() {
        assert_eq!("epic".parse::<Vendor>().unwrap(), Vendor::Epic);
        assert_eq!("Cerner".parse::<Vendor>().unwrap(), Vendor::Cerner);
        assert!("allscripts".parse::<Vendor>().is_err());
    }

    #[test]
    fn test_vendor_token_header() {
        assert_eq!(Vendor::Epic.token_header(), "Epic-Authorization");
        assert_eq!(Vendor::Cerner.token_header(), "Cerner-Authorization");
    }

    #[test]
    fn test_report_category_tokens() {
        assert_eq!(
            ReportCategory::Radiology.search_token(),
            "http://terminology.hl7.org/CodeSystem/v2-0074|RAD"
        );
        assert_eq!("labs".parse::<ReportCategory>().unwrap(), ReportCategory::Labs);
        assert!("cardiology".parse::<ReportCategory>().is_err());
    }

    #[test]
    fn test_document_kind_tokens() {
        assert_eq!(DocumentKind::Clinical.search_token(), "http://loinc.org|34109-9");
        assert_eq!("lab".parse::<DocumentKind>().unwrap(), DocumentKind::Lab);
    }
}
