//! Shaping of vendor searchset Bundles into what the frontend consumes

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Flattened Patient row shown in search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: Option<String>,
    pub name: String,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
}

impl PatientSummary {
    pub fn from_resource(resource: &Value) -> Self {
        Self {
            id: str_field(resource, "id"),
            name: display_name(resource),
            gender: str_field(resource, "gender"),
            birth_date: str_field(resource, "birthDate"),
        }
    }
}

fn str_field(resource: &Value, field: &str) -> Option<String> {
    resource.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Human-readable name of a Patient or Practitioner.
///
/// Uses `name[0].text` when the vendor supplies it, otherwise the given
/// names followed by the family name.
pub fn display_name(resource: &Value) -> String {
    let Some(name) = resource
        .get("name")
        .and_then(Value::as_array)
        .and_then(|names| names.first())
    else {
        return "Unknown".to_string();
    };

    if let Some(text) = name.get("text").and_then(Value::as_str)
        && !text.trim().is_empty()
    {
        return text.trim().to_string();
    }

    let given = name
        .get("given")
        .and_then(Value::as_array)
        .map(|g| {
            g.iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    let family = name.get("family").and_then(Value::as_str).unwrap_or("");

    let full = format!("{} {}", given, family).trim().to_string();
    if full.is_empty() {
        "Unknown".to_string()
    } else {
        full
    }
}

/// Resources contained in a Bundle. A Bundle without `entry` is empty.
pub fn entries(bundle: &Value) -> Vec<&Value> {
    bundle
        .get("entry")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(|e| e.get("resource")).collect())
        .unwrap_or_default()
}

/// Summaries of every Patient in a searchset, skipping OperationOutcome
/// entries some vendors mix into results.
pub fn summarize_patients(bundle: &Value) -> Vec<PatientSummary> {
    entries(bundle)
        .into_iter()
        .filter(|r| r.get("resourceType").and_then(Value::as_str) == Some("Patient"))
        .map(PatientSummary::from_resource)
        .collect()
}

/// Build a searchset Bundle around the given resources
pub fn searchset(resources: Vec<Value>) -> Value {
    json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "total": resources.len(),
        "entry": resources
            .into_iter()
            .map(|r| json!({ "resource": r }))
            .collect::<Vec<_>>(),
    })
}

/// Keep only resources whose `category` carries the given code.
///
/// Vendors do not all honor the `category` search parameter, so results
/// are filtered again here.
pub fn filter_by_category(bundle: &Value, system: &str, code: &str) -> Value {
    filter_by_concept(bundle, "category", system, code)
}

/// Keep only resources whose `type` carries the given code
pub fn filter_by_type(bundle: &Value, system: &str, code: &str) -> Value {
    filter_by_concept(bundle, "type", system, code)
}

fn filter_by_concept(bundle: &Value, field: &str, system: &str, code: &str) -> Value {
    let kept = entries(bundle)
        .into_iter()
        .filter(|r| r.get("resourceType").and_then(Value::as_str) != Some("OperationOutcome"))
        .filter(|r| r.get(field).is_some_and(|c| concept_matches(c, system, code)))
        .cloned()
        .collect();

    // Paging links must survive so the caller can fetch the next page
    let mut filtered = searchset(kept);
    if let (Some(out), Some(source)) = (filtered.as_object_mut(), bundle.as_object()) {
        for key in ["id", "meta", "link"] {
            if let Some(value) = source.get(key) {
                out.insert(key.to_string(), value.clone());
            }
        }
    }
    filtered
}

/// Match a CodeableConcept (or array of them) against `system|code`.
/// A coding without a system matches on code alone.
fn concept_matches(concept: &Value, system: &str, code: &str) -> bool {
    if let Some(concepts) = concept.as_array() {
        return concepts.iter().any(|c| concept_matches(c, system, code));
    }

    concept
        .get("coding")
        .and_then(Value::as_array)
        .is_some_and(|codings| {
            codings.iter().any(|coding| {
                let code_ok = coding.get("code").and_then(Value::as_str) == Some(code);
                let system_ok = match coding.get("system").and_then(Value::as_str) {
                    Some(s) => s == system,
                    None => true,
                };
                code_ok && system_ok
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient_bundle() -> Value {
        json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": [
                {"resource": {
                    "resourceType": "Patient",
                    "id": "p1",
                    "gender": "female",
                    "birthDate": "1980-01-02",
                    "name": [{"given": ["Nancy", "Ann"], "family": "Smart"}]
                }},
                {"resource": {
                    "resourceType": "Patient",
                    "id": "p2",
                    "name": [{"text": "Derrick Lin", "family": "Lin"}]
                }},
                {"resource": {
                    "resourceType": "OperationOutcome",
                    "issue": []
                }}
            ]
        })
    }

    #[test]
    fn test_display_name_concatenates_given_and_family() {
        let bundle = patient_bundle();
        let entries = entries(&bundle);
        assert_eq!(display_name(entries[0]), "Nancy Ann Smart");
        assert_eq!(display_name(entries[1]), "Derrick Lin");
    }

    #[test]
    fn test_display_name_unknown() {
        assert_eq!(display_name(&json!({"resourceType": "Patient"})), "Unknown");
        assert_eq!(display_name(&json!({"name": [{}]})), "Unknown");
        assert_eq!(display_name(&json!({"name": [{"family": "Peters"}]})), "Peters");
    }

    #[test]
    fn test_summarize_patients_skips_non_patients() {
        let summaries = summarize_patients(&patient_bundle());
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id.as_deref(), Some("p1"));
        assert_eq!(summaries[0].birth_date.as_deref(), Some("1980-01-02"));
        assert_eq!(summaries[1].gender, None);

        let json = serde_json::to_value(&summaries[0]).unwrap();
        assert_eq!(json["birthDate"], "1980-01-02");
    }

    #[test]
    fn test_entries_of_empty_bundle() {
        let bundle = json!({"resourceType": "Bundle", "type": "searchset", "total": 0});
        assert!(entries(&bundle).is_empty());
        assert!(summarize_patients(&bundle).is_empty());
    }

    #[test]
    fn test_filter_by_category() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "DiagnosticReport", "id": "r1",
                    "category": [{"coding": [{"system": "http://terminology.hl7.org/CodeSystem/v2-0074", "code": "RAD"}]}]}},
                {"resource": {"resourceType": "DiagnosticReport", "id": "r2",
                    "category": [{"coding": [{"system": "http://terminology.hl7.org/CodeSystem/v2-0074", "code": "LAB"}]}]}},
                {"resource": {"resourceType": "DiagnosticReport", "id": "r3",
                    "category": {"coding": [{"code": "RAD"}]}}},
                {"resource": {"resourceType": "DiagnosticReport", "id": "r4"}}
            ]
        });

        let filtered = filter_by_category(
            &bundle,
            "http://terminology.hl7.org/CodeSystem/v2-0074",
            "RAD",
        );
        assert_eq!(filtered["total"], 2);
        assert_eq!(filtered["entry"][0]["resource"]["id"], "r1");
        assert_eq!(filtered["entry"][1]["resource"]["id"], "r3");
    }

    #[test]
    fn test_filter_by_type_rejects_other_system() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "DocumentReference", "id": "d1",
                    "type": {"coding": [{"system": "http://loinc.org", "code": "34109-9"}]}}},
                {"resource": {"resourceType": "DocumentReference", "id": "d2",
                    "type": {"coding": [{"system": "urn:oid:1.2.3", "code": "34109-9"}]}}}
            ]
        });
        let filtered = filter_by_type(&bundle, "http://loinc.org", "34109-9");
        assert_eq!(filtered["total"], 1);
        assert_eq!(filtered["entry"][0]["resource"]["id"], "d1");
    }

    #[test]
    fn test_filter_keeps_paging_links() {
        let bundle = json!({
            "resourceType": "Bundle",
            "id": "page-1",
            "meta": {"lastUpdated": "2024-03-01T10:00:00Z"},
            "type": "searchset",
            "total": 57,
            "link": [
                {"relation": "self", "url": "https://fhir.example.org/DiagnosticReport?patient=p1"},
                {"relation": "next", "url": "https://fhir.example.org/DiagnosticReport?patient=p1&page=2"}
            ],
            "entry": [
                {"resource": {"resourceType": "DiagnosticReport", "id": "r1",
                    "category": [{"coding": [{"code": "RAD"}]}]}},
                {"resource": {"resourceType": "DiagnosticReport", "id": "r2",
                    "category": [{"coding": [{"code": "LAB"}]}]}}
            ]
        });

        let filtered = filter_by_category(&bundle, "http://terminology.hl7.org/CodeSystem/v2-0074", "RAD");
        assert_eq!(filtered["total"], 1);
        assert_eq!(filtered["id"], "page-1");
        assert_eq!(filtered["meta"]["lastUpdated"], "2024-03-01T10:00:00Z");
        assert_eq!(filtered["link"], bundle["link"]);
        assert_eq!(filtered["link"][1]["relation"], "next");
    }

    #[test]
    fn test_filter_without_links() {
        let bundle = json!({"resourceType": "Bundle", "entry": []});
        let filtered = filter_by_type(&bundle, "http://loinc.org", "34109-9");
        assert!(filtered.get("link").is_none());
        assert_eq!(filtered["total"], 0);
    }
}
