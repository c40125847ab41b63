//! Whole-document compliance classification.
//!
//! The full document text is sent to the generator with a fixed schema: seven
//! category arrays of verbatim `{section, text}` excerpts, plus the HIPAA
//! requirements the agreement does not address. The payload that comes back
//! is untrusted and is parsed strictly; anything that does not fit the shape
//! is a [`ClassificationError`], never a partially filled report.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::llm::{GenerationError, StructuredRequest, TextGenerator};

/// Function / schema name presented to the model.
pub const ANALYSIS_FUNCTION: &str = "process_baa_analysis";

#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("{0}")]
    Unavailable(#[from] GenerationError),
    #[error("No analysis results returned")]
    NoPayload,
    #[error("analysis payload does not match the expected shape: {0}")]
    Malformed(String),
    #[error("No text could be extracted from the PDF")]
    EmptyDocument,
}

/// The seven fixed compliance categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    ComplianceReporting,
    RiskManagement,
    Training,
    SecurityIncidents,
    TechnicalSafeguards,
    PhiHandling,
    BreachProcess,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::ComplianceReporting,
        Category::RiskManagement,
        Category::Training,
        Category::SecurityIncidents,
        Category::TechnicalSafeguards,
        Category::PhiHandling,
        Category::BreachProcess,
    ];

    /// Wire key used in the analysis payload.
    pub fn key(&self) -> &'static str {
        match self {
            Category::ComplianceReporting => "complianceReporting",
            Category::RiskManagement => "riskManagement",
            Category::Training => "training",
            Category::SecurityIncidents => "securityIncidents",
            Category::TechnicalSafeguards => "technicalSafeguards",
            Category::PhiHandling => "phiHandling",
            Category::BreachProcess => "breachProcess",
        }
    }

    /// Human-readable heading.
    pub fn label(&self) -> &'static str {
        match self {
            Category::ComplianceReporting => "Compliance Reporting",
            Category::RiskManagement => "Risk Management",
            Category::Training => "Training",
            Category::SecurityIncidents => "Security Incidents",
            Category::TechnicalSafeguards => "Technical Safeguards",
            Category::PhiHandling => "PHI Handling",
            Category::BreachProcess => "Breach Process",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A verbatim excerpt tied to the document's own section label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryReference {
    pub section: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MissingRequirement {
    pub requirement: String,
    pub description: String,
    pub fix: String,
}

/// Excerpts per category. A `None` category was absent or null in the
/// payload; every category field always exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CategoryReferences {
    pub compliance_reporting: Option<Vec<CategoryReference>>,
    pub risk_management: Option<Vec<CategoryReference>>,
    pub training: Option<Vec<CategoryReference>>,
    pub security_incidents: Option<Vec<CategoryReference>>,
    pub technical_safeguards: Option<Vec<CategoryReference>>,
    pub phi_handling: Option<Vec<CategoryReference>>,
    pub breach_process: Option<Vec<CategoryReference>>,
}

impl CategoryReferences {
    pub fn get(&self, category: Category) -> Option<&[CategoryReference]> {
        let refs = match category {
            Category::ComplianceReporting => &self.compliance_reporting,
            Category::RiskManagement => &self.risk_management,
            Category::Training => &self.training,
            Category::SecurityIncidents => &self.security_incidents,
            Category::TechnicalSafeguards => &self.technical_safeguards,
            Category::PhiHandling => &self.phi_handling,
            Category::BreachProcess => &self.breach_process,
        };
        refs.as_deref()
    }

    /// All seven categories in fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, Option<&[CategoryReference]>)> + '_ {
        Category::ALL.into_iter().map(|c| (c, self.get(c)))
    }

    /// Number of categories with at least one excerpt.
    pub fn found_count(&self) -> usize {
        self.iter()
            .filter(|(_, refs)| refs.is_some_and(|r| !r.is_empty()))
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub category_references: CategoryReferences,
    pub missing_requirements: Vec<MissingRequirement>,
}

impl ComplianceReport {
    /// Nothing found and nothing missing. A valid outcome, distinct from a
    /// failed analysis.
    pub fn is_empty(&self) -> bool {
        self.category_references.found_count() == 0 && self.missing_requirements.is_empty()
    }
}

fn reference_array_schema() -> serde_json::Value {
    json!({
        "type": "array",
        "nullable": true,
        "items": {
            "type": "object",
            "properties": {
                "section": { "type": "string" },
                "text": { "type": "string" }
            },
            "required": ["section", "text"]
        }
    })
}

/// JSON schema of the analysis payload.
pub fn analysis_schema() -> serde_json::Value {
    let categories: serde_json::Map<String, serde_json::Value> = Category::ALL
        .iter()
        .map(|c| (c.key().to_string(), reference_array_schema()))
        .collect();

    json!({
        "type": "object",
        "properties": {
            "categoryReferences": {
                "type": "object",
                "properties": categories
            },
            "missingRequirements": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "requirement": { "type": "string" },
                        "description": { "type": "string" },
                        "fix": { "type": "string" }
                    },
                    "required": ["requirement", "description", "fix"]
                }
            }
        },
        "required": ["categoryReferences", "missingRequirements"]
    })
}

const SYSTEM_PROMPT: &str = "\
You are a HIPAA compliance expert reviewing a Business Associate Agreement (BAA).
Extract and categorize the sections that relate to HIPAA compliance requirements,
and identify the requirements the agreement fails to address.

For each section you find:
1. Give the section number and heading exactly as they appear in the document.
2. Quote the relevant text verbatim.
3. Place it in the matching category.

For each missing requirement:
1. Name the specific HIPAA requirement the BAA does not cover.
2. Describe why it is needed.
3. Propose clause language that would fix the gap.";

fn analysis_request(full_text: &str) -> StructuredRequest {
    StructuredRequest {
        system: SYSTEM_PROMPT.to_string(),
        user: format!(
            "Analyze this BAA and report:\n\
             1. References to existing HIPAA compliance requirements, by category.\n\
             2. Requirements that are missing and should be added.\n\n\
             Document text:\n{}",
            full_text
        ),
        name: ANALYSIS_FUNCTION.to_string(),
        description: "Record the BAA analysis results".to_string(),
        schema: analysis_schema(),
    }
}

/// Strictly parse an analysis payload.
pub fn parse_report(payload: &str) -> Result<ComplianceReport, ClassificationError> {
    serde_json::from_str(payload).map_err(|e| ClassificationError::Malformed(e.to_string()))
}

/// Classify the whole document text against the fixed category taxonomy.
pub async fn classify(
    generator: &dyn TextGenerator,
    full_text: &str,
) -> Result<ComplianceReport, ClassificationError> {
    if full_text.trim().is_empty() {
        return Err(ClassificationError::EmptyDocument);
    }

    let request = analysis_request(full_text);
    let payload = generator
        .generate_structured(&request)
        .await?
        .ok_or(ClassificationError::NoPayload)?;

    let report = parse_report(&payload)?;
    tracing::info!(
        backend = generator.name(),
        categories_found = report.category_references.found_count(),
        missing = report.missing_requirements.len(),
        "document classified"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{MockGenerator, MockReply};

    const FULL_PAYLOAD: &str = r#"{
        "categoryReferences": {
            "complianceReporting": [
                {"section": "4.1 Reporting", "text": "Business Associate shall report..."}
            ],
            "riskManagement": null,
            "training": [],
            "securityIncidents": null,
            "technicalSafeguards": null,
            "phiHandling": [{"section": "2.3", "text": "Use of PHI"}],
            "breachProcess": null
        },
        "missingRequirements": [
            {
                "requirement": "Subcontractor assurances",
                "description": "Subcontractors must agree to the same restrictions.",
                "fix": "Business Associate shall ensure..."
            }
        ]
    }"#;

    #[test]
    fn parses_full_payload() {
        let report = parse_report(FULL_PAYLOAD).unwrap();
        let refs = &report.category_references;
        assert_eq!(
            refs.get(Category::ComplianceReporting).unwrap()[0].section,
            "4.1 Reporting"
        );
        assert_eq!(refs.get(Category::RiskManagement), None);
        assert_eq!(refs.get(Category::Training), Some(&[][..]));
        assert_eq!(refs.found_count(), 2);
        assert_eq!(report.missing_requirements.len(), 1);
        assert!(!report.is_empty());
    }

    #[test]
    fn valid_but_empty_report_is_accepted() {
        let report =
            parse_report(r#"{"categoryReferences": {}, "missingRequirements": []}"#).unwrap();
        assert!(report.is_empty());
        assert_eq!(report.category_references.iter().count(), 7);
        assert!(report.category_references.iter().all(|(_, r)| r.is_none()));
    }

    #[test]
    fn missing_required_keys_are_rejected() {
        assert!(matches!(
            parse_report(r#"{"categoryReferences": {}}"#),
            Err(ClassificationError::Malformed(_))
        ));
        assert!(matches!(
            parse_report(r#"{"missingRequirements": []}"#),
            Err(ClassificationError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_category_is_rejected() {
        let err = parse_report(
            r#"{"categoryReferences": {"marketing": []}, "missingRequirements": []}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("marketing"));
    }

    #[test]
    fn wrongly_shaped_entries_are_rejected() {
        for payload in [
            r#"{"categoryReferences": {"training": "yes"}, "missingRequirements": []}"#,
            r#"{"categoryReferences": {"training": [{"section": "1"}]},
                "missingRequirements": []}"#,
            r#"{"categoryReferences": {}, "missingRequirements": [{"requirement": "x"}]}"#,
            r#"{"categoryReferences": {}, "missingRequirements": null}"#,
            "not json",
        ] {
            assert!(
                matches!(parse_report(payload), Err(ClassificationError::Malformed(_))),
                "accepted {payload}"
            );
        }
    }

    #[test]
    fn schema_lists_every_category() {
        let schema = analysis_schema();
        let props = schema["properties"]["categoryReferences"]["properties"]
            .as_object()
            .unwrap();
        assert_eq!(props.len(), 7);
        for category in Category::ALL {
            assert!(props.contains_key(category.key()));
        }
    }

    #[test]
    fn report_serializes_with_wire_keys() {
        let report = parse_report(FULL_PAYLOAD).unwrap();
        let value = serde_json::to_value(&report).unwrap();
        assert!(value["categoryReferences"]["phiHandling"].is_array());
        assert!(value["missingRequirements"].is_array());
    }

    #[tokio::test]
    async fn classify_sends_document_text() {
        let mock = MockGenerator::new("mock", MockReply::Payload(Some(FULL_PAYLOAD.into())));
        let report = classify(&mock, "1. Definitions. 2. Obligations.").await.unwrap();
        assert_eq!(report.category_references.found_count(), 2);
        assert!(mock.prompts()[0].contains("2. Obligations."));
    }

    #[tokio::test]
    async fn no_payload_is_a_failure_not_an_empty_report() {
        let mock = MockGenerator::new("mock", MockReply::Payload(None));
        let err = classify(&mock, "text").await.unwrap_err();
        assert!(matches!(err, ClassificationError::NoPayload));
        assert_eq!(err.to_string(), "No analysis results returned");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_failure() {
        let mock = MockGenerator::new(
            "mock",
            MockReply::Error(GenerationError::Connection("dns".into())),
        );
        assert!(matches!(
            classify(&mock, "text").await,
            Err(ClassificationError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn blank_text_is_rejected_before_calling() {
        let mock = MockGenerator::new("mock", MockReply::Payload(Some(FULL_PAYLOAD.into())));
        assert!(matches!(
            classify(&mock, "  \n ").await,
            Err(ClassificationError::EmptyDocument)
        ));
        assert_eq!(mock.call_count(), 0);
    }
}
