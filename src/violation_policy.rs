//! Violation classification policy
//!
//! Pure, deterministic mapping from raw detections to a per-frame
//! assessment. No I/O here; the threshold and label rule table are injected
//! configuration so deployments can vary the model's class taxonomy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::detector_client::RawDetection;

/// Severity attached to persisted detection records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// One label -> violation mapping. Rules fire in table order, regardless of
/// the order detections arrive in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRule {
    /// Model label, e.g. `NO-Hardhat`
    pub label: String,
    /// Violation text, e.g. `Missing Hard Hat`
    pub violation: String,
}

/// Built-in PPE rule table
pub fn default_rules() -> Vec<ViolationRule> {
    vec![
        ViolationRule {
            label: "NO-Hardhat".to_string(),
            violation: "Missing Hard Hat".to_string(),
        },
        ViolationRule {
            label: "NO-Safety Vest".to_string(),
            violation: "Missing Safety Vest".to_string(),
        },
        ViolationRule {
            label: "NO-Mask".to_string(),
            violation: "Missing Mask".to_string(),
        },
    ]
}

/// A confirmed violation within one frame
#[derive(Debug, Clone)]
pub struct ViolationFinding {
    pub label: String,
    pub violation: String,
    pub confidence: f32,
}

impl ViolationFinding {
    /// Report form, e.g. `Missing Hard Hat (Confidence: 91.0%)`
    pub fn summary(&self) -> String {
        format!(
            "{} (Confidence: {:.1}%)",
            self.violation,
            self.confidence * 100.0
        )
    }
}

/// Outcome of classifying one frame. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct ViolationAssessment {
    /// Violations in rule-table order
    pub findings: Vec<ViolationFinding>,
    /// All-clear entry when a person is visible and nothing fired
    pub informational: Option<String>,
    pub has_violation: bool,
}

impl ViolationAssessment {
    /// Report entries: finding summaries, or the single informational line
    pub fn entries(&self) -> Vec<String> {
        if self.has_violation {
            self.findings.iter().map(|f| f.summary()).collect()
        } else {
            self.informational.iter().cloned().collect()
        }
    }

    /// Entries joined for logs, records and spoken alerts
    pub fn summary_text(&self) -> String {
        self.entries().join(", ")
    }

    /// Highest finding confidence, 0.0 when there is none
    pub fn max_confidence(&self) -> f32 {
        self.findings.iter().map(|f| f.confidence).fold(0.0, f32::max)
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty() && self.informational.is_none()
    }
}

/// Classification policy (threshold + rule table)
#[derive(Debug, Clone)]
pub struct ViolationPolicy {
    pub confidence_threshold: f32,
    pub rules: Vec<ViolationRule>,
    pub person_label: String,
    pub all_clear_text: String,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            rules: default_rules(),
            person_label: "Person".to_string(),
            all_clear_text: "Person Detected - All PPE Requirements Met".to_string(),
        }
    }
}

impl ViolationPolicy {
    pub fn new(confidence_threshold: f32, rules: Vec<ViolationRule>) -> Self {
        Self {
            confidence_threshold,
            rules,
            ..Default::default()
        }
    }

    /// Classify one frame's detections.
    ///
    /// Detections below the threshold are dropped (>= threshold is kept),
    /// duplicate labels collapse to their maximum confidence, and rules fire
    /// in table order.
    pub fn assess(&self, detections: &[RawDetection]) -> ViolationAssessment {
        let mut best: HashMap<&str, f32> = HashMap::new();
        for det in detections {
            if det.confidence < self.confidence_threshold {
                continue;
            }
            let entry = best.entry(det.label.as_str()).or_insert(det.confidence);
            if det.confidence > *entry {
                *entry = det.confidence;
            }
        }

        let mut assessment = ViolationAssessment::default();
        for rule in &self.rules {
            if let Some(&confidence) = best.get(rule.label.as_str()) {
                assessment.findings.push(ViolationFinding {
                    label: rule.label.clone(),
                    violation: rule.violation.clone(),
                    confidence,
                });
            }
        }

        if !assessment.findings.is_empty() {
            assessment.has_violation = true;
        } else if best.contains_key(self.person_label.as_str()) {
            assessment.informational = Some(self.all_clear_text.clone());
        }

        assessment
    }

    /// Labels that survive thresholding, for the periodic status log
    pub fn retained_labels(&self, detections: &[RawDetection]) -> Vec<String> {
        detections
            .iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .map(|d| format!("{} {:.2}", d.label, d.confidence))
            .collect()
    }
}
