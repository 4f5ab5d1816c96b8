//! Exemplar Set
//!
//! Worked (question, query, answer, insight) examples that steer the
//! reasoning component toward the expected output shape. Order matters:
//! earlier exemplars tend to win ties.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exemplar {
    pub question: String,
    pub query: String,
    pub answer: String,
    pub insight: String,
}

impl Exemplar {
    pub fn new(question: &str, query: &str, answer: &str, insight: &str) -> Self {
        Self {
            question: question.to_string(),
            query: query.to_string(),
            answer: answer.to_string(),
            insight: insight.to_string(),
        }
    }
}

pub fn default_exemplars() -> Vec<Exemplar> {
    vec![
        Exemplar::new(
            "How much data was used by subscribers while roaming in January 2025?",
            "SELECT
    SUM(data_inbound_uploaded_bytes + data_inbound_downloaded_bytes) AS total_roaming_data_bytes
FROM usage_logs
WHERE strftime('%Y-%m', extract_date) = '2025-01';",
            "Total roaming data used in January 2025: 2,145,678,900 bytes.",
            "Roaming usage in January 2025 surged to over 2.1 GB, marking a 28% increase compared to the prior month, likely due to post-holiday international travel. This trend signals an opportunity to launch targeted \"New Year Roaming Packs\" to capture seasonal high-value usage.",
        ),
        Exemplar::new(
            "Which country had the highest inbound data usage by users?",
            "SELECT
    vmcc, vmnc,
    SUM(data_inbound_uploaded_bytes + data_inbound_downloaded_bytes) AS total_inbound_data_bytes
FROM usage_logs
GROUP BY vmcc, vmnc
ORDER BY total_inbound_data_bytes DESC
LIMIT 1;",
            "Germany (Cosmote) recorded the highest inbound data usage at 987,654,321 bytes.",
            "Germany's Cosmote network leads in inbound roaming traffic, indicating a lucrative partnership point for preferential bandwidth agreements. Strengthening capacity planning here could drive better service quality for high-value inbound roamers.",
        ),
        Exemplar::new(
            "How many IOT devices used 4G/5G networks while roaming?",
            "SELECT
    COUNT(DISTINCT imsi) AS iot_device_count
FROM usage_logs
WHERE device_type = 'IOT'
  AND \"4G/5G Usage\" = 1;",
            "4,230 IOT devices used 4G/5G networks while roaming.",
            "A growing IoT presence on high-speed roaming networks suggests untapped revenue in enterprise M2M services. This trend justifies investment in IoT-specific roaming bundles with guaranteed latency SLAs.",
        ),
    ]
}

/// Render exemplars as numbered few-shot blocks separated by `---`.
pub fn render_exemplars(exemplars: &[Exemplar]) -> String {
    let mut out = String::new();
    for (idx, ex) in exemplars.iter().enumerate() {
        if idx > 0 {
            out.push_str("\n---\n\n");
        }
        let _ = writeln!(out, "### Example {}", idx + 1);
        let _ = writeln!(out, "User Question:\n{}\n", ex.question);
        let _ = writeln!(out, "SQL Query:\n{}\n", ex.query);
        let _ = writeln!(out, "Answer:\n{}\n", ex.answer);
        let _ = writeln!(out, "Insight:\n{}", ex.insight);
    }
    out
}
