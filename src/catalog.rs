//! Schema Catalog
//!
//! Human-authored description of the roaming usage table: column semantics
//! and the MCC/MNC code-to-operator mappings. Pure data; it only ever reaches
//! the reasoning step as prompt text.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Table the usage records are loaded into.
pub const USAGE_TABLE: &str = "usage_logs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub description: String,
}

/// Interpretive context only; never enforced against query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMapping {
    pub mcc: String,
    pub mnc: String,
    pub country: String,
    pub operator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub table: String,
    pub columns: Vec<ColumnSpec>,
    pub mappings: Vec<CodeMapping>,
}

fn column(name: &str, description: &str) -> ColumnSpec {
    ColumnSpec {
        name: name.to_string(),
        description: description.to_string(),
    }
}

fn mapping(mcc: &str, mnc: &str, country: &str, operator: &str) -> CodeMapping {
    CodeMapping {
        mcc: mcc.to_string(),
        mnc: mnc.to_string(),
        country: country.to_string(),
        operator: operator.to_string(),
    }
}

impl SchemaCatalog {
    /// Catalog for the roaming usage dataset.
    pub fn roaming() -> Self {
        Self {
            table: USAGE_TABLE.to_string(),
            columns: vec![
                column("imsi", "Unique subscriber identifier to identify a user"),
                column("imsitac", "Device identifier or TAC associated with the IMSI"),
                column("vmcc", "Visited Mobile Country Code"),
                column("vmnc", "Visited Mobile Network Code"),
                column("hmcc", "Home Mobile Country Code"),
                column("hmnc", "Home Mobile Network Code"),
                column(
                    "data_inbound_uploaded_bytes",
                    "Data uploaded by the subscriber while roaming (inbound) in bytes",
                ),
                column(
                    "data_inbound_downloaded_bytes",
                    "Data downloaded by the subscriber while roaming (inbound) in bytes",
                ),
                column(
                    "data_outbound_uploaded_bytes",
                    "Data uploaded by the subscriber while in their home network (outbound) in bytes",
                ),
                column(
                    "data_outbound_downloaded_bytes",
                    "Data downloaded by the subscriber while in their home network (outbound) in bytes",
                ),
                column("2G/3G Usage", "Boolean flag indicating 2G/3G network usage"),
                column("4G/5G Usage", "Boolean flag indicating 4G/5G network usage"),
                column("device_type", "Device type - IOT or NON-IOT"),
                column("extract_date", "date of roaming"),
            ],
            mappings: vec![
                mapping("202", "1", "Germany", "Cosmote"),
                mapping("204", "2", "UK", "Airelo"),
                mapping("206", "3", "India", "Dolphin"),
                mapping("302", "5", "US", "Penguin"),
                mapping("303", "6", "Ireland", "Trek"),
            ],
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        let name = name.trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']');
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Tab-separated schema text in the layout the prompt expects.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Table: {}", self.table);
        let _ = writeln!(out, "Column Name\tDescription");
        for c in &self.columns {
            let _ = writeln!(out, "{}:\t{}", c.name, c.description);
        }
        if !self.mappings.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Mappings:");
            let _ = writeln!(out, "mcc\tmnc\tcountry\toperator");
            for m in &self.mappings {
                let _ = writeln!(out, "{}\t{}\t{}\t{}", m.mcc, m.mnc, m.country, m.operator);
            }
        }
        out
    }
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::roaming()
    }
}
