//! Usage record
//!
//! One row of the usage table, as exported from the source spreadsheet.

use crate::error::{Result, RoamingError};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    #[serde(rename = "IOT")]
    Iot,
    #[serde(rename = "NON-IOT")]
    NonIot,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Iot => "IOT",
            DeviceType::NonIot => "NON-IOT",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = RoamingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('_', "-").as_str() {
            "IOT" => Ok(DeviceType::Iot),
            "NON-IOT" | "NONIOT" => Ok(DeviceType::NonIot),
            other => Err(RoamingError::Ingest(format!(
                "device_type must be IOT or NON-IOT, got '{}'",
                other
            ))),
        }
    }
}

/// Raw CSV row; every field is text until validated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUsageRow {
    #[serde(default)]
    pub imsi: String,
    #[serde(default)]
    pub imsitac: String,
    #[serde(default)]
    pub vmcc: String,
    #[serde(default)]
    pub vmnc: String,
    #[serde(default)]
    pub hmcc: String,
    #[serde(default)]
    pub hmnc: String,
    #[serde(default)]
    pub data_inbound_uploaded_bytes: String,
    #[serde(default)]
    pub data_inbound_downloaded_bytes: String,
    #[serde(default)]
    pub data_outbound_uploaded_bytes: String,
    #[serde(default)]
    pub data_outbound_downloaded_bytes: String,
    #[serde(rename = "2G/3G Usage", default)]
    pub usage_2g_3g: String,
    #[serde(rename = "4G/5G Usage", default)]
    pub usage_4g_5g: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub extract_date: String,
}

impl RawUsageRow {
    pub fn is_blank(&self) -> bool {
        [
            &self.imsi,
            &self.imsitac,
            &self.vmcc,
            &self.vmnc,
            &self.hmcc,
            &self.hmnc,
            &self.data_inbound_uploaded_bytes,
            &self.data_inbound_downloaded_bytes,
            &self.data_outbound_uploaded_bytes,
            &self.data_outbound_downloaded_bytes,
            &self.usage_2g_3g,
            &self.usage_4g_5g,
            &self.device_type,
            &self.extract_date,
        ]
        .iter()
        .all(|v| v.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub imsi: String,
    pub imsitac: String,
    pub vmcc: String,
    pub vmnc: String,
    pub hmcc: String,
    pub hmnc: String,
    pub inbound_uploaded_bytes: u64,
    pub inbound_downloaded_bytes: u64,
    pub outbound_uploaded_bytes: u64,
    pub outbound_downloaded_bytes: u64,
    pub uses_2g_3g: bool,
    pub uses_4g_5g: bool,
    pub device_type: DeviceType,
    pub extract_date: NaiveDate,
}

impl TryFrom<RawUsageRow> for UsageRecord {
    type Error = RoamingError;

    fn try_from(raw: RawUsageRow) -> Result<Self> {
        Ok(Self {
            imsi: required("imsi", &raw.imsi)?,
            imsitac: code(&raw.imsitac),
            vmcc: code(&raw.vmcc),
            vmnc: code(&raw.vmnc),
            hmcc: code(&raw.hmcc),
            hmnc: code(&raw.hmnc),
            inbound_uploaded_bytes: byte_count(
                "data_inbound_uploaded_bytes",
                &raw.data_inbound_uploaded_bytes,
            )?,
            inbound_downloaded_bytes: byte_count(
                "data_inbound_downloaded_bytes",
                &raw.data_inbound_downloaded_bytes,
            )?,
            outbound_uploaded_bytes: byte_count(
                "data_outbound_uploaded_bytes",
                &raw.data_outbound_uploaded_bytes,
            )?,
            outbound_downloaded_bytes: byte_count(
                "data_outbound_downloaded_bytes",
                &raw.data_outbound_downloaded_bytes,
            )?,
            uses_2g_3g: flag("2G/3G Usage", &raw.usage_2g_3g)?,
            uses_4g_5g: flag("4G/5G Usage", &raw.usage_4g_5g)?,
            device_type: raw.device_type.parse()?,
            extract_date: date("extract_date", &raw.extract_date)?,
        })
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = code(value);
    if value.is_empty() {
        return Err(RoamingError::Ingest(format!("{} is required", field)));
    }
    Ok(value)
}

/// Spreadsheet exports often render integer codes as floats ("202.0").
fn code(value: &str) -> String {
    let value = value.trim();
    match value.strip_suffix(".0") {
        Some(stripped) if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) => {
            stripped.to_string()
        }
        _ => value.to_string(),
    }
}

fn byte_count(field: &str, value: &str) -> Result<u64> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    let too_large = || {
        RoamingError::Ingest(format!(
            "{} exceeds the largest storable byte count, got {}",
            field, value
        ))
    };
    if let Ok(n) = value.parse::<u64>() {
        return if n <= i64::MAX as u64 { Ok(n) } else { Err(too_large()) };
    }
    match value.parse::<f64>() {
        Ok(f) if f >= 0.0 && f.fract() == 0.0 && f < i64::MAX as f64 => Ok(f as u64),
        Ok(f) if f >= i64::MAX as f64 => Err(too_large()),
        Ok(f) if f < 0.0 => Err(RoamingError::Ingest(format!(
            "{} must be non-negative, got {}",
            field, value
        ))),
        _ => Err(RoamingError::Ingest(format!(
            "{} must be a whole number of bytes, got '{}'",
            field, value
        ))),
    }
}

fn flag(field: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" | "yes" | "y" => Ok(true),
        "0" | "0.0" | "false" | "no" | "n" | "" => Ok(false),
        other => Err(RoamingError::Ingest(format!(
            "{} must be a boolean flag, got '{}'",
            field, other
        ))),
    }
}

fn date(field: &str, value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .map_err(|_| {
            RoamingError::Ingest(format!("{} must be a calendar date, got '{}'", field, value))
        })
}
