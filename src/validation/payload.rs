//! Record payload schema
//!
//! Payloads are a closed, versioned set of shapes. Anything that does not
//! deserialize into one of them, or fails the field rules, is rejected before
//! it reaches the vault or the ledger.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::validation::guards::check_safe_text;

pub const MAX_LIST_ITEMS: usize = 10;
pub const MAX_AGE: u16 = 150;
pub const MAX_WEIGHT_KG: f64 = 500.0;

/// Versioned record payload, tagged by `schema` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema")]
pub enum RecordPayload {
    #[serde(rename = "v1")]
    V1(EmergencyProfileV1),
}

/// Emergency profile carried by schema `v1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyProfileV1 {
    pub name: String,
    pub age: u16,
    pub weight: f64,
    pub blood_type: BloodType,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APos,
    #[serde(rename = "A-")]
    ANeg,
    #[serde(rename = "B+")]
    BPos,
    #[serde(rename = "B-")]
    BNeg,
    #[serde(rename = "AB+")]
    AbPos,
    #[serde(rename = "AB-")]
    AbNeg,
    #[serde(rename = "O+")]
    OPos,
    #[serde(rename = "O-")]
    ONeg,
}

impl RecordPayload {
    pub fn schema_version(&self) -> &'static str {
        match self {
            RecordPayload::V1(_) => "v1",
        }
    }

    /// Display name of the record owner
    pub fn display_name(&self) -> &str {
        match self {
            RecordPayload::V1(profile) => &profile.name,
        }
    }

    /// First listed condition, shown in record listings
    pub fn primary_condition(&self) -> Option<&str> {
        match self {
            RecordPayload::V1(profile) => profile.conditions.first().map(String::as_str),
        }
    }

    /// Apply the field rules of the payload's schema
    pub fn validate(&self) -> Result<(), LedgerError> {
        match self {
            RecordPayload::V1(profile) => profile.validate(),
        }
    }
}

impl EmergencyProfileV1 {
    fn validate(&self) -> Result<(), LedgerError> {
        check_safe_text("name", &self.name)?;

        if self.age > MAX_AGE {
            return Err(LedgerError::validation(format!(
                "age {} outside 0..={}",
                self.age, MAX_AGE
            )));
        }

        if !self.weight.is_finite() || self.weight < 0.0 || self.weight > MAX_WEIGHT_KG {
            return Err(LedgerError::validation(format!(
                "weight {} outside 0..={}",
                self.weight, MAX_WEIGHT_KG
            )));
        }

        check_list("conditions", &self.conditions)?;
        check_list("medications", &self.medications)?;
        check_list("allergies", &self.allergies)?;
        Ok(())
    }
}

fn check_list(field: &str, items: &[String]) -> Result<(), LedgerError> {
    if items.len() > MAX_LIST_ITEMS {
        return Err(LedgerError::validation(format!(
            "{} has {} items (max {})",
            field,
            items.len(),
            MAX_LIST_ITEMS
        )));
    }
    for item in items {
        check_safe_text(field, item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RecordPayload {
        RecordPayload::V1(EmergencyProfileV1 {
            name: "Ada Lovelace".to_string(),
            age: 36,
            weight: 58.5,
            blood_type: BloodType::ONeg,
            conditions: vec!["Asthma".to_string()],
            medications: vec!["Salbutamol".to_string()],
            allergies: vec![],
        })
    }

    #[test]
    fn test_wire_format() {
        let payload: RecordPayload = serde_json::from_value(json!({
            "schema": "v1",
            "name": "Ada Lovelace",
            "age": 36,
            "weight": 58.5,
            "bloodType": "O-",
            "conditions": ["Asthma"],
            "medications": ["Salbutamol"]
        }))
        .unwrap();

        assert_eq!(payload, sample());
        assert_eq!(payload.schema_version(), "v1");
        assert_eq!(payload.primary_condition(), Some("Asthma"));
    }

    #[test]
    fn test_unknown_schema_rejected() {
        let result: Result<RecordPayload, _> = serde_json::from_value(json!({
            "schema": "v9",
            "name": "Ada"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_field_rules() {
        assert!(sample().validate().is_ok());

        let RecordPayload::V1(mut profile) = sample();
        profile.age = 151;
        assert!(RecordPayload::V1(profile).validate().is_err());

        let RecordPayload::V1(mut profile) = sample();
        profile.weight = f64::NAN;
        assert!(RecordPayload::V1(profile).validate().is_err());

        let RecordPayload::V1(mut profile) = sample();
        profile.allergies = (0..11).map(|i| format!("allergen {}", i)).collect();
        assert!(RecordPayload::V1(profile).validate().is_err());

        let RecordPayload::V1(mut profile) = sample();
        profile.medications = vec!["<img src=x>".to_string()];
        assert!(RecordPayload::V1(profile).validate().is_err());
    }
}
