//! FHIR R4 export for sharing CGM data with clinicians
//!
//! LOINC Code Mappings:
//! - Glucose reading: 2339-0 (Glucose [Mass/volume] in Blood)
//! - GMI: 97506-0 (Glucose management indicator)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CgmSettings, Device, Reading};

/// LOINC codes for CGM observations
pub mod loinc {
    pub const GLUCOSE: &str = "2339-0";
    pub const GLUCOSE_DISPLAY: &str = "Glucose [Mass/volume] in Blood";

    pub const GMI: &str = "97506-0";
    pub const GMI_DISPLAY: &str = "Glucose management indicator";
}

/// FHIR coding system URLs
pub mod systems {
    pub const LOINC: &str = "http://loinc.org";
    pub const UCUM: &str = "http://unitsofmeasure.org";
    pub const OBSERVATION_CATEGORY: &str =
        "http://terminology.hl7.org/CodeSystem/observation-category";
    pub const INTERPRETATION: &str =
        "http://terminology.hl7.org/CodeSystem/v3-ObservationInterpretation";
}

/// FHIR R4 Observation resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirObservation {
    /// Resource type (always "Observation")
    pub resource_type: String,
    pub id: String,
    pub meta: FhirMeta,
    pub status: String,
    pub category: Vec<FhirCodeableConcept>,
    /// What was observed
    pub code: FhirCodeableConcept,
    /// Patient reference
    pub subject: FhirReference,
    pub effective_date_time: String,
    pub issued: String,
    pub value_quantity: FhirQuantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<Vec<FhirCodeableConcept>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_range: Option<Vec<FhirReferenceRange>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<FhirReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<Vec<FhirAnnotation>>,
}

/// FHIR resource metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirMeta {
    pub version_id: String,
    pub last_updated: String,
    pub profile: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirCodeableConcept {
    pub coding: Vec<FhirCoding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirCoding {
    pub system: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirReference {
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirQuantity {
    pub value: f64,
    pub unit: String,
    pub system: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirReferenceRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<FhirQuantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<FhirQuantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirAnnotation {
    pub text: String,
    pub time: String,
}

/// FHIR Bundle resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirBundle {
    pub resource_type: String,
    pub id: String,
    #[serde(rename = "type")]
    pub bundle_type: String,
    pub timestamp: String,
    pub total: u32,
    pub entry: Vec<FhirBundleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirBundleEntry {
    pub full_url: String,
    pub resource: FhirObservation,
}

fn mg_dl(value: f64) -> FhirQuantity {
    FhirQuantity {
        value,
        unit: "mg/dL".to_string(),
        system: systems::UCUM.to_string(),
        code: "mg/dL".to_string(),
    }
}

fn laboratory_category() -> Vec<FhirCodeableConcept> {
    vec![FhirCodeableConcept {
        coding: vec![FhirCoding {
            system: systems::OBSERVATION_CATEGORY.to_string(),
            code: "laboratory".to_string(),
            display: Some("Laboratory".to_string()),
        }],
        text: None,
    }]
}

fn loinc_code(code: &str, display: &str) -> FhirCodeableConcept {
    FhirCodeableConcept {
        coding: vec![FhirCoding {
            system: systems::LOINC.to_string(),
            code: code.to_string(),
            display: Some(display.to_string()),
        }],
        text: Some(display.to_string()),
    }
}

fn meta() -> FhirMeta {
    FhirMeta {
        version_id: "1".to_string(),
        last_updated: Utc::now().to_rfc3339(),
        profile: vec!["http://hl7.org/fhir/StructureDefinition/Observation".to_string()],
    }
}

fn subject(patient_reference: &str) -> FhirReference {
    FhirReference {
        reference: patient_reference.to_string(),
        display: Some("CGM Subject".to_string()),
    }
}

/// HL7 v3 interpretation code for a glucose value under the alert thresholds
pub fn interpretation_code(value: u16, settings: &CgmSettings) -> (&'static str, &'static str) {
    if value <= settings.urgent_low_threshold {
        ("LL", "Critical low")
    } else if value < settings.low_threshold {
        ("L", "Low")
    } else if value > settings.high_threshold {
        ("H", "High")
    } else {
        ("N", "Normal")
    }
}

/// Convert a glucose reading to a FHIR Observation
pub fn to_glucose_observation(
    reading: &Reading,
    settings: &CgmSettings,
    device: Option<&Device>,
    patient_reference: &str,
) -> FhirObservation {
    let (code, display) = interpretation_code(reading.value, settings);

    FhirObservation {
        resource_type: "Observation".to_string(),
        id: reading.id.to_string(),
        meta: meta(),
        status: "final".to_string(),
        category: laboratory_category(),
        code: loinc_code(loinc::GLUCOSE, loinc::GLUCOSE_DISPLAY),
        subject: subject(patient_reference),
        effective_date_time: reading.timestamp.to_rfc3339(),
        issued: Utc::now().to_rfc3339(),
        value_quantity: mg_dl(f64::from(reading.value)),
        interpretation: Some(vec![FhirCodeableConcept {
            coding: vec![FhirCoding {
                system: systems::INTERPRETATION.to_string(),
                code: code.to_string(),
                display: Some(display.to_string()),
            }],
            text: None,
        }]),
        reference_range: Some(vec![FhirReferenceRange {
            low: Some(mg_dl(f64::from(settings.target_range_min))),
            high: Some(mg_dl(f64::from(settings.target_range_max))),
            text: Some("Target glucose range".to_string()),
        }]),
        device: device.map(|d| FhirReference {
            reference: format!("Device/{}", d.id),
            display: Some(d.name.clone()),
        }),
        note: Some(vec![FhirAnnotation {
            text: format!("Trend: {} {}", reading.trend.arrow(), reading.trend.description()),
            time: reading.timestamp.to_rfc3339(),
        }]),
    }
}

/// Convert a GMI value to a FHIR Observation
pub fn to_gmi_observation(
    gmi: f64,
    window_hours: u32,
    computed_at: DateTime<Utc>,
    patient_reference: &str,
) -> FhirObservation {
    FhirObservation {
        resource_type: "Observation".to_string(),
        id: Uuid::new_v4().to_string(),
        meta: meta(),
        status: "final".to_string(),
        category: laboratory_category(),
        code: loinc_code(loinc::GMI, loinc::GMI_DISPLAY),
        subject: subject(patient_reference),
        effective_date_time: computed_at.to_rfc3339(),
        issued: Utc::now().to_rfc3339(),
        value_quantity: FhirQuantity {
            value: gmi,
            unit: "%".to_string(),
            system: systems::UCUM.to_string(),
            code: "%".to_string(),
        },
        interpretation: None,
        reference_range: None,
        device: None,
        note: Some(vec![FhirAnnotation {
            text: format!(
                "Estimated from mean sensor glucose over the last {} days",
                window_hours / 24
            ),
            time: computed_at.to_rfc3339(),
        }]),
    }
}

/// Collect observations into a `collection` Bundle
pub fn to_fhir_bundle(observations: Vec<FhirObservation>) -> FhirBundle {
    FhirBundle {
        resource_type: "Bundle".to_string(),
        id: Uuid::new_v4().to_string(),
        bundle_type: "collection".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        total: observations.len() as u32,
        entry: observations
            .into_iter()
            .map(|obs| FhirBundleEntry {
                full_url: format!("urn:uuid:{}", obs.id),
                resource: obs,
            })
            .collect(),
    }
}
