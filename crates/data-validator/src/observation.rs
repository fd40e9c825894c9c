//! Raw and Validated Observations

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Number of ANC visit slots carried by the form (PW1..PW4)
pub const VISIT_SLOTS: usize = 4;

/// Raw field names as accepted on the wire
pub mod field {
    pub const BENEFICIARY_AGE: &str = "beneficiary_age";
    pub const PARITY: &str = "parity";
    pub const LIVING_CHILDREN: &str = "living_children";
    pub const MONTH_CONCEPTION: &str = "month_conception";
    pub const HEMOGLOBIN: &str = "hemoglobin";
    pub const HEIGHT_CM: &str = "height_cm";
    pub const WEIGHTS: [&str; 4] = ["weight_pw1", "weight_pw2", "weight_pw3", "weight_pw4"];
    pub const VISIT_DATES: [&str; 4] = ["pw1_date", "pw2_date", "pw3_date", "pw4_date"];
    pub const ANC_COMPLETED: &str = "anc_completed";
    pub const TT_INJECTION: &str = "tt_injection";
    pub const IFA_TABLETS: &str = "ifa_tablets";
    pub const CALCIUM_TABLETS: &str = "calcium_tablets";
    pub const FOOD_GROUP: &str = "food_group";
    pub const PMMVY_INSTALLMENTS: &str = "pmmvy_installments";
    pub const JSY_INSTALLMENTS: &str = "jsy_installments";
    pub const LMP_DATE: &str = "lmp_date";
    pub const REGISTRATION_DATE: &str = "registration_date";
    pub const INSTALLMENT_DATES: [&str; 3] = ["inst1_date", "inst2_date", "inst3_date"];
}

/// A scalar as supplied by a form or API caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Permissive numeric reading; text that does not parse is `None`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) => Some(*n).filter(|v| v.is_finite()),
            RawValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            RawValue::Bool(_) => None,
        }
    }

    /// Text form used for categorical lookups
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            RawValue::Text(s) => Cow::Borrowed(s.as_str()),
            RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Cow::Owned(format!("{}", *n as i64))
            }
            RawValue::Number(n) => Cow::Owned(n.to_string()),
            RawValue::Bool(true) => Cow::Borrowed("true"),
            RawValue::Bool(false) => Cow::Borrowed("false"),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

/// Flat record submitted by the data-entry form.
///
/// Every field is optional at the type level; unknown keys are ignored.
/// Aliases accept the key spellings used by earlier form revisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawObservation {
    pub beneficiary_age: Option<RawValue>,
    pub parity: Option<RawValue>,
    pub living_children: Option<RawValue>,
    pub month_conception: Option<RawValue>,

    #[serde(alias = "measured_HB")]
    pub hemoglobin: Option<RawValue>,
    #[serde(alias = "height")]
    pub height_cm: Option<RawValue>,
    pub weight_pw1: Option<RawValue>,
    pub weight_pw2: Option<RawValue>,
    pub weight_pw3: Option<RawValue>,
    pub weight_pw4: Option<RawValue>,

    #[serde(alias = "pc_pw1")]
    pub pw1_date: Option<String>,
    #[serde(alias = "pc_pw2")]
    pub pw2_date: Option<String>,
    #[serde(alias = "pc_pw3")]
    pub pw3_date: Option<String>,
    #[serde(alias = "pc_pw4")]
    pub pw4_date: Option<String>,
    pub anc_completed: Option<RawValue>,
    #[serde(alias = "tt_given")]
    pub tt_injection: Option<RawValue>,

    #[serde(alias = "ifa_tabs")]
    pub ifa_tablets: Option<RawValue>,
    #[serde(alias = "calcium_tabs")]
    pub calcium_tablets: Option<RawValue>,
    pub food_group: Option<RawValue>,

    pub consume_tobacco: Option<RawValue>,
    pub chewing_tobacco: Option<RawValue>,
    pub consume_alcohol: Option<RawValue>,

    pub household_assets: Option<Vec<String>>,
    #[serde(alias = "toilet_type_clean")]
    pub toilet_type: Option<RawValue>,
    #[serde(alias = "water_source_clean")]
    pub water_source: Option<RawValue>,
    #[serde(alias = "education_clean")]
    pub education: Option<RawValue>,
    pub social_media: Option<RawValue>,

    pub jsy_registered: Option<RawValue>,
    #[serde(alias = "raj_registered")]
    pub rajhshri_registered: Option<RawValue>,
    #[serde(alias = "pmmvy_count")]
    pub pmmvy_installments: Option<RawValue>,
    #[serde(alias = "jsy_count")]
    pub jsy_installments: Option<RawValue>,

    pub lmp_date: Option<String>,
    pub registration_date: Option<String>,
    pub inst1_date: Option<String>,
    pub inst2_date: Option<String>,
    pub inst3_date: Option<String>,
}

impl RawObservation {
    /// Visit dates in slot order
    pub fn visit_dates(&self) -> [Option<&str>; VISIT_SLOTS] {
        [
            self.pw1_date.as_deref(),
            self.pw2_date.as_deref(),
            self.pw3_date.as_deref(),
            self.pw4_date.as_deref(),
        ]
    }

    /// Visit weights in slot order
    pub fn visit_weights(&self) -> [Option<&RawValue>; VISIT_SLOTS] {
        [
            self.weight_pw1.as_ref(),
            self.weight_pw2.as_ref(),
            self.weight_pw3.as_ref(),
            self.weight_pw4.as_ref(),
        ]
    }

    /// Installment dates in order
    pub fn installment_dates(&self) -> [Option<&str>; 3] {
        [
            self.inst1_date.as_deref(),
            self.inst2_date.as_deref(),
            self.inst3_date.as_deref(),
        ]
    }
}

/// One ANC visit slot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AncVisit {
    /// Date the visit was completed
    pub date: Option<NaiveDate>,
    /// Weight recorded at the visit (kg)
    pub weight_kg: Option<f64>,
}

/// A validated observation: dates parsed, numerics coerced, text trimmed
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub lmp_date: NaiveDate,
    pub registration_date: NaiveDate,
    /// Visit slots in form order
    pub visits: [AncVisit; VISIT_SLOTS],
    pub installment_dates: [Option<NaiveDate>; 3],

    pub beneficiary_age: Option<f64>,
    pub parity: Option<f64>,
    pub living_children: Option<f64>,
    pub hemoglobin: Option<f64>,
    pub height_cm: Option<f64>,
    pub anc_completed: Option<f64>,
    pub ifa_tablets: Option<f64>,
    pub calcium_tablets: Option<f64>,
    pub food_group: Option<f64>,
    pub pmmvy_installments: Option<f64>,
    pub jsy_installments: Option<f64>,

    pub month_conception: Option<String>,
    pub tt_injection: Option<String>,
    pub consume_tobacco: Option<String>,
    pub chewing_tobacco: Option<String>,
    pub consume_alcohol: Option<String>,
    pub toilet_type: Option<String>,
    pub water_source: Option<String>,
    pub education: Option<String>,
    pub social_media: Option<String>,
    pub jsy_registered: Option<String>,
    pub rajhshri_registered: Option<String>,

    pub household_assets: Option<Vec<String>>,
}

impl Observation {
    /// Observation with only the mandatory dates set
    pub fn new(lmp_date: NaiveDate, registration_date: NaiveDate) -> Self {
        Self {
            lmp_date,
            registration_date,
            visits: [AncVisit::default(); VISIT_SLOTS],
            installment_dates: [None; 3],
            beneficiary_age: None,
            parity: None,
            living_children: None,
            hemoglobin: None,
            height_cm: None,
            anc_completed: None,
            ifa_tablets: None,
            calcium_tablets: None,
            food_group: None,
            pmmvy_installments: None,
            jsy_installments: None,
            month_conception: None,
            tt_injection: None,
            consume_tobacco: None,
            chewing_tobacco: None,
            consume_alcohol: None,
            toilet_type: None,
            water_source: None,
            education: None,
            social_media: None,
            jsy_registered: None,
            rajhshri_registered: None,
            household_assets: None,
        }
    }

    /// Number of visit slots carrying a date
    pub fn dated_visit_count(&self) -> usize {
        self.visits.iter().filter(|v| v.date.is_some()).count()
    }
}
