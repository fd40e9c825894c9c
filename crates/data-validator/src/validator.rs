//! Observation Validator

use crate::error::{ValidationError, ValidationReport};
use crate::observation::{field, AncVisit, Observation, RawObservation, RawValue, VISIT_SLOTS};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Plausible ranges for form readings, taken from the entry widget bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Beneficiary age (years)
    pub age_range: (f64, f64),
    /// Child order / parity
    pub parity_range: (f64, f64),
    /// Number of living children
    pub living_children_range: (f64, f64),
    /// Hemoglobin (g/dL)
    pub hemoglobin_range: (f64, f64),
    /// Height (cm)
    pub height_range: (f64, f64),
    /// Weight at a visit (kg)
    pub weight_range: (f64, f64),
    /// Completed ANC visits
    pub anc_range: (f64, f64),
    /// Food group category
    pub food_group_range: (f64, f64),
    /// Cash-transfer installments received
    pub installment_range: (f64, f64),
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            age_range: (14.0, 60.0),
            parity_range: (0.0, 10.0),
            living_children_range: (0.0, 10.0),
            hemoglobin_range: (3.0, 18.0),
            height_range: (120.0, 200.0),
            weight_range: (30.0, 120.0),
            anc_range: (0.0, 10.0),
            food_group_range: (0.0, 5.0),
            installment_range: (0.0, 3.0),
        }
    }
}

/// Parse an ISO-8601 date or date-time; blank input is `None`
pub fn parse_date(field: &'static str, value: Option<&str>) -> Result<Option<NaiveDate>, ValidationError> {
    let Some(text) = value.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Some(dt.date()));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(Some(dt.date_naive()));
    }

    Err(ValidationError::InvalidDate {
        field,
        value: text.to_string(),
    })
}

/// Days from `earlier` to `later`; rejects a negative gap
pub fn day_gap(
    earlier: (&'static str, NaiveDate),
    later: (&'static str, NaiveDate),
) -> Result<u64, ValidationError> {
    let days = (later.1 - earlier.1).num_days();
    if days < 0 {
        return Err(ValidationError::InvalidTemporalOrder {
            earlier: earlier.0,
            earlier_date: earlier.1,
            later: later.0,
            later_date: later.1,
            days: -days,
        });
    }
    Ok(days as u64)
}

/// Registration, visits and installments must not precede LMP, and visit
/// dates must not go backwards in slot order
pub fn check_temporal_order(
    report: &mut ValidationReport,
    lmp_date: NaiveDate,
    registration_date: NaiveDate,
    visits: &[AncVisit; VISIT_SLOTS],
    installment_dates: &[Option<NaiveDate>; 3],
) {
    let lmp = (field::LMP_DATE, lmp_date);
    report.capture(day_gap(lmp, (field::REGISTRATION_DATE, registration_date)));

    let mut previous: Option<(&'static str, NaiveDate)> = None;
    for (slot, visit) in visits.iter().enumerate() {
        let Some(date) = visit.date else { continue };
        let current = (field::VISIT_DATES[slot], date);
        if report.capture(day_gap(lmp, current)).is_some() {
            if let Some(prev) = previous {
                report.capture(day_gap(prev, current));
            }
        }
        previous = Some(current);
    }

    for (i, date) in installment_dates.iter().enumerate() {
        if let Some(date) = date {
            report.capture(day_gap(lmp, (field::INSTALLMENT_DATES[i], *date)));
        }
    }
}

/// Validator turning a [`RawObservation`] into an [`Observation`]
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a single value against a range
    pub fn validate_range(
        &self,
        field: &'static str,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), ValidationError> {
        if value < range.0 || value > range.1 {
            Err(ValidationError::OutOfRange {
                field,
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    /// Validate every field, collecting all errors
    pub fn validate(&self, raw: &RawObservation) -> Result<Observation, ValidationReport> {
        let mut report = ValidationReport::new();
        let cfg = &self.config;

        let lmp = self.required_date(&mut report, field::LMP_DATE, raw.lmp_date.as_deref());
        let registration = self.required_date(
            &mut report,
            field::REGISTRATION_DATE,
            raw.registration_date.as_deref(),
        );

        let mut visits = [AncVisit::default(); VISIT_SLOTS];
        for (slot, (date, weight)) in raw.visit_dates().into_iter().zip(raw.visit_weights()).enumerate() {
            let date = report.capture(parse_date(field::VISIT_DATES[slot], date)).flatten();
            // A zero weight is the form's "not recorded"
            let weight_kg = weight.and_then(RawValue::as_f64).filter(|w| *w > 0.0);
            let weight_kg = weight_kg.and_then(|w| {
                report.capture(self.validate_range(field::WEIGHTS[slot], w, cfg.weight_range)).map(|_| w)
            });
            visits[slot] = AncVisit { date, weight_kg };
        }

        let mut installment_dates = [None; 3];
        for (i, date) in raw.installment_dates().into_iter().enumerate() {
            installment_dates[i] = report.capture(parse_date(field::INSTALLMENT_DATES[i], date)).flatten();
        }

        let beneficiary_age = self.count(&mut report, field::BENEFICIARY_AGE, raw.beneficiary_age.as_ref(), cfg.age_range);
        let parity = self.count(&mut report, field::PARITY, raw.parity.as_ref(), cfg.parity_range);
        let living_children = self.count(
            &mut report,
            field::LIVING_CHILDREN,
            raw.living_children.as_ref(),
            cfg.living_children_range,
        );
        let hemoglobin = self.reading(&mut report, field::HEMOGLOBIN, raw.hemoglobin.as_ref(), cfg.hemoglobin_range);
        let height_cm = self.reading(&mut report, field::HEIGHT_CM, raw.height_cm.as_ref(), cfg.height_range);
        let anc_completed = self.count(&mut report, field::ANC_COMPLETED, raw.anc_completed.as_ref(), cfg.anc_range);
        let food_group = self.count(&mut report, field::FOOD_GROUP, raw.food_group.as_ref(), cfg.food_group_range);
        let pmmvy_installments = self.count(
            &mut report,
            field::PMMVY_INSTALLMENTS,
            raw.pmmvy_installments.as_ref(),
            cfg.installment_range,
        );
        let jsy_installments = self.count(
            &mut report,
            field::JSY_INSTALLMENTS,
            raw.jsy_installments.as_ref(),
            cfg.installment_range,
        );

        let (Some(lmp_date), Some(registration_date)) = (lmp, registration) else {
            return Err(report);
        };
        check_temporal_order(&mut report, lmp_date, registration_date, &visits, &installment_dates);
        if !report.is_empty() {
            debug!("Rejecting observation with {} error(s)", report.errors.len());
            return Err(report);
        }

        let mut observation = Observation::new(lmp_date, registration_date);
        observation.visits = visits;
        observation.installment_dates = installment_dates;
        observation.beneficiary_age = beneficiary_age;
        observation.parity = parity;
        observation.living_children = living_children;
        observation.hemoglobin = hemoglobin;
        observation.height_cm = height_cm;
        observation.food_group = food_group;
        observation.pmmvy_installments = pmmvy_installments;
        observation.jsy_installments = jsy_installments;
        observation.ifa_tablets = raw.ifa_tablets.as_ref().and_then(RawValue::as_f64);
        observation.calcium_tablets = raw.calcium_tablets.as_ref().and_then(RawValue::as_f64);
        let dated_visits = observation.dated_visit_count() as f64;
        observation.anc_completed = anc_completed.or(Some(dated_visits));

        observation.month_conception = text(raw.month_conception.as_ref());
        observation.tt_injection = text(raw.tt_injection.as_ref());
        observation.consume_tobacco = text(raw.consume_tobacco.as_ref());
        observation.chewing_tobacco = text(raw.chewing_tobacco.as_ref());
        observation.consume_alcohol = text(raw.consume_alcohol.as_ref());
        observation.toilet_type = text(raw.toilet_type.as_ref());
        observation.water_source = text(raw.water_source.as_ref());
        observation.education = text(raw.education.as_ref());
        observation.social_media = text(raw.social_media.as_ref());
        observation.jsy_registered = text(raw.jsy_registered.as_ref());
        observation.rajhshri_registered = text(raw.rajhshri_registered.as_ref());
        observation.household_assets = raw.household_assets.clone();

        Ok(observation)
    }

    fn required_date(
        &self,
        report: &mut ValidationReport,
        field: &'static str,
        value: Option<&str>,
    ) -> Option<NaiveDate> {
        match parse_date(field, value) {
            Ok(Some(date)) => Some(date),
            Ok(None) => {
                report.push(ValidationError::MissingRequiredField(field));
                None
            }
            Err(e) => {
                report.push(e);
                None
            }
        }
    }

    /// Continuous reading: unparseable is missing, out of range is rejected
    fn reading(
        &self,
        report: &mut ValidationReport,
        field: &'static str,
        value: Option<&RawValue>,
        range: (f64, f64),
    ) -> Option<f64> {
        let v = value.and_then(RawValue::as_f64)?;
        report.capture(self.validate_range(field, v, range)).map(|_| v)
    }

    /// Integral count: as [`Self::reading`], and fractional values are rejected
    fn count(
        &self,
        report: &mut ValidationReport,
        field: &'static str,
        value: Option<&RawValue>,
        range: (f64, f64),
    ) -> Option<f64> {
        let v = self.reading(report, field, value, range)?;
        if v.fract() != 0.0 {
            report.push(ValidationError::InvalidFormat {
                field,
                reason: format!("expected a whole number, got {}", v),
            });
            return None;
        }
        Some(v)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

fn text(value: Option<&RawValue>) -> Option<String> {
    value
        .map(|v| v.as_text().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn base_raw() -> RawObservation {
        RawObservation {
            lmp_date: Some("2024-01-01".to_string()),
            registration_date: Some("2024-02-01".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_minimal_observation() {
        let obs = Validator::default().validate(&base_raw()).unwrap();
        assert_eq!(obs.lmp_date, date(2024, 1, 1));
        assert_eq!(obs.registration_date, date(2024, 2, 1));
        assert_eq!(obs.visits.len(), VISIT_SLOTS);
        assert_eq!(obs.anc_completed, Some(0.0));
        assert!(obs.hemoglobin.is_none());
    }

    #[test]
    fn test_missing_dates_are_reported_together() {
        let report = Validator::default().validate(&RawObservation::default()).unwrap_err();
        assert_eq!(
            report.errors,
            vec![
                ValidationError::MissingRequiredField("lmp_date"),
                ValidationError::MissingRequiredField("registration_date"),
            ]
        );
    }

    #[test]
    fn test_temporal_and_range_errors_reported_together() {
        let raw = RawObservation {
            lmp_date: Some("2024-03-01".to_string()),
            registration_date: Some("2024-02-01".to_string()),
            hemoglobin: Some(RawValue::from(42.0)),
            ..Default::default()
        };
        let report = Validator::default().validate(&raw).unwrap_err();
        let kinds: Vec<&str> = report.errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["out_of_range", "invalid_temporal_order"]);
    }

    #[test]
    fn test_visit_order_checked_during_validation() {
        let raw = RawObservation {
            pw1_date: Some("2024-04-01".to_string()),
            pw2_date: Some("2024-03-01".to_string()),
            ..base_raw()
        };
        let report = Validator::default().validate(&raw).unwrap_err();
        assert_eq!(report.errors.len(), 1);
        assert!(report.contains(|e| matches!(
            e,
            ValidationError::InvalidTemporalOrder { earlier: "pw1_date", later: "pw2_date", .. }
        )));
    }

    #[test]
    fn test_malformed_lmp_is_rejected() {
        let raw = RawObservation {
            lmp_date: Some("01/13/2024".to_string()),
            ..base_raw()
        };
        let report = Validator::default().validate(&raw).unwrap_err();
        assert!(report.contains(|e| matches!(e, ValidationError::InvalidDate { field: "lmp_date", .. })));
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("d", Some("2024-03-05")).unwrap(), Some(date(2024, 3, 5)));
        assert_eq!(parse_date("d", Some("2024-03-05T10:30:00")).unwrap(), Some(date(2024, 3, 5)));
        assert_eq!(parse_date("d", Some("2024-03-05 10:30:00.250")).unwrap(), Some(date(2024, 3, 5)));
        assert_eq!(parse_date("d", Some("2024-03-05T10:30:00+05:30")).unwrap(), Some(date(2024, 3, 5)));
        assert_eq!(parse_date("d", Some("   ")).unwrap(), None);
        assert_eq!(parse_date("d", None).unwrap(), None);
        assert!(parse_date("d", Some("2024-02-30")).is_err());
    }

    #[test]
    fn test_unparseable_numeric_becomes_missing() {
        let raw = RawObservation {
            hemoglobin: Some(RawValue::from("n/a")),
            ifa_tablets: Some(RawValue::from("lots")),
            ..base_raw()
        };
        let obs = Validator::default().validate(&raw).unwrap();
        assert!(obs.hemoglobin.is_none());
        assert!(obs.ifa_tablets.is_none());
    }

    #[test]
    fn test_out_of_range_hemoglobin() {
        let raw = RawObservation {
            hemoglobin: Some(RawValue::from(55.0)),
            ..base_raw()
        };
        let report = Validator::default().validate(&raw).unwrap_err();
        assert!(report.contains(|e| matches!(e, ValidationError::OutOfRange { field: "hemoglobin", .. })));
    }

    #[test]
    fn test_fractional_count_rejected() {
        let raw = RawObservation {
            parity: Some(RawValue::from(1.5)),
            ..base_raw()
        };
        let report = Validator::default().validate(&raw).unwrap_err();
        assert!(report.contains(|e| matches!(e, ValidationError::InvalidFormat { field: "parity", .. })));
    }

    #[test]
    fn test_zero_weight_means_not_recorded() {
        let raw = RawObservation {
            weight_pw1: Some(RawValue::from(52.0)),
            weight_pw3: Some(RawValue::from(0.0)),
            ..base_raw()
        };
        let obs = Validator::default().validate(&raw).unwrap();
        assert_eq!(obs.visits[0].weight_kg, Some(52.0));
        assert_eq!(obs.visits[2].weight_kg, None);
    }

    #[test]
    fn test_anc_count_defaults_to_dated_visits() {
        let raw = RawObservation {
            pw1_date: Some("2024-02-01".to_string()),
            pw2_date: Some("2024-04-01".to_string()),
            ..base_raw()
        };
        let obs = Validator::default().validate(&raw).unwrap();
        assert_eq!(obs.anc_completed, Some(2.0));

        let raw = RawObservation {
            anc_completed: Some(RawValue::from(3i64)),
            ..raw
        };
        let obs = Validator::default().validate(&raw).unwrap();
        assert_eq!(obs.anc_completed, Some(3.0));
    }

    #[test]
    fn test_negative_tablets_pass_through() {
        let raw = RawObservation {
            calcium_tablets: Some(RawValue::from(-4.0)),
            ..base_raw()
        };
        let obs = Validator::default().validate(&raw).unwrap();
        assert_eq!(obs.calcium_tablets, Some(-4.0));
    }

    #[test]
    fn test_text_fields_trimmed() {
        let raw = RawObservation {
            education: Some(RawValue::from("  Primary ")),
            social_media: Some(RawValue::from("   ")),
            ..base_raw()
        };
        let obs = Validator::default().validate(&raw).unwrap();
        assert_eq!(obs.education.as_deref(), Some("Primary"));
        assert!(obs.social_media.is_none());
    }

    proptest! {
        #[test]
        fn prop_hemoglobin_accepted_only_in_range(hb in -10.0f64..40.0) {
            let raw = RawObservation {
                hemoglobin: Some(RawValue::from(hb)),
                ..base_raw()
            };
            match Validator::default().validate(&raw) {
                Ok(obs) => {
                    prop_assert!((3.0..=18.0).contains(&hb));
                    prop_assert_eq!(obs.hemoglobin, Some(hb));
                }
                Err(report) => {
                    prop_assert!(!(3.0..=18.0).contains(&hb));
                    prop_assert_eq!(report.errors.len(), 1);
                    let has_out_of_range = report.contains(|e| matches!(
                        e,
                        ValidationError::OutOfRange { field: "hemoglobin", .. }
                    ));
                    prop_assert!(has_out_of_range);
                }
            }
        }
    }
}
