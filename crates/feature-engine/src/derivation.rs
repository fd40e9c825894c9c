//! Derivation Rules
//!
//! Pure functions computing engineered features (risk bins, timing buckets,
//! BMI, day gaps, log transforms, asset score) from validated inputs. A
//! derivation whose inputs are missing yields `None`, never zero.

use crate::error::FeatureError;
use crate::normalizer::canonical_key;
use chrono::{Datelike, Duration, Month, NaiveDate};
use data_validator::{check_temporal_order, day_gap, field, Observation, ValidationError, ValidationReport};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Hemoglobin risk bin, ordered from highest to lowest risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HbRiskBin {
    SevereAnaemia,
    ModerateAnaemia,
    MildAnaemia,
    Normal,
}

impl HbRiskBin {
    pub const ALL: [HbRiskBin; 4] = [
        HbRiskBin::SevereAnaemia,
        HbRiskBin::ModerateAnaemia,
        HbRiskBin::MildAnaemia,
        HbRiskBin::Normal,
    ];

    /// Label used at training time
    pub fn as_str(&self) -> &'static str {
        match self {
            HbRiskBin::SevereAnaemia => "severe_anaemia",
            HbRiskBin::ModerateAnaemia => "moderate_anaemia",
            HbRiskBin::MildAnaemia => "mild_anaemia",
            HbRiskBin::Normal => "normal",
        }
    }
}

/// Upper (exclusive) hemoglobin bounds of each anaemia bin, g/dL
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HbThresholds {
    pub severe_below: f64,
    pub moderate_below: f64,
    pub mild_below: f64,
}

impl Default for HbThresholds {
    fn default() -> Self {
        Self {
            severe_below: 6.0,
            moderate_below: 8.0,
            mild_below: 11.0,
        }
    }
}

impl HbThresholds {
    /// Table with the top break at 7 g/dL, used by some model revisions
    pub fn alternate() -> Self {
        Self {
            severe_below: 7.0,
            ..Default::default()
        }
    }

    /// Breaks must be finite and strictly increasing
    pub fn validate(&self) -> Result<(), FeatureError> {
        let breaks = [self.severe_below, self.moderate_below, self.mild_below];
        if breaks.iter().any(|b| !b.is_finite()) || breaks.windows(2).any(|w| w[0] >= w[1]) {
            return Err(FeatureError::InvalidConfig(format!(
                "hemoglobin thresholds must increase strictly, got {}/{}/{}",
                self.severe_below, self.moderate_below, self.mild_below
            )));
        }
        Ok(())
    }
}

/// Bin a hemoglobin reading; a boundary value falls into the lower-risk bin
pub fn hb_risk_bin(hb: f64, thresholds: &HbThresholds) -> HbRiskBin {
    if hb < thresholds.severe_below {
        HbRiskBin::SevereAnaemia
    } else if hb < thresholds.moderate_below {
        HbRiskBin::ModerateAnaemia
    } else if hb < thresholds.mild_below {
        HbRiskBin::MildAnaemia
    } else {
        HbRiskBin::Normal
    }
}

/// Timing of an event relative to LMP
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimingBucket {
    Early,
    Mid,
    Late,
}

impl TimingBucket {
    pub const ALL: [TimingBucket; 3] = [TimingBucket::Early, TimingBucket::Mid, TimingBucket::Late];

    /// Label used at training time
    pub fn as_str(&self) -> &'static str {
        match self {
            TimingBucket::Early => "Early",
            TimingBucket::Mid => "Mid",
            TimingBucket::Late => "Late",
        }
    }
}

/// Day-gap boundaries: `< early_below_days` is Early, `> late_above_days` is Late
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingThresholds {
    pub early_below_days: u64,
    pub late_above_days: u64,
}

impl Default for TimingThresholds {
    fn default() -> Self {
        Self {
            early_below_days: 84,
            late_above_days: 168,
        }
    }
}

impl TimingThresholds {
    /// 60/120-day table found in earlier feature pipelines
    pub fn alternate() -> Self {
        Self {
            early_below_days: 60,
            late_above_days: 120,
        }
    }

    /// Every bucket must be reachable
    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.early_below_days == 0 || self.early_below_days > self.late_above_days {
            return Err(FeatureError::InvalidConfig(format!(
                "timing thresholds leave a bucket unreachable: early below {} days, late above {} days",
                self.early_below_days, self.late_above_days
            )));
        }
        Ok(())
    }
}

/// Thresholds for every configurable derivation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationConfig {
    pub hb: HbThresholds,
    pub timing: TimingThresholds,
}

impl DerivationConfig {
    pub fn validate(&self) -> Result<(), FeatureError> {
        self.hb.validate()?;
        self.timing.validate()
    }
}

/// Bucket a non-negative day gap
pub fn timing_bucket(days: u64, thresholds: &TimingThresholds) -> TimingBucket {
    if days < thresholds.early_below_days {
        TimingBucket::Early
    } else if days <= thresholds.late_above_days {
        TimingBucket::Mid
    } else {
        TimingBucket::Late
    }
}

/// Registration timing bucket from LMP and registration dates
pub fn registration_bucket(
    lmp: NaiveDate,
    registration: NaiveDate,
    thresholds: &TimingThresholds,
) -> Result<TimingBucket, ValidationError> {
    let days = day_gap(
        (field::LMP_DATE, lmp),
        (field::REGISTRATION_DATE, registration),
    )?;
    Ok(timing_bucket(days, thresholds))
}

/// BMI for one visit, rounded to 2 decimal places
pub fn bmi(weight_kg: Option<f64>, height_cm: Option<f64>) -> Option<f64> {
    let weight = weight_kg?;
    let height_m = height_cm.filter(|h| *h > 0.0)? / 100.0;
    Some(round2(weight / (height_m * height_m)))
}

/// Days between the first two chronologically sorted visit dates
pub fn counselling_gap(dates: &[NaiveDate]) -> Option<i64> {
    let mut sorted = dates.to_vec();
    sorted.sort_unstable();
    match sorted.as_slice() {
        [first, second, ..] => Some((*second - *first).num_days()),
        _ => None,
    }
}

/// `log1p` with negative (and NaN) input clamped to zero
pub fn log1p_safe(x: f64) -> f64 {
    x.max(0.0).ln_1p()
}

/// Month of conception: the reported month when recognizable, else LMP + 14 days
pub fn month_of_conception(reported: Option<&str>, lmp: NaiveDate) -> Month {
    reported.and_then(parse_month).unwrap_or_else(|| {
        let conception = lmp + Duration::days(14);
        Month::try_from(conception.month() as u8).unwrap_or(Month::January)
    })
}

/// Parse a month name, three-letter abbreviation or number 1-12
pub fn parse_month(text: &str) -> Option<Month> {
    let text = text.trim();
    if let Ok(number) = text.parse::<u8>() {
        return Month::try_from(number).ok();
    }
    text.parse::<Month>().ok()
}

/// One owned-item entry of the household asset catalogue
#[derive(Debug, Clone, Copy)]
pub struct AssetItem {
    pub name: &'static str,
    pub weight: f64,
    pub aliases: &'static [&'static str],
}

const fn item(name: &'static str, weight: f64, aliases: &'static [&'static str]) -> AssetItem {
    AssetItem { name, weight, aliases }
}

/// Household asset catalogue with per-item weights
pub const ASSET_CATALOGUE: [AssetItem; 25] = [
    item("Electricity", 0.5, &[]),
    item("Mattress", 0.25, &[]),
    item("Pressure cooker", 0.25, &[]),
    item("Chair", 0.25, &[]),
    item("Cot / bed", 0.25, &["cot", "bed"]),
    item("Table", 0.25, &[]),
    item("Electric fan", 0.5, &["fan"]),
    item("Radio / transistor", 0.25, &["radio", "transistor"]),
    item("Mobile phone", 0.5, &["mobile", "smartphone"]),
    item("Landline telephone", 0.5, &["landline", "telephone"]),
    item("Clock / watch", 0.25, &["clock", "watch"]),
    item("Television", 1.0, &["tv"]),
    item("Refrigerator", 1.0, &["fridge"]),
    item("Washing machine", 1.25, &[]),
    item("Air conditioner / cooler", 1.0, &["ac", "air conditioner", "cooler", "ac/cooler"]),
    item("Sewing machine", 0.5, &[]),
    item("Computer / laptop", 1.25, &["computer", "laptop"]),
    item("Internet connection", 0.75, &["internet"]),
    item("Bicycle", 0.25, &["cycle"]),
    item("Two-wheeler", 1.0, &["motorcycle", "scooter", "motorcycle / scooter"]),
    item("Four-wheeler", 1.5, &["car", "car / jeep", "jeep"]),
    item("Tractor", 1.5, &[]),
    item("Animal-drawn cart", 0.5, &["bullock cart", "cart"]),
    item("Thresher", 1.0, &[]),
    item("Water pump", 0.75, &["pump", "electric pump"]),
];

/// Weighted asset score plus any item names not found in the catalogue
#[derive(Debug, Clone, PartialEq)]
pub struct AssetScore {
    pub score: f64,
    pub unrecognized: Vec<String>,
}

/// Sum the weights of owned catalogue items; each item counts once
pub fn household_asset_score(items: &[String]) -> AssetScore {
    let mut owned = [false; ASSET_CATALOGUE.len()];
    let mut unrecognized = Vec::new();

    for raw in items {
        let key = canonical_key(raw);
        if key.is_empty() {
            continue;
        }
        let hit = ASSET_CATALOGUE.iter().position(|asset| {
            canonical_key(asset.name) == key || asset.aliases.iter().any(|a| canonical_key(a) == key)
        });
        match hit {
            Some(i) => owned[i] = true,
            None => unrecognized.push(raw.clone()),
        }
    }

    let score = ASSET_CATALOGUE
        .iter()
        .zip(owned)
        .filter(|(_, owned)| *owned)
        .map(|(asset, _)| asset.weight)
        .sum();

    AssetScore { score, unrecognized }
}

/// Intermediate features computed for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedAttributes {
    pub hb_risk_bin: Option<HbRiskBin>,
    pub days_lmp_to_registration: u64,
    pub registration_bucket: TimingBucket,
    pub days_lmp_to_first_anc: Option<u64>,
    pub anc_bucket: Option<TimingBucket>,
    pub bmi: [Option<f64>; 4],
    pub counselling_gap_days: Option<i64>,
    pub lmp_to_installment_days: [Option<u64>; 3],
    pub month_conception: &'static str,
    pub ifa_tablets_log1p: Option<f64>,
    pub calcium_tablets_log1p: Option<f64>,
    pub household_asset_score: Option<f64>,
    pub household_asset_score_log1p: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unrecognized_assets: Vec<String>,
}

/// Compute every derived attribute, collecting temporal-order violations
pub fn derive_attributes(
    obs: &Observation,
    config: &DerivationConfig,
) -> Result<DerivedAttributes, ValidationReport> {
    let mut report = ValidationReport::new();
    check_temporal_order(
        &mut report,
        obs.lmp_date,
        obs.registration_date,
        &obs.visits,
        &obs.installment_dates,
    );
    if !report.is_empty() {
        return Err(report);
    }

    // Every gap from LMP is non-negative past this point
    let days_since_lmp = |date: NaiveDate| (date - obs.lmp_date).num_days().max(0) as u64;
    let days_lmp_to_registration = days_since_lmp(obs.registration_date);

    let visit_dates: Vec<NaiveDate> = obs.visits.iter().filter_map(|v| v.date).collect();
    let days_lmp_to_first_anc = visit_dates.iter().min().map(|d| days_since_lmp(*d));
    let lmp_to_installment_days = obs.installment_dates.map(|date| date.map(days_since_lmp));

    let bmi_values = obs.visits.map(|visit| bmi(visit.weight_kg, obs.height_cm));

    let assets = obs.household_assets.as_deref().map(household_asset_score);
    let unrecognized_assets = assets
        .as_ref()
        .map(|a| a.unrecognized.clone())
        .unwrap_or_default();
    if !unrecognized_assets.is_empty() {
        warn!("Ignoring unrecognized household assets: {:?}", unrecognized_assets);
        metrics::counter!("household_asset_unrecognized_total").increment(unrecognized_assets.len() as u64);
    }
    let household_asset_score = assets.map(|a| a.score);

    Ok(DerivedAttributes {
        hb_risk_bin: obs.hemoglobin.map(|hb| hb_risk_bin(hb, &config.hb)),
        days_lmp_to_registration,
        registration_bucket: timing_bucket(days_lmp_to_registration, &config.timing),
        days_lmp_to_first_anc,
        anc_bucket: days_lmp_to_first_anc.map(|days| timing_bucket(days, &config.timing)),
        bmi: bmi_values,
        counselling_gap_days: counselling_gap(&visit_dates),
        lmp_to_installment_days,
        month_conception: month_of_conception(obs.month_conception.as_deref(), obs.lmp_date).name(),
        ifa_tablets_log1p: obs.ifa_tablets.map(log1p_safe),
        calcium_tablets_log1p: obs.calcium_tablets.map(log1p_safe),
        household_asset_score,
        household_asset_score_log1p: household_asset_score.map(log1p_safe),
        unrecognized_assets,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_validator::AncVisit;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_hb_boundaries_fall_to_lower_risk() {
        let t = HbThresholds::default();
        assert_eq!(hb_risk_bin(5.99, &t), HbRiskBin::SevereAnaemia);
        assert_eq!(hb_risk_bin(6.0, &t), HbRiskBin::ModerateAnaemia);
        assert_eq!(hb_risk_bin(8.0, &t), HbRiskBin::MildAnaemia);
        assert_eq!(hb_risk_bin(11.0, &t), HbRiskBin::Normal);
        assert_eq!(hb_risk_bin(5.5, &t), HbRiskBin::SevereAnaemia);
    }

    #[test]
    fn test_alternate_hb_table() {
        let t = HbThresholds::alternate();
        assert_eq!(hb_risk_bin(6.5, &t), HbRiskBin::SevereAnaemia);
        assert_eq!(hb_risk_bin(7.0, &t), HbRiskBin::ModerateAnaemia);
    }

    #[test]
    fn test_threshold_tables_validate() {
        assert!(DerivationConfig::default().validate().is_ok());
        assert!(HbThresholds::alternate().validate().is_ok());
        assert!(TimingThresholds::alternate().validate().is_ok());

        let inverted = TimingThresholds {
            early_below_days: 180,
            late_above_days: 120,
        };
        assert!(matches!(inverted.validate(), Err(FeatureError::InvalidConfig(_))));

        let unsorted = HbThresholds {
            severe_below: 9.0,
            ..Default::default()
        };
        assert!(matches!(unsorted.validate(), Err(FeatureError::InvalidConfig(_))));
    }

    #[test]
    fn test_timing_bucket_edges() {
        let t = TimingThresholds::default();
        assert_eq!(timing_bucket(0, &t), TimingBucket::Early);
        assert_eq!(timing_bucket(83, &t), TimingBucket::Early);
        assert_eq!(timing_bucket(84, &t), TimingBucket::Mid);
        assert_eq!(timing_bucket(168, &t), TimingBucket::Mid);
        assert_eq!(timing_bucket(169, &t), TimingBucket::Late);
    }

    #[test]
    fn test_registration_before_lmp_rejected() {
        let err = registration_bucket(date(2024, 3, 1), date(2024, 2, 1), &TimingThresholds::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidTemporalOrder {
                earlier: "lmp_date",
                later: "registration_date",
                days: 29,
                ..
            }
        ));
    }

    #[test]
    fn test_registration_bucket_scenario() {
        let bucket = registration_bucket(date(2024, 1, 1), date(2024, 2, 1), &TimingThresholds::default());
        assert_eq!(bucket, Ok(TimingBucket::Early));
    }

    #[test]
    fn test_bmi() {
        assert_eq!(bmi(Some(50.0), Some(155.0)), Some(20.81));
        assert_eq!(bmi(None, Some(155.0)), None);
        assert_eq!(bmi(Some(50.0), None), None);
        assert_eq!(bmi(Some(50.0), Some(0.0)), None);
    }

    #[test]
    fn test_counselling_gap_sorts_dates() {
        let dates = [date(2024, 6, 1), date(2024, 2, 1), date(2024, 4, 1)];
        assert_eq!(counselling_gap(&dates), Some(60));
        assert_eq!(counselling_gap(&dates[..1]), None);
        assert_eq!(counselling_gap(&[]), None);
    }

    #[test]
    fn test_log1p_safe() {
        assert_eq!(log1p_safe(-5.0), 0.0);
        assert_eq!(log1p_safe(0.0), 0.0);
        assert!((log1p_safe(30.0) - 31f64.ln()).abs() < 1e-12);
        assert_eq!(log1p_safe(f64::NAN), 0.0);
    }

    #[test]
    fn test_month_parsing_and_fallback() {
        let lmp = date(2024, 1, 25);
        assert_eq!(month_of_conception(Some("Mar"), lmp), Month::March);
        assert_eq!(month_of_conception(Some("september"), lmp), Month::September);
        assert_eq!(month_of_conception(Some("12"), lmp), Month::December);
        assert_eq!(month_of_conception(Some("13"), lmp), Month::February);
        assert_eq!(month_of_conception(None, lmp), Month::February);
    }

    #[test]
    fn test_asset_score() {
        let items = vec![
            "Television".to_string(),
            "mobile phone".to_string(),
            "TV".to_string(),
            "hovercraft".to_string(),
        ];
        let score = household_asset_score(&items);
        assert!((score.score - 1.5).abs() < 1e-12);
        assert_eq!(score.unrecognized, vec!["hovercraft".to_string()]);
        assert_eq!(household_asset_score(&[]).score, 0.0);
    }

    #[test]
    fn test_catalogue_weights_in_bounds() {
        for asset in ASSET_CATALOGUE.iter() {
            assert!(asset.weight >= 0.25 && asset.weight <= 1.5, "{}", asset.name);
        }
    }

    #[test]
    fn test_derive_anc_scenario() {
        let mut obs = Observation::new(date(2024, 1, 1), date(2024, 2, 1));
        obs.hemoglobin = Some(9.0);
        obs.visits[0] = AncVisit { date: Some(date(2024, 2, 1)), weight_kg: None };
        obs.visits[1] = AncVisit { date: Some(date(2024, 4, 1)), weight_kg: None };
        obs.visits[2] = AncVisit { date: Some(date(2024, 6, 1)), weight_kg: None };

        let derived = derive_attributes(&obs, &DerivationConfig::default()).unwrap();
        assert_eq!(derived.hb_risk_bin, Some(HbRiskBin::MildAnaemia));
        assert_eq!(derived.days_lmp_to_first_anc, Some(31));
        assert_eq!(derived.anc_bucket, Some(TimingBucket::Early));
        assert_eq!(derived.counselling_gap_days, Some(60));
        assert_eq!(derived.month_conception, "January");
    }

    #[test]
    fn test_derive_missing_inputs_stay_missing() {
        let obs = Observation::new(date(2024, 1, 1), date(2024, 7, 1));
        let derived = derive_attributes(&obs, &DerivationConfig::default()).unwrap();
        assert_eq!(derived.registration_bucket, TimingBucket::Late);
        assert_eq!(derived.hb_risk_bin, None);
        assert_eq!(derived.anc_bucket, None);
        assert_eq!(derived.bmi, [None; 4]);
        assert_eq!(derived.counselling_gap_days, None);
        assert_eq!(derived.household_asset_score_log1p, None);
        assert_eq!(derived.ifa_tablets_log1p, None);
    }

    #[test]
    fn test_derive_rejects_out_of_order_visits() {
        let mut obs = Observation::new(date(2024, 1, 1), date(2024, 2, 1));
        obs.visits[0].date = Some(date(2024, 4, 1));
        obs.visits[1].date = Some(date(2024, 3, 1));
        obs.installment_dates[0] = Some(date(2023, 12, 1));

        let report = derive_attributes(&obs, &DerivationConfig::default()).unwrap_err();
        assert!(report.contains(|e| matches!(
            e,
            ValidationError::InvalidTemporalOrder { earlier: "pw1_date", later: "pw2_date", .. }
        )));
        assert!(report.contains(|e| matches!(
            e,
            ValidationError::InvalidTemporalOrder { earlier: "lmp_date", later: "inst1_date", .. }
        )));
    }

    #[test]
    fn test_derive_rejects_visit_before_lmp() {
        let mut obs = Observation::new(date(2024, 1, 1), date(2024, 2, 1));
        obs.visits[0].date = Some(date(2023, 12, 20));
        let report = derive_attributes(&obs, &DerivationConfig::default()).unwrap_err();
        assert_eq!(report.errors.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_hb_bin_monotonic(a in 0.0f64..25.0, b in 0.0f64..25.0) {
            let t = HbThresholds::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(hb_risk_bin(lo, &t) <= hb_risk_bin(hi, &t));
        }

        #[test]
        fn prop_timing_bucket_monotonic(a in 0u64..400, b in 0u64..400) {
            let t = TimingThresholds::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(timing_bucket(lo, &t) <= timing_bucket(hi, &t));
        }

        #[test]
        fn prop_registration_rejects_iff_before_lmp(offset in -400i64..400) {
            let lmp = date(2024, 1, 1);
            let registration = lmp + Duration::days(offset);
            let result = registration_bucket(lmp, registration, &TimingThresholds::default());
            prop_assert_eq!(result.is_err(), offset < 0);
        }

        #[test]
        fn prop_log1p_safe_never_negative(x in -1.0e6f64..1.0e6) {
            let y = log1p_safe(x);
            prop_assert!(y >= 0.0);
            if x < 0.0 {
                prop_assert_eq!(y, 0.0);
            }
        }
    }
}
