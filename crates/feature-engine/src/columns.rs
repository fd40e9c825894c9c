//! Training-time column names

pub const BENEFICIARY_AGE: &str = "Beneficiary age";
pub const HB_RISK_BIN: &str = "measured_HB_risk_bin";
pub const PARITY: &str = "Child order/parity";
pub const LIVING_CHILDREN: &str = "Number of living child at now";
pub const MONTH_CONCEPTION: &str = "MonthConception";
pub const BMI: [&str; 4] = ["BMI_PW1_Prog", "BMI_PW2_Prog", "BMI_PW3_Prog", "BMI_PW4_Prog"];
pub const CONSUME_TOBACCO: &str = "consume_tobacco";
pub const CHEWING_TOBACCO: &str = "Status of current chewing of tobacco";
pub const CONSUME_ALCOHOL: &str = "consume_alcohol";
pub const REGISTRATION_BUCKET: &str = "RegistrationBucket";
pub const COUNSELLING_GAP: &str = "counselling_gap_days";
pub const ANC_BUCKET: &str = "ANCBucket";
pub const LMP_TO_INSTALLMENT: [&str; 3] = ["LMPtoINST1", "LMPtoINST2", "LMPtoINST3"];
pub const ANC_COMPLETED: &str = "No of ANCs completed";
pub const TT_INJECTION: &str = "Service received during last ANC: TT Injection given";
pub const IFA_TABLETS_LOG: &str = "No. of IFA tablets received/procured in last one month_log1p";
pub const CALCIUM_TABLETS_LOG: &str = "No. of calcium tablets consumed in last one month_log1p";
pub const FOOD_GROUPS: &str = "Food_Groups_Category";
pub const ASSETS_SCORE_LOG: &str = "Household_Assets_Score_log1p";
pub const TOILET_TYPE: &str = "toilet_type_clean";
pub const WATER_SOURCE: &str = "water_source_clean";
pub const EDUCATION: &str = "education_clean";
pub const SOCIAL_MEDIA: &str = "Social_Media_Category";
pub const JSY_REGISTERED: &str = "Registered for cash transfer scheme: JSY";
pub const RAJHSRI_REGISTERED: &str = "Registered for cash transfer scheme: RAJHSRI";
pub const PMMVY_INSTALLMENTS: &str = "PMMVY-Number of installment received";
pub const JSY_INSTALLMENTS: &str = "JSY-Number of installment received";
