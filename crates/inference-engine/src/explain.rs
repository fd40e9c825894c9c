//! Attribution Ranking

use serde::{Deserialize, Serialize};

/// Default number of attributions returned
pub const DEFAULT_TOP_K: usize = 8;

/// Signed contribution of one feature to the log-odds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub feature: String,
    pub value: f64,
}

/// Rank contributions by descending magnitude, ties in column order, keeping `top_k`
pub fn rank_attributions<'a>(
    names: impl IntoIterator<Item = &'a str>,
    values: &[f64],
    top_k: usize,
) -> Vec<Attribution> {
    let mut ranked: Vec<(usize, &str, f64)> = names
        .into_iter()
        .zip(values.iter().copied())
        .enumerate()
        .map(|(i, (name, value))| (i, name, value))
        .collect();

    ranked.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()).then(a.0.cmp(&b.0)));
    ranked.truncate(top_k);

    ranked
        .into_iter()
        .map(|(_, name, value)| Attribution {
            feature: name.to_string(),
            value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rank_by_magnitude() {
        let ranked = rank_attributions(["a", "b", "c", "d"], &[0.1, -0.9, 0.5, 0.0], 3);
        let names: Vec<&str> = ranked.iter().map(|a| a.feature.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
        assert_eq!(ranked[0].value, -0.9);
    }

    #[test]
    fn test_ties_keep_column_order() {
        let ranked = rank_attributions(["x", "y", "z"], &[0.2, -0.2, 0.2], 8);
        let names: Vec<&str> = ranked.iter().map(|a| a.feature.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    proptest! {
        #[test]
        fn prop_ranked_and_truncated(values in prop::collection::vec(-5.0f64..5.0, 0..40), k in 0usize..12) {
            let names: Vec<String> = (0..values.len()).map(|i| format!("f{}", i)).collect();
            let ranked = rank_attributions(names.iter().map(String::as_str), &values, k);
            prop_assert_eq!(ranked.len(), values.len().min(k));
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].value.abs() >= pair[1].value.abs());
            }
        }
    }
}
