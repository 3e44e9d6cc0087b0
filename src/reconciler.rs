//! Column reconciliation between request field names and canonical columns.
//!
//! The transforms downstream are positional: once a record passes this
//! boundary, value `i` must belong to canonical column `i` exactly as the
//! training pipeline saw it. Request field naming is configuration, so one
//! reconciler serves every convention.

use crate::error::{PipelineError, Result};
use crate::types::FeatureRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// How request field names relate to canonical column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// Request fields are the canonical column names verbatim
    Canonical,
    /// Request fields are snake_case forms of the canonical names
    #[default]
    SnakeCase,
    /// Request fields come from an explicit request -> canonical map
    Mapped,
}

impl NamingConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamingConvention::Canonical => "canonical",
            NamingConvention::SnakeCase => "snake_case",
            NamingConvention::Mapped => "mapped",
        }
    }
}

/// Derive the snake_case request name for a canonical column.
///
/// Every run of non-alphanumeric characters collapses into a single `_`,
/// and leading/trailing separators are dropped.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;

    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }

    out
}

/// Translates request records into canonical-order feature vectors.
#[derive(Debug, Clone)]
pub struct ColumnReconciler {
    /// Canonical column names in training order
    columns: Vec<String>,
    /// Request field name for each canonical column (same order)
    fields: Vec<String>,
    /// Request field name -> canonical column index
    lookup: HashMap<String, usize>,
    /// Reject request fields without a translation
    strict: bool,
}

impl ColumnReconciler {
    /// Build the translation table for `columns` and validate it.
    ///
    /// Any table that fails to cover every column exactly once is an
    /// artifact/configuration incompatibility and reported as
    /// [`PipelineError::PipelineLoad`].
    pub fn new(
        columns: &[String],
        naming: NamingConvention,
        field_map: Option<&HashMap<String, String>>,
        strict: bool,
    ) -> Result<Self> {
        let fields = match naming {
            NamingConvention::Canonical => columns.to_vec(),
            NamingConvention::SnakeCase => columns.iter().map(|c| snake_case(c)).collect(),
            NamingConvention::Mapped => {
                let field_map = field_map.ok_or_else(|| {
                    PipelineError::load("naming convention 'mapped' requires a field map")
                })?;
                Self::fields_from_map(columns, field_map)?
            }
        };

        let mut lookup = HashMap::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            if field.is_empty() {
                return Err(PipelineError::load(format!(
                    "column '{}' has an empty request field name",
                    columns[index]
                )));
            }
            if let Some(previous) = lookup.insert(field.clone(), index) {
                return Err(PipelineError::load(format!(
                    "request field '{}' maps to both '{}' and '{}'",
                    field, columns[previous], columns[index]
                )));
            }
        }

        Ok(Self {
            columns: columns.to_vec(),
            fields,
            lookup,
            strict,
        })
    }

    fn fields_from_map(
        columns: &[String],
        field_map: &HashMap<String, String>,
    ) -> Result<Vec<String>> {
        let index: HashMap<&str, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let mut fields: Vec<Option<String>> = vec![None; columns.len()];

        // Sorted so that errors are reported deterministically
        let mut entries: Vec<(&String, &String)> = field_map.iter().collect();
        entries.sort();

        for (request_name, canonical) in entries {
            let &i = index.get(canonical.as_str()).ok_or_else(|| {
                PipelineError::load(format!(
                    "field map entry '{}' targets unknown column '{}'",
                    request_name, canonical
                ))
            })?;
            if let Some(existing) = &fields[i] {
                return Err(PipelineError::load(format!(
                    "column '{}' is mapped from both '{}' and '{}'",
                    canonical, existing, request_name
                )));
            }
            fields[i] = Some(request_name.clone());
        }

        fields
            .into_iter()
            .enumerate()
            .map(|(i, field)| {
                field.ok_or_else(|| {
                    PipelineError::load(format!(
                        "field map does not cover column '{}'",
                        columns[i]
                    ))
                })
            })
            .collect()
    }

    /// Translate a record into a vector aligned with canonical column order.
    pub fn reconcile(&self, record: &FeatureRecord) -> Result<Vec<f64>> {
        let mut slots: Vec<Option<f64>> = vec![None; self.columns.len()];
        let mut unknown: Vec<&str> = Vec::new();

        for (field, value) in record.iter() {
            match self.lookup.get(field) {
                Some(&i) => slots[i] = Some(value),
                None => unknown.push(field),
            }
        }

        if !unknown.is_empty() {
            unknown.sort_unstable();
            if self.strict {
                return Err(PipelineError::UnknownField(unknown[0].to_string()));
            }
            debug!(fields = ?unknown, "Dropping fields without a column translation");
        }

        let missing: Vec<String> = slots
            .iter()
            .zip(&self.columns)
            .filter(|(slot, _)| slot.is_none())
            .map(|(_, column)| column.clone())
            .collect();

        if !missing.is_empty() {
            return Err(PipelineError::MissingColumns { columns: missing });
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Canonical column names in training order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Request field names, aligned with [`Self::columns`].
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn feature_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec![
            " ROA(C) before interest and depreciation before interest".to_string(),
            "Debt ratio %".to_string(),
            "Cash/Total Assets".to_string(),
        ]
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(
            snake_case(" ROA(C) before interest and depreciation before interest"),
            "roa_c_before_interest_and_depreciation_before_interest"
        );
        assert_eq!(snake_case("Debt ratio %"), "debt_ratio");
        assert_eq!(snake_case("Cash/Total Assets"), "cash_total_assets");
        assert_eq!(snake_case(" Net Income Flag"), "net_income_flag");
        assert_eq!(snake_case("%"), "");
    }

    #[test]
    fn test_reconcile_reorders_into_canonical_order() {
        let reconciler =
            ColumnReconciler::new(&columns(), NamingConvention::SnakeCase, None, true).unwrap();

        let record: FeatureRecord = [
            ("cash_total_assets", 3.0),
            ("roa_c_before_interest_and_depreciation_before_interest", 1.0),
            ("debt_ratio", 2.0),
        ]
        .into_iter()
        .collect();

        assert_eq!(reconciler.reconcile(&record).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_reconcile_is_independent_of_field_order() {
        let reconciler =
            ColumnReconciler::new(&columns(), NamingConvention::Canonical, None, true).unwrap();

        let names = columns();
        let forward: FeatureRecord = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i as f64))
            .collect();
        let backward: FeatureRecord = names
            .iter()
            .enumerate()
            .rev()
            .map(|(i, n)| (n.clone(), i as f64))
            .collect();

        assert_eq!(
            reconciler.reconcile(&forward).unwrap(),
            reconciler.reconcile(&backward).unwrap()
        );
    }

    #[test]
    fn test_missing_field_is_named() {
        let reconciler =
            ColumnReconciler::new(&columns(), NamingConvention::SnakeCase, None, true).unwrap();

        let record: FeatureRecord = [
            ("roa_c_before_interest_and_depreciation_before_interest", 1.0),
            ("cash_total_assets", 3.0),
        ]
        .into_iter()
        .collect();

        match reconciler.reconcile(&record).unwrap_err() {
            PipelineError::MissingColumns { columns } => {
                assert_eq!(columns, vec!["Debt ratio %".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_field_strict_and_lenient() {
        let mut record: FeatureRecord = [
            ("roa_c_before_interest_and_depreciation_before_interest", 1.0),
            ("debt_ratio", 2.0),
            ("cash_total_assets", 3.0),
        ]
        .into_iter()
        .collect();
        record.insert("company_name_length", 12.0);

        let strict =
            ColumnReconciler::new(&columns(), NamingConvention::SnakeCase, None, true).unwrap();
        match strict.reconcile(&record).unwrap_err() {
            PipelineError::UnknownField(field) => assert_eq!(field, "company_name_length"),
            other => panic!("unexpected error: {other:?}"),
        }

        let lenient =
            ColumnReconciler::new(&columns(), NamingConvention::SnakeCase, None, false).unwrap();
        assert_eq!(lenient.reconcile(&record).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mapped_convention() {
        let mut map = HashMap::new();
        map.insert("roa_c".to_string(), columns()[0].clone());
        map.insert("debt".to_string(), columns()[1].clone());
        map.insert("cash".to_string(), columns()[2].clone());

        let reconciler =
            ColumnReconciler::new(&columns(), NamingConvention::Mapped, Some(&map), true).unwrap();
        assert_eq!(reconciler.fields(), &["roa_c", "debt", "cash"]);

        let record: FeatureRecord = [("cash", 3.0), ("debt", 2.0), ("roa_c", 1.0)]
            .into_iter()
            .collect();
        assert_eq!(reconciler.reconcile(&record).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mapped_convention_rejects_incomplete_or_unknown_targets() {
        let mut map = HashMap::new();
        map.insert("roa_c".to_string(), columns()[0].clone());
        map.insert("debt".to_string(), columns()[1].clone());

        let err = ColumnReconciler::new(&columns(), NamingConvention::Mapped, Some(&map), true)
            .unwrap_err();
        assert!(matches!(err, PipelineError::PipelineLoad(_)));

        map.insert("cash".to_string(), "Cash Flow".to_string());
        let err = ColumnReconciler::new(&columns(), NamingConvention::Mapped, Some(&map), true)
            .unwrap_err();
        assert!(err.to_string().contains("unknown column"));

        let err =
            ColumnReconciler::new(&columns(), NamingConvention::Mapped, None, true).unwrap_err();
        assert!(matches!(err, PipelineError::PipelineLoad(_)));
    }

    #[test]
    fn test_snake_case_collision_fails() {
        let columns = vec!["Debt Ratio".to_string(), "debt-ratio".to_string()];
        let err = ColumnReconciler::new(&columns, NamingConvention::SnakeCase, None, true)
            .unwrap_err();
        assert!(matches!(err, PipelineError::PipelineLoad(_)));
    }
}
