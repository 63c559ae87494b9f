//! Form records, sample items, validation, and overwrite merging.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

/// Upper bound on sample items per record.
pub const MAX_SAMPLE_ITEMS: usize = 10;

/// One sample line on the intake form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SampleItem {
    #[serde(deserialize_with = "nullable_string")]
    pub sample_no: String,
    #[serde(deserialize_with = "nullable_string")]
    pub sample_name: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_count"
    )]
    pub qty: Option<u32>,
    #[serde(deserialize_with = "nullable_string")]
    pub remark: String,
}

impl SampleItem {
    pub fn new(sample_no: impl Into<String>, sample_name: impl Into<String>) -> Self {
        Self {
            sample_no: sample_no.into(),
            sample_name: sample_name.into(),
            ..Self::default()
        }
    }

    pub fn with_qty(mut self, qty: u32) -> Self {
        self.qty = Some(qty);
        self
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = remark.into();
        self
    }

    /// Label count for this item: the stated quantity, or 1 when absent or zero.
    pub fn effective_qty(&self) -> u32 {
        self.qty.filter(|qty| *qty > 0).unwrap_or(1)
    }

    /// True when every text field is empty.
    pub fn is_blank(&self) -> bool {
        self.sample_no.is_empty() && self.sample_name.is_empty() && self.remark.is_empty()
    }
}

/// One logical inventory entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormRecord {
    #[serde(deserialize_with = "nullable_string")]
    pub case_no: String,
    #[serde(deserialize_with = "nullable_string")]
    pub quote_no: String,
    #[serde(deserialize_with = "nullable_string")]
    pub customer_name: String,
    #[serde(deserialize_with = "nullable_string")]
    pub product_name: String,
    #[serde(deserialize_with = "nullable_string")]
    pub model: String,
    #[serde(deserialize_with = "nullable_string")]
    pub sales: String,
    #[serde(deserialize_with = "nullable_string")]
    pub in_operator: String,
    #[serde(deserialize_with = "nullable_string")]
    pub in_date: String,
    #[serde(deserialize_with = "lenient_count")]
    pub total_in_qty: Option<u32>,
    #[serde(deserialize_with = "nullable_items")]
    pub sample_items: Vec<SampleItem>,
    #[serde(deserialize_with = "nullable_string")]
    pub borrow_date: String,
    #[serde(deserialize_with = "nullable_string")]
    pub borrower: String,
    #[serde(deserialize_with = "nullable_string")]
    pub return_date: String,
    #[serde(deserialize_with = "nullable_string")]
    pub return_operator: String,
    #[serde(deserialize_with = "nullable_string")]
    pub out_date: String,
    #[serde(deserialize_with = "lenient_integer")]
    pub out_qty: Option<i64>,
}

impl FormRecord {
    fn required_text_fields(&self) -> [(&'static str, &str); 8] {
        [
            ("caseNo", self.case_no.as_str()),
            ("quoteNo", self.quote_no.as_str()),
            ("customerName", self.customer_name.as_str()),
            ("productName", self.product_name.as_str()),
            ("model", self.model.as_str()),
            ("sales", self.sales.as_str()),
            ("inOperator", self.in_operator.as_str()),
            ("inDate", self.in_date.as_str()),
        ]
    }

    /// Merge `incoming` onto this record for an overwrite.
    ///
    /// Text fields are taken only when non-blank, numbers only when present,
    /// and the sample list only when non-empty (replacing the stored list whole).
    pub fn merged_with(&self, incoming: &FormRecord) -> FormRecord {
        fn assign(target: &mut String, value: &str) {
            if !value.trim().is_empty() {
                *target = value.to_string();
            }
        }

        let mut merged = self.clone();
        assign(&mut merged.case_no, &incoming.case_no);
        assign(&mut merged.quote_no, &incoming.quote_no);
        assign(&mut merged.customer_name, &incoming.customer_name);
        assign(&mut merged.product_name, &incoming.product_name);
        assign(&mut merged.model, &incoming.model);
        assign(&mut merged.sales, &incoming.sales);
        assign(&mut merged.in_operator, &incoming.in_operator);
        assign(&mut merged.in_date, &incoming.in_date);
        assign(&mut merged.borrow_date, &incoming.borrow_date);
        assign(&mut merged.borrower, &incoming.borrower);
        assign(&mut merged.return_date, &incoming.return_date);
        assign(&mut merged.return_operator, &incoming.return_operator);
        assign(&mut merged.out_date, &incoming.out_date);

        if incoming.total_in_qty.is_some() {
            merged.total_in_qty = incoming.total_in_qty;
        }
        if incoming.out_qty.is_some() {
            merged.out_qty = incoming.out_qty;
        }
        if !incoming.sample_items.is_empty() {
            merged.sample_items = normalize_sample_items(&incoming.sample_items);
        }
        merged
    }

    /// Copy of this record with its sample list normalized.
    pub fn normalized(&self) -> FormRecord {
        FormRecord {
            sample_items: normalize_sample_items(&self.sample_items),
            ..self.clone()
        }
    }
}

/// Clamp to [`MAX_SAMPLE_ITEMS`], substitute one blank item for an empty list,
/// and trim sample numbers and names. Remarks pass through untouched.
pub fn normalize_sample_items(items: &[SampleItem]) -> Vec<SampleItem> {
    if items.is_empty() {
        return vec![SampleItem::default()];
    }
    items
        .iter()
        .take(MAX_SAMPLE_ITEMS)
        .map(|item| SampleItem {
            sample_no: item.sample_no.trim().to_string(),
            sample_name: item.sample_name.trim().to_string(),
            qty: item.qty,
            remark: item.remark.clone(),
        })
        .collect()
}

/// Identifiers of required fields that are missing, in form order, deduplicated.
///
/// Sample items report each empty field on its own, e.g. `sampleItems[0].sampleName`.
pub fn missing_fields(form: &FormRecord) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();

    for (key, value) in form.required_text_fields() {
        if value.trim().is_empty() {
            missing.push(key.to_string());
        }
    }

    if form.total_in_qty.is_none() {
        missing.push("totalInQty".to_string());
    }

    let items = normalize_sample_items(&form.sample_items);
    if items.is_empty() {
        missing.push("sampleItems".to_string());
    }
    for (idx, item) in items.iter().enumerate() {
        if item.sample_no.is_empty() {
            missing.push(format!("sampleItems[{idx}].sampleNo"));
        }
        if item.sample_name.is_empty() {
            missing.push(format!("sampleItems[{idx}].sampleName"));
        }
    }

    let mut seen = HashSet::new();
    missing.retain(|field| seen.insert(field.clone()));
    missing
}

/// Whole, non-negative number that fits a `u32`.
pub(crate) fn count_from_f64(value: f64) -> Option<u32> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX))
        .then_some(value as u32)
}

/// Whole number that fits an `i64`.
pub(crate) fn integer_from_f64(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15).then_some(value as i64)
}

fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Accept numbers, numeric strings, or null; anything unparsable becomes `None`.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(json_number).and_then(count_from_f64))
}

fn lenient_integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(json_number)
        .and_then(integer_from_f64))
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_items<'de, D>(deserializer: D) -> Result<Vec<SampleItem>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<SampleItem>>::deserialize(deserializer)?.unwrap_or_default())
}
