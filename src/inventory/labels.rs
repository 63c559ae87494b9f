//! Label code expansion and label sheet layout.

use serde::Serialize;

use crate::error::DocumentError;
use crate::inventory::record::FormRecord;

/// Upper bound on the labels one form may expand to.
pub const MAX_LABELS: u32 = 1000;

/// One printable small label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub code: String,
    pub customer_name: String,
    pub model: String,
    pub in_date: String,
}

/// Derive `max(1, quantity)` sequential codes from `base`.
///
/// A trailing digit run is incremented in place, keeping its width and growing
/// only when the count overflows it (`S-099` → `S-100`). A base without
/// trailing digits gets a running `-01`, `-02`, ... suffix. A blank base
/// produces nothing.
///
/// Output length is `quantity`; callers taking it from user input check it
/// against [`MAX_LABELS`] first.
pub fn build_label_codes(base: &str, quantity: u32) -> Vec<String> {
    let base = base.trim();
    if base.is_empty() {
        return Vec::new();
    }
    let count = quantity.max(1);

    let digit_start = base
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(idx, _)| idx);

    let Some(digit_start) = digit_start else {
        return (1..=count).map(|n| format!("{base}-{n:02}")).collect();
    };

    let prefix = &base[..digit_start];
    let mut digits = base[digit_start..].as_bytes().to_vec();
    let mut codes = Vec::new();
    for _ in 0..count {
        codes.push(format!("{prefix}{}", String::from_utf8_lossy(&digits)));
        increment_decimal(&mut digits);
    }
    codes
}

/// Add one to an ASCII decimal string, carrying into a new leading digit.
fn increment_decimal(digits: &mut Vec<u8>) {
    for digit in digits.iter_mut().rev() {
        if *digit == b'9' {
            *digit = b'0';
        } else {
            *digit += 1;
            return;
        }
    }
    digits.insert(0, b'1');
}

/// One label per generated code, for every sample item on the form.
///
/// Fails without expanding anything when the total exceeds [`MAX_LABELS`].
pub fn build_labels_from_form(form: &FormRecord) -> Result<Vec<Label>, DocumentError> {
    let requested: u64 = form
        .sample_items
        .iter()
        .filter(|item| !item.sample_no.trim().is_empty())
        .map(|item| u64::from(item.effective_qty()))
        .sum();
    if requested > u64::from(MAX_LABELS) {
        return Err(DocumentError::TooManyLabels {
            requested,
            limit: MAX_LABELS,
        });
    }

    Ok(form
        .sample_items
        .iter()
        .flat_map(|item| build_label_codes(&item.sample_no, item.effective_qty()))
        .map(|code| Label {
            code,
            customer_name: form.customer_name.clone(),
            model: form.model.clone(),
            in_date: form.in_date.clone(),
        })
        .collect())
}

/// Chunk `labels` into rows of `columns_per_row` slots, padding the last row
/// with `None`. A width of 0 is treated as 1.
pub fn build_label_rows<T: Clone>(labels: &[T], columns_per_row: usize) -> Vec<Vec<Option<T>>> {
    let width = columns_per_row.max(1);
    labels
        .chunks(width)
        .map(|chunk| {
            let mut row: Vec<Option<T>> = chunk.iter().cloned().map(Some).collect();
            row.resize(width, None);
            row
        })
        .collect()
}
