//! Record normalizer: one raw JSON object in, one typed row (or a
//! rejection) out. Pure; no I/O.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::MalformedRecord;
use crate::model::ProductRow;

/// Convert one raw product object into a [`ProductRow`].
///
/// `id` must be present and coercible to an integer; a usable `price`
/// must be absent, numeric, and non-negative. Everything else is
/// best-effort: missing optional fields become `None`, and non-string
/// entries in `images` are dropped silently.
pub fn normalize_record(
    raw: &Value,
    source_file: &str,
    ingested_at: DateTime<Utc>,
) -> Result<ProductRow, MalformedRecord> {
    let reject = |reason: String| MalformedRecord {
        file: source_file.to_string(),
        reason,
    };

    let Some(obj) = raw.as_object() else {
        return Err(reject("record is not a JSON object".into()));
    };

    let id = obj
        .get("id")
        .and_then(coerce_id)
        .ok_or_else(|| reject("missing or non-integer 'id'".into()))?;

    let price = match obj.get("price") {
        None => None,
        Some(v) => coerce_price(v).map_err(|reason| reject(format!("invalid 'price': {reason}")))?,
    };

    let (image_urls, images_doc) = coerce_images(obj.get("images"));

    Ok(ProductRow {
        id,
        name: text_field(obj, "name"),
        url_key: text_field(obj, "url_key"),
        price,
        description: text_field(obj, "description"),
        image_urls,
        images_doc,
        source_file: source_file.to_string(),
        ingested_at,
    })
}

fn text_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Integer, integral float, or integer-string. Fractional floats are
/// rejected rather than truncated.
fn coerce_id(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Absent/null (and blank strings) mean "no price"; numbers and numeric
/// strings parse to an exact decimal. Anything else, or a negative
/// value, rejects the record.
fn coerce_price(raw: &Value) -> Result<Option<BigDecimal>, String> {
    let parsed = match raw {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::Number(n) => n.to_string().parse::<BigDecimal>().ok(),
        Value::String(s) => s.trim().parse::<BigDecimal>().ok(),
        _ => None,
    };
    match parsed {
        Some(p) if p < BigDecimal::from(0) => Err(format!("negative value {raw}")),
        Some(p) => Ok(Some(p)),
        None => Err(format!("not a number: {raw}")),
    }
}

/// Coerce `images` to an ordered list of non-empty URL strings; other
/// entry shapes are dropped. The raw value is kept verbatim for the
/// JSONB column (`[]` when the attribute is absent).
fn coerce_images(raw: Option<&Value>) -> (Vec<String>, Value) {
    match raw {
        Some(Value::Array(items)) => {
            let urls = items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            (urls, Value::Array(items.clone()))
        }
        Some(other) => (Vec::new(), other.clone()),
        None => (Vec::new(), Value::Array(Vec::new())),
    }
}
