//! Deterministic encoding of beneficiary lists for signing.
//!
//! Clients serialize beneficiary objects with whatever key order their JSON
//! library produces. The signed payload therefore embeds a canonical string:
//! entries sorted by `(address, name, percentage)`, keys emitted in the order
//! `address`, `name`, `percentage`, addresses lower-cased.

use std::cmp::Ordering;
use std::fmt::Write;

use crate::types::Beneficiary;

/// Encode a beneficiary list in canonical form.
pub fn canonical_beneficiaries(beneficiaries: &[Beneficiary]) -> String {
    let mut sorted: Vec<&Beneficiary> = beneficiaries.iter().collect();
    sorted.sort_by(|a, b| {
        a.address
            .cmp(&b.address)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| {
                a.percentage
                    .partial_cmp(&b.percentage)
                    .unwrap_or(Ordering::Equal)
            })
    });

    let mut out = String::from("[");
    for (i, b) in sorted.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        // serde_json on a &str cannot fail
        let name = serde_json::to_string(&b.name).unwrap_or_else(|_| "\"\"".to_string());
        let _ = write!(
            out,
            "{{\"address\":\"{}\",\"name\":{},\"percentage\":{}}}",
            b.address,
            name,
            format_percentage(b.percentage)
        );
    }
    out.push(']');
    out
}

/// Render a percentage the way a JSON client would: integral values without a
/// fractional part, everything else in shortest round-trip form.
pub fn format_percentage(value: f64) -> String {
    if !value.is_finite() {
        return "null".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
