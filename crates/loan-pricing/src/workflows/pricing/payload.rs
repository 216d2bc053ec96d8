use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::form::{PricingForm, UnitRent};

/// Days added to the reference date when no closing date was entered.
pub const DEFAULT_CLOSING_OFFSET_DAYS: i64 = 30;

/// Keys present for every loan type.
pub const COMMON_KEYS: &[&str] = &[
    "loan_type",
    "transaction_type",
    "street",
    "unit",
    "city",
    "state",
    "zip",
    "county",
    "borrower_type",
    "entity_name",
    "guarantor_name",
    "citizenship",
    "fico",
    "guarantor_count",
    "foreign_national",
    "rural",
    "property_type",
    "num_units",
    "purchase_price",
    "as_is_value",
    "loan_amount",
    "mortgage_payoff",
    "annual_taxes",
    "annual_insurance",
    "annual_hoa",
    "warrantable_condo",
    "lender_origination_pct",
    "broker_origination_pct",
    "broker_admin_fee",
    "lender_admin_fee",
    "title_recording_fee",
    "acquisition_date",
    "closing_date",
];

/// Keys added when the bridge section is visible.
pub const BRIDGE_KEYS: &[&str] = &[
    "term_months",
    "bridge_type",
    "flips_last_three_years",
    "ground_up_last_three_years",
    "initial_loan_amount",
    "rehab_budget",
    "rehab_holdback",
    "total_loan_amount",
    "arv",
    "rehab_completed",
];

/// Keys added when the DSCR section is visible.
pub const DSCR_KEYS: &[&str] = &[
    "first_time_homebuyer",
    "loan_structure",
    "prepayment_penalty",
    "short_term_rental",
    "declining_market",
    "units",
];

/// Normalized request body shared by every program in a calculation cycle.
///
/// Booleans stay native here; [`CanonicalPayload::to_wire`] converts them to the
/// `"yes"`/`"no"` enum right before sending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalPayload(Map<String, Value>);

impl CanonicalPayload {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn loan_type(&self) -> Option<&str> {
        self.0.get("loan_type").and_then(Value::as_str)
    }

    /// Wire representation with every boolean rewritten to `"yes"`/`"no"`.
    pub fn to_wire(&self) -> Value {
        normalize_yes_no(self.as_value())
    }
}

impl From<Map<String, Value>> for CanonicalPayload {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// Recursively rewrite booleans through nested objects and arrays.
pub fn normalize_yes_no(value: Value) -> Value {
    match value {
        Value::Bool(flag) => Value::String(if flag { "yes" } else { "no" }.to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_yes_no).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, normalize_yes_no(value)))
                .collect(),
        ),
        other => other,
    }
}

/// Midnight UTC instant built from the calendar components, so the day never shifts.
pub fn iso_instant(date: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date.format("%Y-%m-%d"))
}

fn optional_date(date: Option<NaiveDate>) -> Value {
    date.map(|value| Value::String(iso_instant(value)))
        .unwrap_or(Value::Null)
}

fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '$'))
        .collect();
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Initial amount plus holdback. An empty side counts as zero when the other parses.
fn derived_total(initial: &str, holdback: &str) -> Value {
    let initial_blank = initial.trim().is_empty();
    let holdback_blank = holdback.trim().is_empty();
    if initial_blank && holdback_blank {
        return Value::String(String::new());
    }

    let initial = if initial_blank {
        Some(0.0)
    } else {
        parse_amount(initial)
    };
    let holdback = if holdback_blank {
        Some(0.0)
    } else {
        parse_amount(holdback)
    };

    match (initial, holdback) {
        (Some(initial), Some(holdback)) => json!(initial + holdback),
        _ => Value::String(String::new()),
    }
}

fn unit_row(unit: &UnitRent) -> Value {
    json!({
        "unit_label": unit.unit_label,
        "bedrooms": unit.bedrooms,
        "bathrooms": unit.bathrooms,
        "leased": unit.leased,
        "gross_rent": unit.gross_rent,
        "market_rent": unit.market_rent,
    })
}

fn insert_all(target: &mut Map<String, Value>, source: Value) {
    if let Value::Object(entries) = source {
        target.extend(entries);
    }
}

/// Build the canonical payload from the current form. Pure and infallible.
///
/// `reference_date` anchors the fallback closing date so repeated builds of an
/// unchanged form compare equal.
pub fn build_payload(form: &PricingForm, reference_date: NaiveDate) -> CanonicalPayload {
    let closing_date = match form.closing_date {
        Some(date) => iso_instant(date),
        None => iso_instant(reference_date + Duration::days(DEFAULT_CLOSING_OFFSET_DAYS)),
    };

    let address = &form.address;
    let borrower = &form.borrower;
    let property = &form.property;
    let fees = &form.fees;

    let mut payload = Map::new();
    insert_all(
        &mut payload,
        json!({
            "loan_type": form.loan_type.label(),
            "transaction_type": form.transaction_type.label(),
            "street": address.street,
            "unit": address.unit,
            "city": address.city,
            "state": address.state,
            "zip": address.zip,
            "county": address.county,
            "borrower_type": borrower.borrower_type,
            "entity_name": borrower.entity_name,
            "guarantor_name": borrower.guarantor_name,
            "citizenship": borrower.citizenship,
            "fico": borrower.fico,
            "guarantor_count": borrower.guarantor_count,
            "foreign_national": borrower.foreign_national,
            "rural": borrower.rural,
            "property_type": property.property_type,
            "num_units": property.num_units,
            "purchase_price": property.purchase_price,
            "as_is_value": property.as_is_value,
            "loan_amount": property.loan_amount,
            "mortgage_payoff": property.mortgage_payoff,
            "annual_taxes": property.annual_taxes,
            "annual_insurance": property.annual_insurance,
            "annual_hoa": property.annual_hoa,
            "warrantable_condo": property.warrantable_condo,
            "lender_origination_pct": fees.lender_origination_pct,
            "broker_origination_pct": fees.broker_origination_pct,
            "broker_admin_fee": fees.broker_admin_fee,
            "lender_admin_fee": fees.lender_admin_fee,
            "title_recording_fee": fees.title_recording_fee,
            "acquisition_date": optional_date(form.acquisition_date),
            "closing_date": closing_date,
        }),
    );

    if form.bridge_visible() {
        let bridge = &form.bridge;
        insert_all(
            &mut payload,
            json!({
                "term_months": bridge.term_months,
                "bridge_type": bridge.bridge_type,
                "flips_last_three_years": bridge.flips_last_three_years,
                "ground_up_last_three_years": bridge.ground_up_last_three_years,
                "initial_loan_amount": bridge.initial_loan_amount,
                "rehab_budget": bridge.rehab_budget,
                "rehab_holdback": bridge.rehab_holdback,
                "total_loan_amount": derived_total(&bridge.initial_loan_amount, &bridge.rehab_holdback),
                "arv": bridge.arv,
                "rehab_completed": bridge.rehab_completed,
            }),
        );
    }

    if form.dscr_visible() {
        let dscr = &form.dscr;
        insert_all(
            &mut payload,
            json!({
                "first_time_homebuyer": dscr.first_time_homebuyer,
                "loan_structure": dscr.loan_structure,
                "prepayment_penalty": dscr.prepayment_penalty,
                "short_term_rental": dscr.short_term_rental,
                "declining_market": dscr.declining_market,
                "units": dscr.units.iter().map(unit_row).collect::<Vec<_>>(),
            }),
        );
    }

    CanonicalPayload(payload)
}
