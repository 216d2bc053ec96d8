use serde::{Deserialize, Serialize};

use super::programs::ProgramDescriptor;

/// Raw body returned by a pricing program.
///
/// Amortizing programs report `loan_amount`/`ltv` scalars with `pitia`/`dscr`
/// columns; draw-structured programs report the four draw columns instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramResponse {
    pub pass: bool,
    pub loan_price: Vec<f64>,
    pub interest_rate: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ltv: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitia: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dscr: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_loan_amount: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rehab_holdback: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_loan_amount: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funded_pitia: Option<Vec<f64>>,
    pub validations: Vec<String>,
}

impl ProgramResponse {
    fn has_draw_columns(&self) -> bool {
        self.initial_loan_amount.is_some()
            || self.rehab_holdback.is_some()
            || self.total_loan_amount.is_some()
            || self.funded_pitia.is_some()
    }

    fn has_amortizing_columns(&self) -> bool {
        self.pitia.is_some() || self.dscr.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedResponse {
    #[error("column '{column}' has {actual} rows, expected {expected}")]
    ColumnLength {
        column: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("response mixes amortizing and draw-structured columns")]
    MixedShape,
}

/// Columns specific to fully amortizing programs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AmortizingColumns {
    pub loan_amount: Option<f64>,
    pub ltv: Option<f64>,
    pub pitia: Vec<f64>,
    pub dscr: Vec<f64>,
}

/// Columns specific to programs funding through draws.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrawColumns {
    pub initial_loan_amount: Vec<f64>,
    pub rehab_holdback: Vec<f64>,
    pub total_loan_amount: Vec<f64>,
    pub funded_pitia: Vec<f64>,
}

/// Result shape, decided once when the response is accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultKind {
    Amortizing(AmortizingColumns),
    DrawStructured(DrawColumns),
}

/// Filled slot contents: one program's candidate rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramResult {
    pub descriptor: ProgramDescriptor,
    pub pass: bool,
    pub loan_price: Vec<f64>,
    pub interest_rate: Vec<f64>,
    pub columns: ResultKind,
    pub validations: Vec<String>,
}

/// `None` means the program did not report the column at all; a reported
/// column, even an empty one, must carry one entry per row.
fn check_column(
    column: &'static str,
    values: Option<&[f64]>,
    expected: usize,
) -> Result<(), MalformedResponse> {
    match values {
        Some(values) if values.len() != expected => Err(MalformedResponse::ColumnLength {
            column,
            expected,
            actual: values.len(),
        }),
        _ => Ok(()),
    }
}

impl ProgramResult {
    /// Classify and validate a response. Parallel columns must agree on row count.
    pub fn from_response(
        descriptor: ProgramDescriptor,
        response: ProgramResponse,
    ) -> Result<Self, MalformedResponse> {
        if response.has_draw_columns() && response.has_amortizing_columns() {
            return Err(MalformedResponse::MixedShape);
        }

        let rows = response.loan_price.len();
        check_column("interest_rate", Some(response.interest_rate.as_slice()), rows)?;

        let columns = if response.has_draw_columns() {
            check_column("initial_loan_amount", response.initial_loan_amount.as_deref(), rows)?;
            check_column("rehab_holdback", response.rehab_holdback.as_deref(), rows)?;
            check_column("total_loan_amount", response.total_loan_amount.as_deref(), rows)?;
            check_column("funded_pitia", response.funded_pitia.as_deref(), rows)?;
            ResultKind::DrawStructured(DrawColumns {
                initial_loan_amount: response.initial_loan_amount.unwrap_or_default(),
                rehab_holdback: response.rehab_holdback.unwrap_or_default(),
                total_loan_amount: response.total_loan_amount.unwrap_or_default(),
                funded_pitia: response.funded_pitia.unwrap_or_default(),
            })
        } else {
            check_column("pitia", response.pitia.as_deref(), rows)?;
            check_column("dscr", response.dscr.as_deref(), rows)?;
            ResultKind::Amortizing(AmortizingColumns {
                loan_amount: response.loan_amount,
                ltv: response.ltv,
                pitia: response.pitia.unwrap_or_default(),
                dscr: response.dscr.unwrap_or_default(),
            })
        };

        Ok(Self {
            descriptor,
            pass: response.pass,
            loan_price: response.loan_price,
            interest_rate: response.interest_rate,
            columns,
            validations: response.validations,
        })
    }

    pub fn loan_prices(&self) -> &[f64] {
        &self.loan_price
    }

    pub fn row_count(&self) -> usize {
        self.loan_price.len()
    }

    /// Snapshot of row `index` across every parallel column.
    pub fn row(&self, index: usize) -> Option<RowValues> {
        let loan_price = *self.loan_price.get(index)?;
        let interest_rate = self.interest_rate.get(index).copied();

        let values = match &self.columns {
            ResultKind::Amortizing(columns) => RowValues::Amortizing(AmortizingRow {
                loan_price: Some(loan_price),
                interest_rate,
                loan_amount: columns.loan_amount,
                ltv: columns.ltv,
                pitia: columns.pitia.get(index).copied(),
                dscr: columns.dscr.get(index).copied(),
            }),
            ResultKind::DrawStructured(columns) => RowValues::DrawStructured(DrawRow {
                loan_price: Some(loan_price),
                interest_rate,
                initial_loan_amount: columns.initial_loan_amount.get(index).copied(),
                rehab_holdback: columns.rehab_holdback.get(index).copied(),
                total_loan_amount: columns.total_loan_amount.get(index).copied(),
                funded_pitia: columns.funded_pitia.get(index).copied(),
            }),
        };
        Some(values)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmortizingRow {
    pub loan_price: Option<f64>,
    pub interest_rate: Option<f64>,
    pub loan_amount: Option<f64>,
    pub ltv: Option<f64>,
    pub pitia: Option<f64>,
    pub dscr: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawRow {
    pub loan_price: Option<f64>,
    pub interest_rate: Option<f64>,
    pub initial_loan_amount: Option<f64>,
    pub rehab_holdback: Option<f64>,
    pub total_loan_amount: Option<f64>,
    pub funded_pitia: Option<f64>,
}

/// One pricing point. Persisted without a tag: the kind is recovered from which
/// columns are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RowValuesRecord", into = "RowValuesRecord")]
pub enum RowValues {
    Amortizing(AmortizingRow),
    DrawStructured(DrawRow),
}

impl RowValues {
    pub fn loan_price(&self) -> Option<f64> {
        match self {
            RowValues::Amortizing(row) => row.loan_price,
            RowValues::DrawStructured(row) => row.loan_price,
        }
    }

    pub fn interest_rate(&self) -> Option<f64> {
        match self {
            RowValues::Amortizing(row) => row.interest_rate,
            RowValues::DrawStructured(row) => row.interest_rate,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RowValuesRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    loan_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interest_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    loan_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ltv: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pitia: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dscr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    initial_loan_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rehab_holdback: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_loan_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    funded_pitia: Option<f64>,
}

impl From<RowValuesRecord> for RowValues {
    fn from(record: RowValuesRecord) -> Self {
        let is_draw = record.initial_loan_amount.is_some()
            || record.rehab_holdback.is_some()
            || record.total_loan_amount.is_some()
            || record.funded_pitia.is_some();

        if is_draw {
            RowValues::DrawStructured(DrawRow {
                loan_price: record.loan_price,
                interest_rate: record.interest_rate,
                initial_loan_amount: record.initial_loan_amount,
                rehab_holdback: record.rehab_holdback,
                total_loan_amount: record.total_loan_amount,
                funded_pitia: record.funded_pitia,
            })
        } else {
            RowValues::Amortizing(AmortizingRow {
                loan_price: record.loan_price,
                interest_rate: record.interest_rate,
                loan_amount: record.loan_amount,
                ltv: record.ltv,
                pitia: record.pitia,
                dscr: record.dscr,
            })
        }
    }
}

impl From<RowValues> for RowValuesRecord {
    fn from(values: RowValues) -> Self {
        match values {
            RowValues::Amortizing(row) => RowValuesRecord {
                loan_price: row.loan_price,
                interest_rate: row.interest_rate,
                loan_amount: row.loan_amount,
                ltv: row.ltv,
                pitia: row.pitia,
                dscr: row.dscr,
                ..RowValuesRecord::default()
            },
            RowValues::DrawStructured(row) => RowValuesRecord {
                loan_price: row.loan_price,
                interest_rate: row.interest_rate,
                initial_loan_amount: row.initial_loan_amount,
                rehab_holdback: row.rehab_holdback,
                total_loan_amount: row.total_loan_amount,
                funded_pitia: row.funded_pitia,
                ..RowValuesRecord::default()
            },
        }
    }
}
