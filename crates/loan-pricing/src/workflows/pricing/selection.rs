//! The user's chosen "Main" pricing point and its remapping across result sets.
//!
//! Row indices are not stable across recomputation: a program may return a
//! different number of candidate rows next time. Remapping therefore locates the
//! program by identity and the row by nearest price.

use serde::{Deserialize, Serialize};

use super::results::RowValues;
use super::slots::ResultSlot;

/// The single selected pricing point, replaced wholesale on every selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedRow {
    pub program_idx: usize,
    pub row_idx: usize,
    pub program_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    pub values: RowValues,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("program {0} does not exist")]
    UnknownProgram(usize),
    #[error("program {0} has no result yet")]
    PendingProgram(usize),
    #[error("program {program_idx} has no row {row_idx}")]
    UnknownRow { program_idx: usize, row_idx: usize },
    #[error("results from cycle {0} were replaced by a newer calculation")]
    Superseded(u64),
}

/// Capture the row the user starred.
pub fn select_row(
    slots: &[ResultSlot],
    program_idx: usize,
    row_idx: usize,
) -> Result<SelectedRow, SelectionError> {
    let slot = slots
        .get(program_idx)
        .ok_or(SelectionError::UnknownProgram(program_idx))?;
    let result = slot
        .result()
        .ok_or(SelectionError::PendingProgram(program_idx))?;
    let values = result.row(row_idx).ok_or(SelectionError::UnknownRow {
        program_idx,
        row_idx,
    })?;

    Ok(SelectedRow {
        program_idx,
        row_idx,
        program_name: result.descriptor.external_name.clone(),
        program_id: result.descriptor.internal_id.clone(),
        values,
    })
}

/// Program index by stored id, then stored name, else 0.
pub fn resolve_program(slots: &[ResultSlot], selection: &SelectedRow) -> usize {
    let by_id = selection
        .program_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .and_then(|id| slots.iter().position(|slot| slot.descriptor().matches_id(id)));

    let by_name = || {
        slots
            .iter()
            .position(|slot| slot.descriptor().matches_name(&selection.program_name))
    };

    let index = by_id.or_else(by_name).unwrap_or(0);
    if index < slots.len() {
        index
    } else {
        0
    }
}

/// Row index whose price is nearest the stored price; ties go to the lowest index.
/// Falls back to the stored index when the program has no rows or no price was stored.
pub fn resolve_row(slots: &[ResultSlot], program_idx: usize, selection: &SelectedRow) -> usize {
    let prices = match slots.get(program_idx).and_then(ResultSlot::result) {
        Some(result) if result.row_count() > 0 => result.loan_prices(),
        _ => return selection.row_idx,
    };
    let Some(target) = selection.values.loan_price() else {
        return selection.row_idx;
    };

    nearest_index(prices, target).unwrap_or(selection.row_idx)
}

fn nearest_index(values: &[f64], target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, value) in values.iter().enumerate() {
        let distance = (value - target).abs();
        if distance.is_nan() {
            continue;
        }
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((index, distance)),
        }
    }
    best.map(|(index, _)| index)
}

/// Rewrite the stored indices onto the current result set. The value snapshot is
/// kept as-is and the slots are only read, so repeating the call is a no-op.
pub fn remap(selection: &SelectedRow, slots: &[ResultSlot]) -> SelectedRow {
    let program_idx = resolve_program(slots, selection);
    let row_idx = resolve_row(slots, program_idx, selection);
    SelectedRow {
        program_idx,
        row_idx,
        ..selection.clone()
    }
}

/// Figures for the "Main" summary panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MainSummary {
    pub program_name: String,
    pub loan_price: Option<f64>,
    pub interest_rate: Option<f64>,
    pub figures: MainFigures,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MainFigures {
    Amortizing {
        loan_amount: Option<f64>,
        ltv: Option<f64>,
        pitia: Option<f64>,
        dscr: Option<f64>,
    },
    DrawStructured {
        initial_loan_amount: Option<f64>,
        rehab_holdback: Option<f64>,
        total_loan_amount: Option<f64>,
        funded_pitia: Option<f64>,
    },
}

impl MainSummary {
    pub fn from_selection(selection: &SelectedRow) -> Self {
        let figures = match &selection.values {
            RowValues::Amortizing(row) => MainFigures::Amortizing {
                loan_amount: row.loan_amount,
                ltv: row.ltv,
                pitia: row.pitia,
                dscr: row.dscr,
            },
            RowValues::DrawStructured(row) => MainFigures::DrawStructured {
                initial_loan_amount: row.initial_loan_amount,
                rehab_holdback: row.rehab_holdback,
                total_loan_amount: row.total_loan_amount,
                funded_pitia: row.funded_pitia,
            },
        };

        Self {
            program_name: selection.program_name.clone(),
            loan_price: selection.values.loan_price(),
            interest_rate: selection.values.interest_rate(),
            figures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::pricing::programs::ProgramDescriptor;
    use crate::workflows::pricing::results::{
        AmortizingColumns, AmortizingRow, DrawColumns, ProgramResult, ResultKind,
    };

    fn filled(descriptor: ProgramDescriptor, prices: &[f64]) -> ResultSlot {
        ResultSlot::Filled {
            result: ProgramResult {
                descriptor,
                pass: true,
                interest_rate: prices.iter().map(|_| 7.0).collect(),
                loan_price: prices.to_vec(),
                columns: ResultKind::Amortizing(AmortizingColumns {
                    loan_amount: Some(320000.0),
                    ltv: Some(80.0),
                    pitia: prices.iter().map(|p| p * 20.0).collect(),
                    dscr: prices.iter().map(|_| 1.25).collect(),
                }),
                validations: Vec::new(),
            },
        }
    }

    fn stored(program_id: Option<&str>, program_name: &str, row_idx: usize, price: f64) -> SelectedRow {
        SelectedRow {
            program_idx: 7,
            row_idx,
            program_name: program_name.to_string(),
            program_id: program_id.map(str::to_string),
            values: RowValues::Amortizing(AmortizingRow {
                loan_price: Some(price),
                ..AmortizingRow::default()
            }),
        }
    }

    #[test]
    fn nearest_price_wins() {
        let slots = vec![filled(ProgramDescriptor::new("a", "Alpha"), &[100.25, 100.5, 101.0])];
        let remapped = remap(&stored(Some("a"), "Alpha", 2, 100.6), &slots);
        assert_eq!((remapped.program_idx, remapped.row_idx), (0, 1));
    }

    #[test]
    fn price_ties_resolve_to_the_first_row() {
        let slots = vec![filled(ProgramDescriptor::new("a", "Alpha"), &[100.0, 101.0, 100.0])];
        let remapped = remap(&stored(Some("a"), "Alpha", 2, 100.5), &slots);
        assert_eq!(remapped.row_idx, 0);
    }

    #[test]
    fn id_match_beats_display_name_match() {
        let slots = vec![
            filled(ProgramDescriptor::new("other", "Target Name"), &[100.0]),
            filled(ProgramDescriptor::new("target-id", "Renamed"), &[100.0]),
        ];
        let remapped = remap(&stored(Some("target-id"), "Target Name", 0, 100.0), &slots);
        assert_eq!(remapped.program_idx, 1);
    }

    #[test]
    fn stored_id_may_match_a_display_name() {
        let slots = vec![
            filled(ProgramDescriptor::new("x", "X"), &[100.0]),
            filled(
                ProgramDescriptor {
                    internal_id: None,
                    external_name: "Legacy".to_string(),
                },
                &[100.0],
            ),
        ];
        let remapped = remap(&stored(Some("Legacy"), "Unrelated", 0, 100.0), &slots);
        assert_eq!(remapped.program_idx, 1);
    }

    #[test]
    fn name_is_used_when_id_is_missing_or_unknown() {
        let slots = vec![
            filled(ProgramDescriptor::new("a", "Alpha"), &[100.0]),
            filled(ProgramDescriptor::new("b", "Beta"), &[100.0]),
        ];
        assert_eq!(remap(&stored(None, "Beta", 0, 100.0), &slots).program_idx, 1);
        assert_eq!(remap(&stored(Some("gone"), "Beta", 0, 100.0), &slots).program_idx, 1);
    }

    #[test]
    fn unknown_program_defaults_to_first_slot() {
        let slots = vec![
            filled(ProgramDescriptor::new("a", "Alpha"), &[99.0, 100.0]),
            filled(ProgramDescriptor::new("b", "Beta"), &[100.0]),
        ];
        let remapped = remap(&stored(Some("gone"), "Gone", 0, 100.1), &slots);
        assert_eq!((remapped.program_idx, remapped.row_idx), (0, 1));
    }

    #[test]
    fn empty_result_set_keeps_the_stored_row() {
        let remapped = remap(&stored(Some("a"), "Alpha", 3, 100.0), &[]);
        assert_eq!((remapped.program_idx, remapped.row_idx), (0, 3));

        let pending = vec![ResultSlot::Pending {
            descriptor: ProgramDescriptor::new("a", "Alpha"),
        }];
        let remapped = remap(&stored(Some("a"), "Alpha", 3, 100.0), &pending);
        assert_eq!((remapped.program_idx, remapped.row_idx), (0, 3));

        let no_rows = vec![filled(ProgramDescriptor::new("a", "Alpha"), &[])];
        assert_eq!(remap(&stored(Some("a"), "Alpha", 4, 100.0), &no_rows).row_idx, 4);
    }

    #[test]
    fn remapping_twice_is_stable() {
        let slots = vec![
            filled(ProgramDescriptor::new("a", "Alpha"), &[100.0, 100.4]),
            filled(ProgramDescriptor::new("b", "Beta"), &[99.5, 100.75, 101.25]),
        ];
        let original = stored(Some("b"), "Beta", 0, 101.0);
        let once = remap(&original, &slots);
        let twice = remap(&once, &slots);
        assert_eq!((once.program_idx, once.row_idx), (twice.program_idx, twice.row_idx));
        assert_eq!(once.values, original.values);
    }

    #[test]
    fn selecting_captures_the_row_snapshot() {
        let slots = vec![
            ResultSlot::Pending {
                descriptor: ProgramDescriptor::new("a", "Alpha"),
            },
            filled(ProgramDescriptor::new("b", "Beta"), &[99.5, 100.75]),
        ];
        let selected = select_row(&slots, 1, 1).expect("row exists");
        assert_eq!(selected.program_id.as_deref(), Some("b"));
        assert_eq!(selected.values.loan_price(), Some(100.75));

        assert_eq!(select_row(&slots, 0, 0), Err(SelectionError::PendingProgram(0)));
        assert_eq!(select_row(&slots, 4, 0), Err(SelectionError::UnknownProgram(4)));
        assert_eq!(
            select_row(&slots, 1, 9),
            Err(SelectionError::UnknownRow {
                program_idx: 1,
                row_idx: 9
            })
        );
    }

    #[test]
    fn main_summary_follows_row_shape() {
        let draw_slot = ResultSlot::Filled {
            result: ProgramResult {
                descriptor: ProgramDescriptor::new("br", "Bridge Select"),
                pass: true,
                loan_price: vec![99.0],
                interest_rate: vec![10.75],
                columns: ResultKind::DrawStructured(DrawColumns {
                    initial_loan_amount: vec![180000.0],
                    rehab_holdback: vec![45000.0],
                    total_loan_amount: vec![225000.0],
                    funded_pitia: vec![2015.0],
                }),
                validations: Vec::new(),
            },
        };
        let selected = select_row(&[draw_slot], 0, 0).expect("row exists");
        let summary = MainSummary::from_selection(&selected);
        assert_eq!(summary.interest_rate, Some(10.75));
        assert_eq!(
            summary.figures,
            MainFigures::DrawStructured {
                initial_loan_amount: Some(180000.0),
                rehab_holdback: Some(45000.0),
                total_loan_amount: Some(225000.0),
                funded_pitia: Some(2015.0),
            }
        );

        let amortizing = stored(Some("a"), "Alpha", 0, 100.0);
        assert!(matches!(
            MainSummary::from_selection(&amortizing).figures,
            MainFigures::Amortizing { .. }
        ));
    }
}
