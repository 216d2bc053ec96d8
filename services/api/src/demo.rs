use crate::infra::{demo_collaborators, parse_date, parse_loan_type};
use chrono::{Local, NaiveDate};
use clap::Args;
use loan_pricing::error::AppError;
use loan_pricing::workflows::pricing::{
    BoardSnapshot, LoanType, MainFigures, MainSummary, PricingForm, PricingSession, ResultSlot,
    TransactionType, UnitRent,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Loan product to price (dscr or bridge)
    #[arg(long, default_value = "dscr", value_parser = parse_loan_type)]
    pub(crate) loan_type: LoanType,
    /// Reference date anchoring default closing dates (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) reference_date: Option<NaiveDate>,
    /// Borrower FICO used for the sample loan
    #[arg(long, default_value = "745")]
    pub(crate) fico: String,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        loan_type,
        reference_date,
        fico,
    } = args;
    let reference_date = reference_date.unwrap_or_else(|| Local::now().date_naive());

    let session = PricingSession::new(demo_collaborators(), reference_date);
    let mut form = sample_form(loan_type);
    form.borrower.fico = fico;

    println!("Loan pricing demo ({} loan, reference date {reference_date})", loan_type.label());
    let outcome = session.calculate(&form).await;
    println!(
        "Priced {} programs: {} filled, {} failed",
        outcome.programs, outcome.report.filled, outcome.report.failed
    );
    render_board(&session.board());

    let Some((program_idx, row_idx)) = par_row(&session.board()) else {
        println!("\nNo program returned rows; nothing to select.");
        return Ok(());
    };
    if let Err(err) = session.select(program_idx, row_idx) {
        println!("\nCould not select row {row_idx} of program {program_idx}: {err}");
        return Ok(());
    }
    if let Some(summary) = session.main_summary() {
        println!("\nSelected as main");
        render_summary(&summary);
    }

    let saved = session
        .save_scenario(format!("Demo {} scenario", loan_type.label()), None)
        .await?;
    println!("\nSaved scenario {}", saved.scenario_id);

    form.borrower.fico = "700".to_string();
    if session.form_changed(&form) {
        println!("Edited FICO to 700: results are now stale");
    }

    let (_, restored) = session.restore_scenario(&saved.scenario_id).await?;
    println!(
        "Restored scenario {} (cycle {}, stale: {})",
        saved.scenario_id,
        restored.generation,
        session.results_stale()
    );
    if let Some(selected) = session.selected() {
        println!(
            "Selection remapped to program {} row {}",
            selected.program_idx, selected.row_idx
        );
    }

    Ok(())
}

fn sample_form(loan_type: LoanType) -> PricingForm {
    let mut form = PricingForm::new(loan_type, TransactionType::Purchase);
    form.address.street = "1820 Ingersoll Ave".to_string();
    form.address.city = "Des Moines".to_string();
    form.address.state = "IA".to_string();
    form.address.zip = "50309".to_string();
    form.address.county = "Polk".to_string();
    form.borrower.borrower_type = "llc".to_string();
    form.borrower.entity_name = "Ingersoll Holdings LLC".to_string();
    form.borrower.citizenship = "us_citizen".to_string();
    form.property.property_type = "two_to_four_unit".to_string();
    form.property.num_units = "2".to_string();
    form.property.purchase_price = "385000".to_string();
    form.property.annual_taxes = "5400".to_string();
    form.property.annual_insurance = "1650".to_string();

    match loan_type {
        LoanType::Dscr => {
            form.property.loan_amount = "288750".to_string();
            form.dscr.loan_structure = "30yr_fixed".to_string();
            form.dscr.prepayment_penalty = "3yr".to_string();
            form.dscr.units = vec![
                UnitRent {
                    unit_label: "Upper".to_string(),
                    bedrooms: "2".to_string(),
                    bathrooms: "1".to_string(),
                    leased: true,
                    gross_rent: "1450".to_string(),
                    market_rent: "1500".to_string(),
                },
                UnitRent {
                    unit_label: "Lower".to_string(),
                    bedrooms: "3".to_string(),
                    bathrooms: "1".to_string(),
                    leased: false,
                    gross_rent: "1650".to_string(),
                    market_rent: "1650".to_string(),
                },
            ];
        }
        LoanType::Bridge => {
            form.bridge.term_months = "12".to_string();
            form.bridge.bridge_type = "fix_and_flip".to_string();
            form.bridge.flips_last_three_years = "4".to_string();
            form.bridge.initial_loan_amount = "290000".to_string();
            form.bridge.rehab_budget = "60000".to_string();
            form.bridge.rehab_holdback = "60000".to_string();
            form.bridge.arv = "520000".to_string();
        }
    }
    form
}

/// Row priced closest to par across every filled program.
fn par_row(board: &BoardSnapshot) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for (program_idx, slot) in board.slots.iter().enumerate() {
        let Some(result) = slot.result().filter(|result| result.pass) else {
            continue;
        };
        for (row_idx, price) in result.loan_prices().iter().enumerate() {
            let distance = (price - 100.0).abs();
            if best.map_or(true, |(_, _, current)| distance < current) {
                best = Some((program_idx, row_idx, distance));
            }
        }
    }
    best.map(|(program_idx, row_idx, _)| (program_idx, row_idx))
}

fn render_board(board: &BoardSnapshot) {
    for (idx, slot) in board.slots.iter().enumerate() {
        match slot {
            ResultSlot::Pending { descriptor } => {
                println!("  [{idx}] {:<28} generating...", descriptor.external_name);
            }
            ResultSlot::Filled { result } => {
                let status = if result.pass { "pass" } else { "fail" };
                println!(
                    "  [{idx}] {:<28} {status} ({} rows)",
                    result.descriptor.external_name,
                    result.row_count()
                );
                for validation in &result.validations {
                    println!("        - {validation}");
                }
                for row_idx in 0..result.row_count() {
                    if let Some(row) = result.row(row_idx) {
                        println!(
                            "        row {row_idx}: price {:>7.3}  rate {:>6.3}%",
                            row.loan_price().unwrap_or_default(),
                            row.interest_rate().unwrap_or_default()
                        );
                    }
                }
            }
        }
    }
}

fn render_summary(summary: &MainSummary) {
    println!("  Program:        {}", summary.program_name);
    if let Some(price) = summary.loan_price {
        println!("  Price:          {price:.3}");
    }
    if let Some(rate) = summary.interest_rate {
        println!("  Rate:           {rate:.3}%");
    }
    match &summary.figures {
        MainFigures::Amortizing {
            loan_amount,
            ltv,
            pitia,
            dscr,
        } => {
            print_figure("Loan amount", *loan_amount);
            print_figure("LTV", *ltv);
            print_figure("PITIA", *pitia);
            print_figure("DSCR", *dscr);
        }
        MainFigures::DrawStructured {
            initial_loan_amount,
            rehab_holdback,
            total_loan_amount,
            funded_pitia,
        } => {
            print_figure("Initial amount", *initial_loan_amount);
            print_figure("Rehab holdback", *rehab_holdback);
            print_figure("Total amount", *total_loan_amount);
            print_figure("Funded PITIA", *funded_pitia);
        }
    }
}

fn print_figure(label: &str, value: Option<f64>) {
    match value {
        Some(value) => println!("  {:<15} {value:.2}", format!("{label}:")),
        None => println!("  {:<15} n/a", format!("{label}:")),
    }
}
