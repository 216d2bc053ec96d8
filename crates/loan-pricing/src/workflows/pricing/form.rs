use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Product family selected on the pricing page. Governs which form sections are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanType {
    Dscr,
    Bridge,
}

impl LoanType {
    pub fn label(self) -> &'static str {
        match self {
            LoanType::Dscr => "dscr",
            LoanType::Bridge => "bridge",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "dscr" => Some(LoanType::Dscr),
            "bridge" => Some(LoanType::Bridge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Purchase,
    RateTermRefinance,
    CashOutRefinance,
}

impl TransactionType {
    pub fn label(self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::RateTermRefinance => "rate_term_refinance",
            TransactionType::CashOutRefinance => "cash_out_refinance",
        }
    }
}

/// Complete snapshot of the pricing page inputs.
///
/// Numeric entries stay as the raw text the user typed; the remote programs own
/// numeric validation. Every section is always present so a builder never has to
/// guess whether a missing value means "not applicable".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingForm {
    pub loan_type: LoanType,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub address: PropertyAddress,
    #[serde(default)]
    pub borrower: BorrowerDetails,
    #[serde(default)]
    pub property: PropertyDetails,
    #[serde(default)]
    pub fees: FeeSchedule,
    #[serde(default)]
    pub acquisition_date: Option<NaiveDate>,
    #[serde(default)]
    pub closing_date: Option<NaiveDate>,
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub dscr: DscrSection,
}

impl PricingForm {
    pub fn new(loan_type: LoanType, transaction_type: TransactionType) -> Self {
        Self {
            loan_type,
            transaction_type,
            address: PropertyAddress::default(),
            borrower: BorrowerDetails::default(),
            property: PropertyDetails::default(),
            fees: FeeSchedule::default(),
            acquisition_date: None,
            closing_date: None,
            bridge: BridgeSection::default(),
            dscr: DscrSection::default(),
        }
    }

    pub fn bridge_visible(&self) -> bool {
        self.loan_type == LoanType::Bridge
    }

    pub fn dscr_visible(&self) -> bool {
        self.loan_type == LoanType::Dscr
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyAddress {
    pub street: String,
    pub unit: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub county: String,
}

/// Borrowing entity and guarantor inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorrowerDetails {
    pub borrower_type: String,
    pub entity_name: String,
    pub guarantor_name: String,
    pub citizenship: String,
    pub fico: String,
    pub guarantor_count: String,
    pub foreign_national: bool,
    pub rural: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyDetails {
    pub property_type: String,
    pub num_units: String,
    pub purchase_price: String,
    pub as_is_value: String,
    pub loan_amount: String,
    pub mortgage_payoff: String,
    pub annual_taxes: String,
    pub annual_insurance: String,
    pub annual_hoa: String,
    pub warrantable_condo: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub lender_origination_pct: String,
    pub broker_origination_pct: String,
    pub broker_admin_fee: String,
    pub lender_admin_fee: String,
    pub title_recording_fee: String,
}

/// Inputs visible only for bridge loans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    pub term_months: String,
    pub bridge_type: String,
    pub flips_last_three_years: String,
    pub ground_up_last_three_years: String,
    pub initial_loan_amount: String,
    pub rehab_budget: String,
    pub rehab_holdback: String,
    pub arv: String,
    pub rehab_completed: bool,
}

/// Inputs visible only for DSCR loans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DscrSection {
    pub first_time_homebuyer: bool,
    pub loan_structure: String,
    pub prepayment_penalty: String,
    pub short_term_rental: bool,
    pub declining_market: bool,
    pub units: Vec<UnitRent>,
}

/// One row of the per-unit rent table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitRent {
    pub unit_label: String,
    pub bedrooms: String,
    pub bathrooms: String,
    pub leased: bool,
    pub gross_rent: String,
    pub market_rent: String,
}
