//! Plain-text rendering of calculation results for the command line.

use rust_decimal::Decimal;
use serde::Serialize;
use tax_core::CalculationResult;
use tax_core::calculations::{
    BonusTaxResult, ComprehensiveIncomeResult, FlatTaxResult, TransferCost, VatResult,
};

/// A VAT split together with the surtax levied on it, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VatSummary {
    #[serde(flatten)]
    pub split: VatResult,
    pub surtax_rate: Option<Decimal>,
    pub surtax: Decimal,
}

fn bound(upper: Option<Decimal>) -> String {
    upper.map_or_else(|| "-".to_string(), |u| u.to_string())
}

fn bracket_row(
    index: &dyn std::fmt::Display,
    lower: &dyn std::fmt::Display,
    upper: &dyn std::fmt::Display,
    rate: &dyn std::fmt::Display,
    portion: &dyn std::fmt::Display,
    tax: &dyn std::fmt::Display,
) -> String {
    format!("{index:>3}  {lower:>12}  {upper:>12}  {rate:>6}  {portion:>14}  {tax:>14}\n")
}

fn category_row(
    name: &str,
    income: &dyn std::fmt::Display,
    tax: &dyn std::fmt::Display,
) -> String {
    format!("{name:<16}{income:>14}{tax:>14}\n")
}

pub fn render_calculation(result: &CalculationResult) -> String {
    let mut out = format!(
        "Table:          {} (effective {})\nTaxable amount: {} {}\n",
        result.table, result.table_effective_from, result.taxable_amount, result.currency
    );
    out.push_str(&bracket_row(&"#", &"lower", &"upper", &"rate", &"portion", &"tax"));
    for c in &result.breakdown {
        out.push_str(&bracket_row(
            &c.index,
            &c.lower_bound,
            &bound(c.upper_bound),
            &c.rate,
            &c.taxed_portion,
            &c.tax,
        ));
    }
    out.push_str(&format!(
        "Total tax:      {}\nNet amount:     {}\nMarginal rate:  {}\nEffective rate: {}\n",
        result.total_tax,
        result.net_amount(),
        result.marginal_rate,
        result.effective_rate
    ));
    out
}

pub fn render_bonus(result: &BonusTaxResult) -> String {
    format!(
        "Bonus:          {} {}\nPer period:     {} x {}\nTax per period: {}\nTotal tax:      {}\nNet amount:     {}\n",
        result.bonus,
        result.currency,
        result.per_period_amount,
        result.periods,
        result.per_period_tax,
        result.total_tax,
        result.net_amount()
    )
}

pub fn render_flat(result: &FlatTaxResult) -> String {
    format!(
        "Taxable amount: {} {}\nRate:           {}\nTax:            {}\nNet amount:     {}\n",
        result.taxable_amount,
        result.currency,
        result.rate,
        result.tax,
        result.net_amount()
    )
}

pub fn render_comprehensive(result: &ComprehensiveIncomeResult) -> String {
    let rows = [
        ("salary", result.salary, result.salary_tax),
        ("service income", result.service_income, result.service_tax),
        ("bonus", result.bonus.bonus, result.bonus.total_tax),
        ("dividend", result.dividend.taxable_amount, result.dividend.tax),
        ("total", result.total_income, result.total_tax),
    ];

    let mut out = category_row("category", &"income", &"tax");
    for (name, income, tax) in rows {
        out.push_str(&category_row(name, &income, &tax));
    }
    out.push_str(&format!(
        "Net income:     {} {}\nEffective rate: {}\n",
        result.total_net(),
        result.currency,
        result.effective_rate
    ));
    out
}

pub fn render_vat(summary: &VatSummary) -> String {
    let split = &summary.split;
    let mut out = format!(
        "Gross price:    {} {}\nVAT rate:       {}\nVAT:            {}\nNet price:      {}\n",
        split.gross, split.currency, split.vat_rate, split.vat, split.net
    );
    if let Some(rate) = summary.surtax_rate {
        out.push_str(&format!("Surtax ({rate}):  {}\n", summary.surtax));
    }
    out
}

pub fn render_transfer(cost: &TransferCost) -> String {
    let mut out = format!(
        "Transfer:       {} -> {} ({})\nAmount:         {} {}\n",
        cost.sender, cost.receiver, cost.mode, cost.amount, cost.currency
    );
    let parts = [
        ("VAT", cost.vat),
        ("Surtax", cost.surtax),
        ("EIT", cost.eit),
        ("PIT", cost.pit),
    ];
    for (name, tax) in parts {
        out.push_str(&category_row(name, &"", &tax));
    }
    out.push_str(&format!(
        "Total cost:     {}\nNet amount:     {}\n",
        cost.total_cost, cost.net_amount
    ));
    out
}
