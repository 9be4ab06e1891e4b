mod bracket_table;
mod calculation_result;
mod tax_bracket;
mod taxable_amount;

pub use bracket_table::{BracketTable, TableKey};
pub use calculation_result::{BracketContribution, CalculationResult, StoredCalculation};
pub use tax_bracket::TaxBracket;
pub use taxable_amount::TaxableAmount;
