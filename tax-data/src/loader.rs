use std::collections::BTreeMap;
use std::io::Read;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tax_core::validation::exact_decimal;
use tax_core::{
    BracketTable, ConfigurationError, RepositoryError, TableKey, TableSnapshot, TaxBracket,
    TaxRepository,
};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur when loading bracket table data.
#[derive(Debug, Error)]
pub enum BracketLoaderError {
    #[error("CSV parse error: {0}")]
    CsvParse(String),

    #[error("Table {key} effective {effective_from}: {source}")]
    InvalidTable {
        key: TableKey,
        effective_from: NaiveDate,
        source: ConfigurationError,
    },

    #[error("Table {key} effective {effective_from} has rows with different end dates")]
    InconsistentPeriod {
        key: TableKey,
        effective_from: NaiveDate,
    },

    #[error(
        "Table {key} effective {effective_from}, bracket {index}: published quick deduction {published} does not match computed {computed}"
    )]
    QuickDeductionMismatch {
        key: TableKey,
        effective_from: NaiveDate,
        index: usize,
        published: Decimal,
        computed: Decimal,
    },

    #[error("Tables in the file conflict: {0}")]
    Conflict(ConfigurationError),

    #[error("Tables in the file conflict with stored tables: {0}")]
    ConflictsWithStored(ConfigurationError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<csv::Error> for BracketLoaderError {
    fn from(err: csv::Error) -> Self {
        BracketLoaderError::CsvParse(err.to_string())
    }
}

/// A single record from the bracket CSV file.
///
/// - `jurisdiction_id`, `tax_type`: the table key (e.g. `CN`, `monthly`)
/// - `effective_from`: first day the table applies (`YYYY-MM-DD`)
/// - `effective_to`: last day it applies, inclusive (empty for open-ended)
/// - `lower_bound`, `upper_bound`: bracket bounds (empty upper for unbounded)
/// - `rate`: the marginal rate as a decimal (e.g. 0.10 for 10%)
/// - `quick_deduction`: optional published figure, cross-checked on load
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BracketRecord {
    pub jurisdiction_id: String,
    pub tax_type: String,
    pub effective_from: NaiveDate,
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
    #[serde(deserialize_with = "exact_decimal::deserialize")]
    pub lower_bound: Decimal,
    #[serde(deserialize_with = "exact_decimal::option::deserialize")]
    pub upper_bound: Option<Decimal>,
    #[serde(deserialize_with = "exact_decimal::deserialize")]
    pub rate: Decimal,
    #[serde(default, deserialize_with = "exact_decimal::option::deserialize")]
    pub quick_deduction: Option<Decimal>,
}

/// Loader for bracket tables from CSV files.
///
/// Rows are grouped into tables by `(jurisdiction_id, tax_type,
/// effective_from)` and every table is validated before anything is
/// written, so a bad file never leaves the database half-loaded.
pub struct BracketLoader;

impl BracketLoader {
    /// Parse bracket records from a CSV reader.
    pub fn parse<R: Read>(reader: R) -> Result<Vec<BracketRecord>, BracketLoaderError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut records = Vec::new();

        for result in csv_reader.deserialize() {
            let record: BracketRecord = result?;
            records.push(record);
        }

        Ok(records)
    }

    /// Group records into validated tables.
    ///
    /// Brackets keep their file order. Published quick deductions are
    /// compared against the ones implied by the brackets, and tables in the
    /// file must not overlap each other.
    pub fn build_tables(records: &[BracketRecord]) -> Result<Vec<BracketTable>, BracketLoaderError> {
        let mut groups: BTreeMap<(TableKey, NaiveDate), Vec<&BracketRecord>> = BTreeMap::new();
        for record in records {
            groups
                .entry((
                    TableKey::new(record.jurisdiction_id.clone(), record.tax_type.clone()),
                    record.effective_from,
                ))
                .or_default()
                .push(record);
        }

        let mut tables = Vec::with_capacity(groups.len());
        for ((key, effective_from), rows) in groups {
            let effective_to = rows[0].effective_to;
            if rows.iter().any(|row| row.effective_to != effective_to) {
                return Err(BracketLoaderError::InconsistentPeriod {
                    key,
                    effective_from,
                });
            }

            let brackets = rows
                .iter()
                .map(|row| TaxBracket::new(row.lower_bound, row.upper_bound, row.rate))
                .collect();
            let table = BracketTable::new(key.clone(), effective_from, effective_to, brackets)
                .map_err(|source| {
                    warn!(table = %key, %effective_from, error = %source, "rejected bracket table");
                    BracketLoaderError::InvalidTable {
                        key: key.clone(),
                        effective_from,
                        source,
                    }
                })?;

            for (index, row) in rows.iter().enumerate() {
                let Some(published) = row.quick_deduction else {
                    continue;
                };
                let computed = table.quick_deduction(index).unwrap_or_default();
                if published != computed {
                    return Err(BracketLoaderError::QuickDeductionMismatch {
                        key,
                        effective_from,
                        index,
                        published,
                        computed,
                    });
                }
            }

            tables.push(table);
        }

        TableSnapshot::new(tables.iter().cloned()).map_err(BracketLoaderError::Conflict)?;
        Ok(tables)
    }

    /// Replace each table in the database.
    ///
    /// The file's tables are first checked against what is already stored:
    /// a stored table with the same key and start date will be replaced, any
    /// other stored table must not overlap a new one. Each replacement is a
    /// single repository transaction, so loading the same file twice leaves
    /// the database unchanged.
    pub async fn load<R: TaxRepository + ?Sized>(
        repo: &R,
        tables: &[BracketTable],
    ) -> Result<usize, BracketLoaderError> {
        Self::check_against_stored(repo, tables).await?;

        let mut loaded = 0;
        for table in tables {
            let replaced = repo.replace_bracket_table(table).await?;
            info!(
                table = %table.key(),
                effective_from = %table.effective_from(),
                brackets = table.brackets().len(),
                replaced,
                "loaded bracket table"
            );
            loaded += 1;
        }

        Ok(loaded)
    }

    /// Builds the snapshot the database would hold after loading `tables`
    /// and fails if any two periods for the same key would overlap.
    async fn check_against_stored<R: TaxRepository + ?Sized>(
        repo: &R,
        tables: &[BracketTable],
    ) -> Result<(), BracketLoaderError> {
        let stored = repo.list_bracket_tables().await?;
        let kept = stored.into_iter().filter(|existing| {
            !tables.iter().any(|table| {
                table.key() == existing.key() && table.effective_from() == existing.effective_from()
            })
        });

        TableSnapshot::new(kept.chain(tables.iter().cloned()))
            .map(|_| ())
            .map_err(|source| {
                warn!(error = %source, "bracket file conflicts with stored tables");
                BracketLoaderError::ConflictsWithStored(source)
            })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    const TEST_CSV: &str = "jurisdiction_id,tax_type,effective_from,effective_to,lower_bound,upper_bound,rate,quick_deduction
CN,monthly,2019-01-01,,0,3000,0.03,0
CN,monthly,2019-01-01,,3000,12000,0.10,210
CN,monthly,2019-01-01,,12000,25000,0.20,1410
CN,monthly,2019-01-01,,25000,35000,0.25,2660
CN,monthly,2019-01-01,,35000,55000,0.30,4410
CN,monthly,2019-01-01,,55000,80000,0.35,7160
CN,monthly,2019-01-01,,80000,,0.45,15160
CN,monthly,2011-09-01,2018-12-31,0,1500,0.03,0
CN,monthly,2011-09-01,2018-12-31,1500,4500,0.10,105
CN,monthly,2011-09-01,2018-12-31,4500,9000,0.20,555
CN,monthly,2011-09-01,2018-12-31,9000,35000,0.25,1005
CN,monthly,2011-09-01,2018-12-31,35000,55000,0.30,2755
CN,monthly,2011-09-01,2018-12-31,55000,80000,0.35,5505
CN,monthly,2011-09-01,2018-12-31,80000,,0.45,13505
";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // =========================================================================
    // parse tests
    // =========================================================================

    #[test]
    fn test_parse_csv_single_bracket() {
        let csv = "jurisdiction_id,tax_type,effective_from,effective_to,lower_bound,upper_bound,rate\nCN,monthly,2019-01-01,,0,3000,0.03";

        let records = BracketLoader::parse(csv.as_bytes()).expect("Failed to parse CSV");

        assert_eq!(
            records,
            vec![BracketRecord {
                jurisdiction_id: "CN".to_string(),
                tax_type: "monthly".to_string(),
                effective_from: date(2019, 1, 1),
                effective_to: None,
                lower_bound: dec!(0),
                upper_bound: Some(dec!(3000)),
                rate: dec!(0.03),
                quick_deduction: None,
            }]
        );
    }

    #[test]
    fn test_parse_csv_unbounded_and_end_date() {
        let records = BracketLoader::parse(TEST_CSV.as_bytes()).expect("Failed to parse CSV");

        assert_eq!(records.len(), 14);
        assert_eq!(records[6].upper_bound, None);
        assert_eq!(records[6].quick_deduction, Some(dec!(15160)));
        assert_eq!(records[7].effective_to, Some(date(2018, 12, 31)));
    }

    #[test]
    fn test_parse_keeps_every_digit_of_rate() {
        let csv = "jurisdiction_id,tax_type,effective_from,effective_to,lower_bound,upper_bound,rate\nXX,fine,2025-01-01,,0.0000000000000000001,,0.1234567890123456789";

        let records = BracketLoader::parse(csv.as_bytes()).expect("Failed to parse CSV");

        assert_eq!(records[0].rate, dec!(0.1234567890123456789));
        assert_eq!(records[0].rate.to_string(), "0.1234567890123456789");
        assert_eq!(records[0].lower_bound, dec!(0.0000000000000000001));
    }

    #[test]
    fn test_parse_rejects_rate_beyond_decimal_precision() {
        let csv = "jurisdiction_id,tax_type,effective_from,effective_to,lower_bound,upper_bound,rate\nXX,fine,2025-01-01,,0,,0.12345678901234567890123456789";

        let err = BracketLoader::parse(csv.as_bytes()).expect_err("Should not round the rate");

        assert!(matches!(err, BracketLoaderError::CsvParse(_)));
    }

    #[test]
    fn test_parse_invalid_csv_missing_column() {
        let csv = "jurisdiction_id,tax_type,effective_from\nCN,monthly,2019-01-01";

        let err = BracketLoader::parse(csv.as_bytes()).expect_err("Should fail for missing column");
        let BracketLoaderError::CsvParse(msg) = err else {
            panic!("Expected CsvParse error, got: {:?}", err);
        };
        assert!(
            msg.contains("missing field"),
            "Expected 'missing field' in error, got: {}",
            msg
        );
    }

    #[test]
    fn test_parse_invalid_csv_bad_decimal() {
        let csv = "jurisdiction_id,tax_type,effective_from,effective_to,lower_bound,upper_bound,rate\nCN,monthly,2019-01-01,,0,abc,0.03";

        let err = BracketLoader::parse(csv.as_bytes()).expect_err("Should fail for invalid decimal");

        assert!(matches!(err, BracketLoaderError::CsvParse(_)));
    }

    // =========================================================================
    // build_tables tests
    // =========================================================================

    #[test]
    fn test_build_tables_groups_by_key_and_start() {
        let records = BracketLoader::parse(TEST_CSV.as_bytes()).unwrap();

        let tables = BracketLoader::build_tables(&records).expect("valid tables");

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].effective_from(), date(2011, 9, 1));
        assert_eq!(tables[0].effective_to(), Some(date(2018, 12, 31)));
        assert_eq!(tables[1].effective_from(), date(2019, 1, 1));
        assert!(tables.iter().all(|t| t.brackets().len() == 7));
    }

    #[test]
    fn test_build_tables_rejects_quick_deduction_mismatch() {
        let csv = TEST_CSV.replace("0.10,210", "0.10,200");
        let records = BracketLoader::parse(csv.as_bytes()).unwrap();

        let err = BracketLoader::build_tables(&records).unwrap_err();

        let BracketLoaderError::QuickDeductionMismatch {
            index,
            published,
            computed,
            ..
        } = err
        else {
            panic!("Expected QuickDeductionMismatch, got: {:?}", err);
        };
        assert_eq!((index, published, computed), (1, dec!(200), dec!(210)));
    }

    #[test]
    fn test_build_tables_rejects_gap() {
        let csv = "jurisdiction_id,tax_type,effective_from,effective_to,lower_bound,upper_bound,rate
CN,monthly,2019-01-01,,0,3000,0.03
CN,monthly,2019-01-01,,4000,,0.10";
        let records = BracketLoader::parse(csv.as_bytes()).unwrap();

        let err = BracketLoader::build_tables(&records).unwrap_err();

        assert!(matches!(
            err,
            BracketLoaderError::InvalidTable {
                source: ConfigurationError::NotContiguous { index: 0, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_build_tables_rejects_inconsistent_end_dates() {
        let csv = "jurisdiction_id,tax_type,effective_from,effective_to,lower_bound,upper_bound,rate
CN,monthly,2019-01-01,2019-12-31,0,3000,0.03
CN,monthly,2019-01-01,,3000,,0.10";
        let records = BracketLoader::parse(csv.as_bytes()).unwrap();

        let err = BracketLoader::build_tables(&records).unwrap_err();

        assert!(matches!(err, BracketLoaderError::InconsistentPeriod { .. }));
    }

    #[test]
    fn test_build_tables_rejects_overlapping_tables() {
        let csv = "jurisdiction_id,tax_type,effective_from,effective_to,lower_bound,upper_bound,rate
CN,monthly,2019-01-01,,0,,0.03
CN,monthly,2020-01-01,,0,,0.05";
        let records = BracketLoader::parse(csv.as_bytes()).unwrap();

        let err = BracketLoader::build_tables(&records).unwrap_err();

        assert!(matches!(
            err,
            BracketLoaderError::Conflict(ConfigurationError::OverlappingPeriods { .. })
        ));
    }
}
