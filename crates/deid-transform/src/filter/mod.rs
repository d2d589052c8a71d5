//! Row filters: run a transformer on a subset of rows, then put the table
//! back together.
//!
//! [`apply_filter`] evaluates a [`Predicate`] against the full table and
//! returns the matching rows together with a [`Selection`] recording their
//! positions. After the transformer has run on the subset, [`undo_filter`]
//! starts from the original table and writes the transformed rows back into
//! their positions. Unselected rows and columns the transformer did not touch
//! come out unchanged, and the result always has the original height.

mod parser;
mod predicate;

use polars::prelude::*;
use tracing::debug;

use crate::error::{FilterError, Result};

pub use predicate::{CompareOp, Literal, Operand, Predicate};

const MASK_COLUMN: &str = "__deid_filter_mask";

/// A compiled filter with the condition text it came from.
#[derive(Debug, Clone)]
pub struct RowFilter {
    condition: String,
    description: Option<String>,
    predicate: Predicate,
}

impl RowFilter {
    /// Parse a condition into a filter.
    pub fn parse(
        condition: &str,
        description: Option<String>,
    ) -> std::result::Result<Self, FilterError> {
        Ok(Self {
            condition: condition.to_string(),
            description,
            predicate: Predicate::parse(condition)?,
        })
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

/// Positions of the rows a filter selected, in table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    positions: Vec<IdxSize>,
    height: usize,
}

impl Selection {
    pub fn positions(&self) -> &[IdxSize] {
        &self.positions
    }

    /// Height of the table the selection was taken from.
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn mask(&self) -> BooleanChunked {
        let mut mask = vec![false; self.height];
        for &position in &self.positions {
            mask[position as usize] = true;
        }
        BooleanChunked::from_slice(MASK_COLUMN.into(), &mask)
    }
}

/// Evaluate `filter` on `table`, returning the selected rows and their
/// positions.
///
/// Every column the condition names must exist. Rows where the condition is
/// null are not selected.
pub fn apply_filter(table: &DataFrame, filter: &RowFilter) -> Result<(DataFrame, Selection)> {
    for column in filter.predicate.columns() {
        if table.column(column).is_err() {
            return Err(FilterError::UnknownColumn {
                column: column.to_string(),
                available: table
                    .get_column_names()
                    .iter()
                    .map(|name| name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }
            .into());
        }
    }

    let height = table.height();
    let evaluated = table
        .clone()
        .lazy()
        .select([filter.predicate.to_expr().alias(MASK_COLUMN)])
        .collect()?;
    let mask = evaluated.column(MASK_COLUMN)?;
    let values = mask.bool().map_err(|_| FilterError::InvalidMask {
        condition: filter.condition.clone(),
        expected: height,
        found: mask.dtype().to_string(),
    })?;

    let positions: Vec<IdxSize> = match values.len() {
        len if len == height => values
            .into_iter()
            .enumerate()
            .filter(|(_, value)| *value == Some(true))
            .map(|(row, _)| row as IdxSize)
            .collect(),
        // Conditions without a column reference evaluate to a single value.
        1 if values.get(0) == Some(true) => (0..height as IdxSize).collect(),
        1 => Vec::new(),
        len => {
            return Err(FilterError::InvalidMask {
                condition: filter.condition.clone(),
                expected: height,
                found: format!("{len} rows"),
            }
            .into());
        }
    };

    let selection = Selection { positions, height };
    let filtered = table.filter(&selection.mask())?;
    debug!(
        condition = filter.condition.as_str(),
        selected = selection.len(),
        rows = height,
        "filter applied"
    );
    Ok((filtered, selection))
}

/// Write the rows of `transformed` back into `original` at the positions in
/// `selection`.
///
/// Columns keep the original order. A column the transformer dropped keeps
/// its original values; a column the transformer added is null on the
/// unselected rows. When a column's dtype changed, both parts are widened to
/// a common dtype, falling back to `String`.
pub fn undo_filter(
    original: &DataFrame,
    transformed: DataFrame,
    selection: &Selection,
) -> Result<DataFrame> {
    if transformed.height() != selection.len() {
        return Err(FilterError::InvalidMask {
            condition: "<undo>".to_string(),
            expected: selection.len(),
            found: format!("{} transformed rows", transformed.height()),
        }
        .into());
    }

    let height = original.height();
    let mut columns = Vec::with_capacity(original.width());

    for column in original.get_columns() {
        let merged = match transformed.column(column.name()) {
            Ok(replacement) => scatter(
                column.as_materialized_series(),
                replacement.as_materialized_series(),
                selection,
            )?,
            Err(_) => column.as_materialized_series().clone(),
        };
        columns.push(merged.into_column());
    }

    for column in transformed.get_columns() {
        if original.column(column.name()).is_ok() {
            continue;
        }
        let base = Series::full_null(column.name().clone(), height, column.dtype());
        columns.push(scatter(&base, column.as_materialized_series(), selection)?.into_column());
    }

    Ok(DataFrame::new(columns)?)
}

/// Replace `base[positions[k]]` with `replacement[k]`.
fn scatter(base: &Series, replacement: &Series, selection: &Selection) -> Result<Series> {
    if selection.is_empty() {
        return Ok(base.clone());
    }

    let dtype = common_dtype(base.dtype(), replacement.dtype());
    let mut combined = base.cast(&dtype)?;
    combined.append(&replacement.cast(&dtype)?.with_name(base.name().clone()))?;

    let offset = base.len() as IdxSize;
    let mut indices: Vec<IdxSize> = (0..offset).collect();
    for (k, &position) in selection.positions.iter().enumerate() {
        indices[position as usize] = offset + k as IdxSize;
    }
    let take = IdxCa::from_vec(PlSmallStr::EMPTY, indices);
    Ok(combined.take(&take)?)
}

fn common_dtype(left: &DataType, right: &DataType) -> DataType {
    if left == right || right == &DataType::Null {
        left.clone()
    } else if left == &DataType::Null {
        right.clone()
    } else if left.is_integer() && right.is_integer() {
        DataType::Int64
    } else if is_number(left) && is_number(right) {
        DataType::Float64
    } else {
        DataType::String
    }
}

fn is_number(dtype: &DataType) -> bool {
    dtype.is_integer() || dtype.is_float()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> DataFrame {
        df! {
            "age" => &[20i64, 30, 40],
            "v" => &[1i64, 2, 3],
        }
        .unwrap()
    }

    #[test]
    fn selects_matching_positions() {
        let filter = RowFilter::parse("age > 25", None).unwrap();
        let (filtered, selection) = apply_filter(&people(), &filter).unwrap();
        assert_eq!(selection.positions(), &[1, 2]);
        assert_eq!(filtered.height(), 2);
    }

    #[test]
    fn missing_column_is_an_error() {
        let filter = RowFilter::parse("salary > 25", None).unwrap();
        let err = apply_filter(&people(), &filter).unwrap_err();
        assert!(err.to_string().contains("'salary'"));
    }

    #[test]
    fn literal_condition_broadcasts() {
        let filter = RowFilter::parse("1 == 1", None).unwrap();
        let (_, selection) = apply_filter(&people(), &filter).unwrap();
        assert_eq!(selection.len(), 3);
    }

    #[test]
    fn changed_dtype_widens_to_string() {
        let original = df! { "id" => &["a", "b", "c"] }.unwrap();
        let filter = RowFilter::parse("id == 'b'", None).unwrap();
        let (_, selection) = apply_filter(&original, &filter).unwrap();
        let transformed = df! { "id" => &[7i64] }.unwrap();

        let merged = undo_filter(&original, transformed, &selection).unwrap();
        let ids: Vec<_> = merged.column("id").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(ids, vec![Some("a"), Some("7"), Some("c")]);
    }

    #[test]
    fn integer_widths_merge_to_int64() {
        assert_eq!(common_dtype(&DataType::Int32, &DataType::Int64), DataType::Int64);
        assert_eq!(common_dtype(&DataType::Int32, &DataType::Float32), DataType::Float64);
        assert_eq!(common_dtype(&DataType::Date, &DataType::String), DataType::String);
    }
}
