use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ColumnConstraint, ContentArrangement, Table, Width,
};

use deid_cli::RunOutcome;
use deid_model::{TableResult, TableStatus};
use deid_transform::TransformerRegistry;

pub fn print_summary(name: &str, outcome: &RunOutcome, dry_run: bool) {
    println!("Run: {name}");
    if dry_run {
        println!("Dry run: nothing was written");
    } else {
        println!("Output: {}", outcome.output_dir.display());
    }
    if !outcome.mapping_files.is_empty() {
        println!("Mapping files: {}", outcome.mapping_files.len());
    }
    if let Some(path) = &outcome.status_file {
        println!("Status: {}", path.display());
    }

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Status"),
        header_cell("Rows"),
        header_cell("Error"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    align_column(&mut table, 2, CellAlignment::Right);

    let mut total_rows = 0usize;
    for name in &outcome.result.execution_order {
        let Some(result) = outcome.result.results.get(name) else {
            table.add_row(vec![
                Cell::new(name),
                dim_cell("not run"),
                dim_cell("-"),
                dim_cell("-"),
            ]);
            continue;
        };
        total_rows += result.rows.unwrap_or(0);
        table.add_row(vec![
            Cell::new(name).fg(Color::Blue).add_attribute(Attribute::Bold),
            status_cell(result.status),
            rows_cell(result),
            error_cell(result.error.as_deref()),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        overall_cell(outcome.result.success),
        Cell::new(total_rows).add_attribute(Attribute::Bold),
        dim_cell("-"),
    ]);
    println!("{table}");
}

pub fn print_kinds(registry: &TransformerRegistry) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Kind"),
        header_cell("Filter / cast"),
        header_cell("Description"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    for factory in registry.factories() {
        let scoped = if factory.supports_row_scope() {
            Cell::new("✓").fg(Color::Green)
        } else {
            dim_cell("-")
        };
        table.add_row(vec![
            Cell::new(factory.kind()).add_attribute(Attribute::Bold),
            scoped,
            Cell::new(factory.description()),
        ]);
    }
    println!("{table}");
}

fn status_cell(status: TableStatus) -> Cell {
    match status {
        TableStatus::Success => Cell::new("OK").fg(Color::Green),
        TableStatus::Error => Cell::new("ERROR")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        TableStatus::Skipped => Cell::new("SKIPPED").fg(Color::Yellow),
    }
}

fn overall_cell(success: bool) -> Cell {
    if success {
        Cell::new("OK")
            .fg(Color::Green)
            .add_attribute(Attribute::Bold)
    } else {
        Cell::new("FAILED")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold)
    }
}

fn rows_cell(result: &TableResult) -> Cell {
    match result.rows {
        Some(rows) => Cell::new(rows),
        None => dim_cell("-"),
    }
}

fn error_cell(error: Option<&str>) -> Cell {
    match error {
        Some(message) => Cell::new(message).fg(Color::Red),
        None => dim_cell("-"),
    }
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(140);
    if table.column_count() >= 4 {
        table.set_constraints(vec![
            ColumnConstraint::UpperBoundary(Width::Percentage(25)),
            ColumnConstraint::LowerBoundary(Width::Fixed(9)),
            ColumnConstraint::LowerBoundary(Width::Fixed(6)),
            ColumnConstraint::UpperBoundary(Width::Percentage(60)),
        ]);
    }
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
