use crate::cli::FormatsArgs;
use crate::config::PartialConversionConfig;
use crate::error::Result;
use evoworks::core::models::format::{PlateFormat, WellOrdering};
use tracing::info;

pub fn run(args: FormatsArgs) -> Result<()> {
    let catalog = PartialConversionConfig::load(args.config.as_deref())?.format_catalog()?;
    info!("Listing {} plate format(s).", catalog.len());

    println!("{:<12} {:>5} {:>8} {:>6}  ORDERING", "FORMAT", "ROWS", "COLUMNS", "WELLS");
    for format in catalog.iter() {
        println!("{}", describe(format));
    }
    Ok(())
}

fn describe(format: &PlateFormat) -> String {
    let ordering = match format.ordering() {
        WellOrdering::ColumnMajor => "column-major",
        WellOrdering::RowMajor => "row-major",
    };
    format!(
        "{:<12} {:>5} {:>8} {:>6}  {}",
        format.id(),
        format.rows(),
        format.columns(),
        format.well_count(),
        ordering
    )
}
