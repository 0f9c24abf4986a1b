use csv::WriterBuilder;

use crate::store::Table;

pub const CSV_FILE_NAME: &str = "bayi_anketi_sonuclari.csv";
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
pub const CSV_DISPOSITION: &str = "attachment; filename=\"bayi_anketi_sonuclari.csv\"";

/// UTF-8 CSV of the whole table, header row first.
pub fn to_csv(table: &Table) -> Result<Vec<u8>, csv::Error> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());

    writer.write_record(&table.header)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }

    writer.into_inner().map_err(|e| e.into_error().into())
}
