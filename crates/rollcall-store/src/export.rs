//! Attendance export to CSV, JSON and Excel workbooks.

use crate::error::StoreResult;
use crate::models::AttendanceRecord;
use crate::store::{DATE_FORMAT, TIME_FORMAT};
use csv::Writer;
use rust_xlsxwriter::{Format, FormatBorder, Workbook};
use std::io::Write;
use std::str::FromStr;

/// Column order shared by the tabular formats.
pub const HEADERS: [&str; 8] = [
    "student_id",
    "name",
    "date",
    "time",
    "status",
    "confidence",
    "late_minutes",
    "session_id",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Xlsx,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(format!("unsupported export format: {other}")),
        }
    }
}

pub fn write_records<W: Write>(out: W, records: &[AttendanceRecord], format: ExportFormat) -> StoreResult<()> {
    match format {
        ExportFormat::Csv => write_csv(out, records),
        ExportFormat::Json => write_json(out, records),
        ExportFormat::Xlsx => write_xlsx(out, records),
    }
}

/// One record as text cells in [`HEADERS`] order.
pub fn record_row(rec: &AttendanceRecord) -> [String; 8] {
    [
        rec.student_id.clone(),
        rec.name.clone(),
        rec.date.format(DATE_FORMAT).to_string(),
        rec.time.format(TIME_FORMAT).to_string(),
        rec.status.as_str().to_string(),
        rec.confidence.map(|c| format!("{c:.3}")).unwrap_or_default(),
        rec.late_minutes.to_string(),
        rec.session_id.clone().unwrap_or_default(),
    ]
}

/// One header row, then one row per record.
pub fn write_csv<W: Write>(out: W, records: &[AttendanceRecord]) -> StoreResult<()> {
    let mut wtr = Writer::from_writer(out);
    wtr.write_record(HEADERS)?;

    for rec in records {
        wtr.write_record(&record_row(rec))?;
    }

    wtr.flush()?;
    Ok(())
}

/// Single-sheet workbook: bold frozen header, numeric confidence and
/// late minutes, text everywhere else.
pub fn build_workbook(records: &[AttendanceRecord]) -> StoreResult<Workbook> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Attendance")?;

    let header_format = Format::new().set_bold().set_border(FormatBorder::Thin);
    let mut widths: Vec<usize> = HEADERS.iter().map(|h| h.len()).collect();

    for (col, header) in HEADERS.iter().enumerate() {
        worksheet.write_with_format(0, col as u16, *header, &header_format)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    for (index, rec) in records.iter().enumerate() {
        let row = index as u32 + 1;
        let cells = record_row(rec);
        for (col, cell) in cells.iter().enumerate() {
            let col16 = col as u16;
            match col {
                5 => {
                    if let Some(c) = rec.confidence {
                        worksheet.write(row, col16, f64::from(c))?;
                    }
                }
                6 => {
                    worksheet.write(row, col16, rec.late_minutes as f64)?;
                }
                _ => {
                    worksheet.write(row, col16, cell.as_str())?;
                }
            }
            widths[col] = widths[col].max(cell.chars().count());
        }
    }

    for (col, width) in widths.iter().enumerate() {
        worksheet.set_column_width(col as u16, *width as f64 + 2.0)?;
    }

    Ok(workbook)
}

pub fn write_xlsx<W: Write>(mut out: W, records: &[AttendanceRecord]) -> StoreResult<()> {
    let mut workbook = build_workbook(records)?;
    out.write_all(&workbook.save_to_buffer()?)?;
    out.flush()?;
    Ok(())
}

pub fn write_json<W: Write>(mut out: W, records: &[AttendanceRecord]) -> StoreResult<()> {
    serde_json::to_writer_pretty(&mut out, records)?;
    writeln!(out)?;
    Ok(())
}
