//! CSV output sink

use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::accumulator::{AddressAccumulator, AddressRecord};
use crate::error::Result;

pub const CSV_HEADER: [&str; 2] = ["Name", "Email"];

/// Rows to write, ordered by email
///
/// With `one_row_per_email` every email appears once (strictly ascending);
/// otherwise every distinct pair is written, ordered by email then name.
pub fn rows(addresses: &AddressAccumulator, one_row_per_email: bool) -> Vec<AddressRecord> {
    if one_row_per_email {
        addresses.one_per_email()
    } else {
        addresses.sorted().into_iter().cloned().collect()
    }
}

/// Write `Name,Email` rows to any writer, `\n` after every row
pub fn write_csv<W: Write>(writer: W, rows: &[AddressRecord]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    wtr.write_record(CSV_HEADER)?;
    for row in rows {
        wtr.write_record([row.name(), row.email()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the accumulator to `path`, returning the number of rows written
pub fn export_to_path(
    addresses: &AddressAccumulator,
    path: &Path,
    one_row_per_email: bool,
) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let rows = rows(addresses, one_row_per_email);
    let file = std::fs::File::create(path)?;
    write_csv(std::io::BufWriter::new(file), &rows)?;

    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(rows.len())
}

/// Where a failed run's partial results go: `emails.csv` becomes `emails.partial.csv`
pub fn partial_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "emails".to_string());
    let file_name = match path.extension() {
        Some(ext) => format!("{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!("{}.partial.csv", stem),
    };
    path.with_file_name(file_name)
}
