// Generic formatting code for a set of data extracted from a data structure to be presented
// columnar or as csv, with or without a header.

use std::collections::{HashMap, HashSet};
use std::io;

/// Return a vector of the known fields in `spec` wrt the formatters, and a HashSet of any other
/// strings found in `spec`

pub fn parse_fields<'a, FmtT>(
    spec: &'a str,
    formatters: &HashMap<String, FmtT>,
) -> (Vec<&'a str>, HashSet<&'a str>) {
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if formatters.contains_key(x) {
            fields.push(x);
        } else {
            others.insert(x);
        }
    }
    (fields, others)
}

/// The `fields` are the names of formatting functions to get from the `formatters`, these are
/// applied to the `data`.  Set `header` to true to print a first row with field names as a header
/// (independent of csv).  Set `csv` to true to get CSV output instead of fixed-format.

pub fn format_data<DataT, FmtT>(
    output: &mut dyn io::Write,
    fields: &[&str],
    formatters: &HashMap<String, FmtT>,
    header: bool,
    csv: bool,
    data: &[DataT],
) -> io::Result<()>
where
    FmtT: Fn(&DataT) -> String,
{
    let fmts = fields
        .iter()
        .filter_map(|kwd| formatters.get(*kwd))
        .collect::<Vec<&FmtT>>();
    let rows = data
        .iter()
        .map(|x| fmts.iter().map(|f| f(x)).collect::<Vec<String>>())
        .collect::<Vec<Vec<String>>>();

    if csv {
        let mut writer = csv::WriterBuilder::new().from_writer(output);
        if header {
            writer.write_record(fields)?;
        }
        for row in &rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        return Ok(());
    }

    // The column width is the max across all the entries in the column (including header, if
    // present)
    let mut widths = vec![0; fields.len()];
    if header {
        for (i, kwd) in fields.iter().enumerate() {
            widths[i] = usize::max(widths[i], kwd.len());
        }
    }
    for row in &rows {
        for (i, col) in row.iter().enumerate() {
            widths[i] = usize::max(widths[i], col.len());
        }
    }

    if header {
        for (i, kwd) in fields.iter().enumerate() {
            let w = widths[i];
            write!(output, "{:w$}  ", kwd)?;
        }
        writeln!(output)?;
    }
    for row in &rows {
        for (i, col) in row.iter().enumerate() {
            let w = widths[i];
            write!(output, "{:w$}  ", col)?;
        }
        writeln!(output)?;
    }
    Ok(())
}
