//! Output formatting for command results.
//!
//! Results go to stdout as an aligned table or JSON. Errors go to stderr, in
//! the same format, so scripts can parse stdout without filtering.

use std::fmt;
use std::io::Write;

/// A single row in a table output.
pub type OutputRow = Vec<String>;

/// A table of output rows, the return type of command handlers.
pub type OutputTable = Vec<OutputRow>;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable column-aligned table output.
    #[default]
    Table,
    /// Machine-readable JSON output.
    Json,
}

/// Printer that formats and writes results and errors.
pub struct Printer<W: Write = Box<dyn Write>, E: Write = Box<dyn Write>> {
    stdout: W,
    stderr: E,
    format: OutputFormat,
}

impl Printer<Box<dyn Write>, Box<dyn Write>> {
    /// A printer on the process's stdout and stderr.
    pub fn stdio(format: OutputFormat) -> Self {
        Self {
            stdout: Box::new(std::io::stdout()),
            stderr: Box::new(std::io::stderr()),
            format,
        }
    }
}

impl<W: Write, E: Write> Printer<W, E> {
    pub fn new(stdout: W, stderr: E, format: OutputFormat) -> Self {
        Self {
            stdout,
            stderr,
            format,
        }
    }

    /// Print an error message to stderr.
    pub fn print_error(&mut self, err: &str) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Table => writeln!(self.stderr, "Error: {}", err),
            OutputFormat::Json => {
                let obj = serde_json::json!({ "error": err });
                writeln!(self.stderr, "{}", to_pretty(&obj)?)
            }
        }
    }

    /// Supplementary text for an error, such as usage help, on stderr.
    pub fn print_diagnostic(&mut self, text: &str) -> std::io::Result<()> {
        writeln!(self.stderr, "{}", text)
    }

    /// Print a pre-rendered document to stdout as is, whatever the format.
    pub fn print_raw(&mut self, text: &str) -> std::io::Result<()> {
        writeln!(self.stdout, "{}", text)
    }

    /// Print an output table.
    ///
    /// In table mode, columns are aligned with a two-space separator. In JSON
    /// mode a two-column table is read as key/value rows and becomes one
    /// object; a wider table's first row is a header and the rest become an
    /// array of objects keyed by it.
    pub fn print_table(&mut self, table: &OutputTable) -> std::io::Result<()> {
        if table.is_empty() {
            return Ok(());
        }

        match self.format {
            OutputFormat::Table => self.print_table_aligned(table),
            OutputFormat::Json => self.print_table_json(table),
        }
    }

    #[cfg(test)]
    pub(crate) fn into_parts(self) -> (W, E) {
        (self.stdout, self.stderr)
    }

    fn print_table_aligned(&mut self, table: &OutputTable) -> std::io::Result<()> {
        const SEPARATOR: &str = "  ";

        let mut widths: Vec<usize> = Vec::new();
        for row in table {
            if widths.len() < row.len() {
                widths.resize(row.len(), 0);
            }
            for (col, cell) in row.iter().enumerate() {
                widths[col] = widths[col].max(cell.chars().count() + SEPARATOR.len());
            }
        }

        for row in table {
            let mut line = String::new();
            for (col, cell) in row.iter().enumerate() {
                line.push_str(cell);
                if col + 1 < row.len() {
                    let padding = widths[col].saturating_sub(cell.chars().count());
                    line.extend(std::iter::repeat(' ').take(padding));
                }
            }
            writeln!(self.stdout, "{}", line.trim_end())?;
        }
        Ok(())
    }

    fn print_table_json(&mut self, table: &OutputTable) -> std::io::Result<()> {
        let json = if table.iter().all(|row| row.len() == 2) {
            let object: serde_json::Map<String, serde_json::Value> = table
                .iter()
                .map(|row| (row[0].clone(), serde_json::Value::String(row[1].clone())))
                .collect();
            to_pretty(&object)?
        } else if table.len() <= 1 {
            to_pretty(table)?
        } else {
            let headers = &table[0];
            let rows: Vec<serde_json::Map<String, serde_json::Value>> = table[1..]
                .iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .map(|(i, cell)| {
                            let key = headers.get(i).cloned().unwrap_or_else(|| format!("col_{}", i));
                            (key, serde_json::Value::String(cell.clone()))
                        })
                        .collect()
                })
                .collect();
            to_pretty(&rows)?
        };
        writeln!(self.stdout, "{}", json)
    }
}

fn to_pretty<T: serde::Serialize + ?Sized>(value: &T) -> std::io::Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}

impl<W: Write, E: Write> fmt::Debug for Printer<W, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Printer").field("format", &self.format).finish()
    }
}

/// Helper to create an output table with a header row.
pub fn table_with_header(headers: &[&str]) -> OutputTable {
    vec![headers.iter().map(|h| h.to_string()).collect()]
}

/// Helper to format a key-value pair as a two-column row.
pub fn kv_row(key: &str, value: impl fmt::Display) -> OutputRow {
    vec![key.to_string(), value.to_string()]
}
