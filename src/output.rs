use std::io::{IsTerminal, Write};

/// Where command modules send everything the user reads.
///
/// Human-oriented messages go through the level methods and are dropped by
/// `--quiet`; [`UserOutput::data`] carries machine-readable results (JSON
/// listings) and is always written.
pub trait UserOutput: Send + Sync {
    fn status(&self, message: &str);
    fn success(&self, message: &str);
    /// Printed to stderr with a `Warning:` prefix.
    fn warning(&self, message: &str);
    fn error(&self, message: &str);

    /// Start a doctor-style check line; `finish_progress` completes it.
    fn progress(&self, message: &str);
    fn finish_progress(&self, result: &str);

    fn table(&self, table: &Table);
    fn data(&self, text: &str);
    fn blank(&self);
}

/// Column-aligned rows, e.g. the service listing.
#[derive(Debug, Clone)]
pub struct Table {
    headers: Vec<&'static str>,
    right: Vec<bool>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            right: vec![false; headers.len()],
            rows: Vec::new(),
        }
    }

    /// Right-align column `index` (numbers).
    pub fn align_right(mut self, index: usize) -> Self {
        if let Some(flag) = self.right.get_mut(index) {
            *flag = true;
        }
        self
    }

    pub fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header line followed by one line per row. The last column is never
    /// padded, so long commands do not drag trailing spaces along.
    pub fn lines(&self) -> Vec<String> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.len()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let last = self.headers.len().saturating_sub(1);
        let render = |cells: Vec<&str>| {
            cells
                .iter()
                .enumerate()
                .map(|(i, cell)| match (i == last, self.right[i]) {
                    (true, false) => cell.to_string(),
                    (_, true) => format!("{:>width$}", cell, width = widths[i]),
                    (false, false) => format!("{:<width$}", cell, width = widths[i]),
                })
                .collect::<Vec<_>>()
                .join("  ")
        };

        let mut lines = vec![render(self.headers.clone())];
        for row in &self.rows {
            lines.push(render(row.iter().map(String::as_str).collect()));
        }
        lines
    }
}

/// Terminal output. Colors are used only when the stream is a terminal and
/// `NO_COLOR` is unset.
pub struct CliOutput {
    color_stdout: bool,
    color_stderr: bool,
}

impl CliOutput {
    pub fn detect() -> Self {
        let allowed = std::env::var_os("NO_COLOR").is_none();
        Self {
            color_stdout: allowed && std::io::stdout().is_terminal(),
            color_stderr: allowed && std::io::stderr().is_terminal(),
        }
    }

    fn paint(enabled: bool, code: &str, text: &str) -> String {
        if enabled {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    }
}

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("{}", Self::paint(self.color_stdout, "32", message));
    }

    fn warning(&self, message: &str) {
        eprintln!("{} {}", Self::paint(self.color_stderr, "33", "Warning:"), message);
    }

    fn error(&self, message: &str) {
        eprintln!("{}", Self::paint(self.color_stderr, "31", message));
    }

    fn progress(&self, message: &str) {
        print!("{}", message);
        std::io::stdout().flush().ok();
    }

    fn finish_progress(&self, result: &str) {
        println!("{}", result);
    }

    fn table(&self, table: &Table) {
        let mut lines = table.lines().into_iter();
        if let Some(header) = lines.next() {
            println!("{}", Self::paint(self.color_stdout, "1", &header));
        }
        for line in lines {
            println!("{}", line);
        }
    }

    fn data(&self, text: &str) {
        println!("{}", text);
    }

    fn blank(&self) {
        println!();
    }
}

/// `--quiet`: errors and machine-readable data only.
pub struct QuietOutput;

impl UserOutput for QuietOutput {
    fn status(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, message: &str) {
        eprintln!("{}", message);
    }
    fn progress(&self, _message: &str) {}
    fn finish_progress(&self, _result: &str) {}
    fn table(&self, _table: &Table) {}
    fn data(&self, text: &str) {
        println!("{}", text);
    }
    fn blank(&self) {}
}
