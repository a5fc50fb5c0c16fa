//! Table files: the header of the first window followed by the data lines of every
//! window in sequence order.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::plan::Window;
use crate::Result;

/// Raw delimited text of one window, first line is the header.
///
/// The bytes are written as received, line endings and blank lines inside quoted
/// fields included. Only the line breaks around the data are dropped, and one
/// terminator (the header's own) is put back so windows never run together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    text: String,
}

fn is_line_break(c: char) -> bool {
    c == '\r' || c == '\n'
}

impl Payload {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Header line including its terminator, and everything after it.
    fn split(&self) -> (&str, &str) {
        match self.text.find('\n') {
            Some(idx) => self.text.split_at(idx + 1),
            None => (self.text.as_str(), ""),
        }
    }

    pub fn header(&self) -> Option<&str> {
        let header = self.split().0.trim_end_matches(is_line_break);
        (!header.trim().is_empty()).then_some(header)
    }

    /// Data after the header line, untouched apart from surrounding line breaks.
    pub fn body(&self) -> &str {
        self.split().1.trim_matches(is_line_break)
    }

    /// Non blank lines of the body, used to check a window came back complete.
    pub fn data_lines(&self) -> impl Iterator<Item = &str> {
        self.body().lines().filter(|line| !line.trim().is_empty())
    }

    pub fn data_line_count(&self) -> usize {
        self.data_lines().count()
    }

    fn line_ending(&self) -> &'static str {
        if self.split().0.ends_with("\r\n") {
            "\r\n"
        } else {
            "\n"
        }
    }

    fn render(&self, with_header: bool) -> String {
        let ending = self.line_ending();
        let mut out = String::with_capacity(self.text.len() + 2);
        if with_header {
            if let Some(header) = self.header() {
                out.push_str(header);
                out.push_str(ending);
            }
        }
        let body = self.body();
        if !body.is_empty() {
            out.push_str(body);
            out.push_str(ending);
        }
        out
    }
}

/// Result of writing one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenTable {
    pub table: String,
    pub path: PathBuf,
    pub windows: usize,
    pub rows: u64,
}

pub fn table_path(dir: &Path, table: &str, format: &str) -> PathBuf {
    dir.join(format!("{table}.{format}"))
}

/// Single writer for one table file. The first payload creates the file with its
/// header, every later one only contributes its data lines.
pub struct TableFile {
    table: String,
    path: PathBuf,
    writer: BufWriter<File>,
    windows: usize,
    rows: u64,
}

impl TableFile {
    /// Creates (or truncates) the file and writes the full first payload.
    pub async fn create(path: PathBuf, table: &str, first: &Payload) -> Result<Self> {
        let file = File::create(&path).await?;
        let mut table_file = Self {
            table: table.to_string(),
            path,
            writer: BufWriter::new(file),
            windows: 0,
            rows: 0,
        };
        table_file.write_payload(first, true).await?;
        Ok(table_file)
    }

    /// Appends the payload with its header stripped.
    pub async fn append(&mut self, payload: &Payload) -> Result<()> {
        self.write_payload(payload, false).await
    }

    async fn write_payload(&mut self, payload: &Payload, with_header: bool) -> Result<()> {
        self.writer
            .write_all(payload.render(with_header).as_bytes())
            .await?;
        self.windows += 1;
        self.rows += payload.data_line_count() as u64;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<WrittenTable> {
        self.writer.flush().await?;
        self.writer.get_mut().sync_all().await?;
        Ok(WrittenTable {
            table: self.table,
            path: self.path,
            windows: self.windows,
            rows: self.rows,
        })
    }
}

/// Writes all fetched windows of `table` in ascending sequence order, whatever order
/// they were fetched in. Returns `None` when there is nothing to write, no file is created.
pub async fn write_table(
    dir: &Path,
    table: &str,
    format: &str,
    mut parts: Vec<(Window, Payload)>,
) -> Result<Option<WrittenTable>> {
    parts.sort_by_key(|(window, _)| window.seq);

    let mut parts = parts.into_iter();
    let Some((_, first)) = parts.next() else {
        return Ok(None);
    };

    let mut file = TableFile::create(table_path(dir, table, format), table, &first).await?;
    for (_, payload) in parts {
        file.append(&payload).await?;
    }
    Ok(Some(file.finish().await?))
}
