use std::fmt;

/// Contiguous row range of one table, fetched in a single request.
/// Both ends are inclusive, matching the `rows/{start}:{end}` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Window {
    pub table: String,
    pub start: u64,
    pub end: u64,
    /// Position within the table, writes are applied in this order.
    pub seq: usize,
}

impl Window {
    pub fn row_span(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[#{} {}:{}]", self.table, self.seq, self.start, self.end)
    }
}

/// Splits `0..row_count` into windows of at most `max_window` rows.
/// An empty table gets no windows at all.
pub fn plan_windows(table: &str, row_count: u64, max_window: u64) -> Vec<Window> {
    let max_window = max_window.max(1);
    let mut windows = Vec::new();

    let mut start = 0;
    while start < row_count {
        let end = start.saturating_add(max_window).min(row_count) - 1;
        let seq = windows.len();
        windows.push(Window {
            table: table.to_string(),
            start,
            end,
            seq,
        });
        start = end + 1;
    }
    windows
}
