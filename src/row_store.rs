use crate::value::Value;

/// One fetched row: a value per column, in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

/// Fetched rows, kept as the chunks they arrived in.
///
/// Rows are addressed by 1-based index. Chunks are concatenated in
/// arrival order starting at `first_index`, which is 1 for a client-side
/// cache and the window start for a server-side cursor. Chunks are never
/// removed individually; `clear` and `reset_at` drop all of them.
#[derive(Debug)]
pub struct RowStore {
    chunks: Vec<Vec<Row>>,
    first_index: i64,
    rows: usize,
}

impl Default for RowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RowStore {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            first_index: 1,
            rows: 0,
        }
    }

    pub fn with_capacity(chunks: usize) -> Self {
        Self {
            chunks: Vec::with_capacity(chunks),
            first_index: 1,
            rows: 0,
        }
    }

    /// Append a chunk after the last stored row. Empty chunks are ignored.
    pub fn append(&mut self, chunk: Vec<Row>) {
        if chunk.is_empty() {
            return;
        }
        self.rows += chunk.len();
        self.chunks.push(chunk);
    }

    /// Row at 1-based `index`, or `None` when no stored chunk covers it.
    pub fn row_at(&self, index: i64) -> Option<&Row> {
        if index < self.first_index {
            return None;
        }
        let mut offset = (index - self.first_index) as usize;
        if offset >= self.rows {
            return None;
        }
        for chunk in &self.chunks {
            if offset < chunk.len() {
                return chunk.get(offset);
            }
            offset -= chunk.len();
        }
        None
    }

    /// Drop every chunk.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.rows = 0;
        self.first_index = 1;
    }

    /// Drop every chunk and address the next appended row as `first_index`.
    pub fn reset_at(&mut self, first_index: i64) {
        self.chunks.clear();
        self.rows = 0;
        self.first_index = first_index;
    }

    pub fn first_index(&self) -> i64 {
        self.first_index
    }

    /// Index of the last stored row, or `first_index - 1` when empty.
    pub fn last_index(&self) -> i64 {
        self.first_index + self.rows as i64 - 1
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(range: std::ops::Range<i32>) -> Vec<Row> {
        range.map(|i| Row::new(vec![Value::Integer(i)])).collect()
    }

    #[test]
    fn addresses_across_chunks() {
        let mut store = RowStore::new();
        store.append(rows(1..3));
        store.append(rows(3..4));
        store.append(rows(4..8));
        assert_eq!(store.len(), 7);
        assert_eq!(store.chunk_count(), 3);
        for i in 1..=7 {
            let row = store.row_at(i).unwrap();
            assert_eq!(row.get(0), Some(&Value::Integer(i as i32)));
        }
    }

    #[test]
    fn out_of_range_is_none_not_error() {
        let mut store = RowStore::new();
        store.append(rows(1..3));
        assert!(store.row_at(0).is_none());
        assert!(store.row_at(-4).is_none());
        assert!(store.row_at(3).is_none());
    }

    #[test]
    fn empty_chunks_are_skipped() {
        let mut store = RowStore::new();
        store.append(Vec::new());
        assert!(store.is_empty());
        assert_eq!(store.chunk_count(), 0);
        assert_eq!(store.last_index(), 0);
    }

    #[test]
    fn reset_at_rebases_addresses() {
        let mut store = RowStore::new();
        store.append(rows(1..4));
        store.reset_at(10);
        store.append(rows(100..102));
        assert!(store.row_at(1).is_none());
        assert_eq!(store.row_at(10).unwrap().get(0), Some(&Value::Integer(100)));
        assert_eq!(store.row_at(11).unwrap().get(0), Some(&Value::Integer(101)));
        assert_eq!(store.last_index(), 11);
    }

    #[test]
    fn clear_drops_everything() {
        let mut store = RowStore::new();
        store.append(rows(1..4));
        store.clear();
        assert!(store.is_empty());
        assert!(store.row_at(1).is_none());
        assert_eq!(store.first_index(), 1);
    }
}
