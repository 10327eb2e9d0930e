//! Per-session command history.
//!
//! Entries are append-only. The cursor ranges over `0..=len`, where `len`
//! means "no selection" and recalls an empty line. Moving past either end
//! saturates.

#[derive(Debug, Default, Clone)]
pub struct History {
    entries: Vec<String>,
    cursor: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an executed command and reset the cursor past the end.
    pub fn append(&mut self, command: impl Into<String>) {
        self.entries.push(command.into());
        self.cursor = self.entries.len();
    }

    /// Step toward older entries and return the selected command.
    pub fn previous(&mut self) -> &str {
        self.cursor = self.cursor.saturating_sub(1);
        self.current()
    }

    /// Step toward newer entries; past the newest yields an empty line.
    pub fn next(&mut self) -> &str {
        if self.cursor < self.entries.len() {
            self.cursor += 1;
        }
        self.current()
    }

    /// Command under the cursor, or `""` when nothing is selected.
    pub fn current(&self) -> &str {
        self.entries.get(self.cursor).map(String::as_str).unwrap_or("")
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> History {
        let mut h = History::new();
        h.append("a");
        h.append("b");
        h.append("c");
        h
    }

    #[test]
    fn empty_history_recalls_nothing() {
        let mut h = History::new();
        assert_eq!(h.previous(), "");
        assert_eq!(h.next(), "");
        assert_eq!(h.cursor(), 0);
    }

    #[test]
    fn previous_walks_backward() {
        let mut h = abc();
        assert_eq!(h.previous(), "c");
        assert_eq!(h.previous(), "b");
        assert_eq!(h.previous(), "a");
    }

    #[test]
    fn previous_saturates_on_first() {
        let mut h = abc();
        for _ in 0..10 {
            h.previous();
        }
        assert_eq!(h.current(), "a");
        assert_eq!(h.cursor(), 0);
    }

    #[test]
    fn next_after_two_previous_lands_on_newest() {
        let mut h = abc();
        h.previous();
        h.previous();
        assert_eq!(h.next(), "c");
    }

    #[test]
    fn next_after_reaching_oldest() {
        let mut h = abc();
        h.previous();
        h.previous();
        h.previous();
        assert_eq!(h.next(), "b");
    }

    #[test]
    fn next_saturates_on_no_selection() {
        let mut h = abc();
        h.previous();
        assert_eq!(h.next(), "");
        assert_eq!(h.next(), "");
        assert_eq!(h.cursor(), 3);
    }

    #[test]
    fn append_resets_cursor() {
        let mut h = abc();
        h.previous();
        h.previous();
        h.append("d");
        assert_eq!(h.cursor(), 4);
        assert_eq!(h.previous(), "d");
        assert_eq!(h.len(), 4);
    }
}
