//! Per-session UI state: the cached table list and the active table handle.

use crate::connector::TableSource;

/// State owned by one interactive session.
///
/// The table list is fetched once when the session is created and cached for
/// its lifetime. At most one handle is active at a time; selecting a table
/// replaces the previous handle. Each session owns its own context, so
/// nothing is shared across concurrent users.
pub struct SessionContext {
    tables: Vec<String>,
    source: Option<Box<dyn TableSource>>,
}

impl SessionContext {
    pub fn new(tables: Vec<String>) -> Self {
        Self {
            tables,
            source: None,
        }
    }

    /// Cached table names, in catalog order.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t == name)
    }

    /// Make `source` the active handle, discarding any previous one.
    pub fn select(&mut self, source: Box<dyn TableSource>) {
        self.source = Some(source);
    }

    pub fn clear_selection(&mut self) {
        self.source = None;
    }

    pub fn source(&self) -> Option<&dyn TableSource> {
        self.source.as_deref()
    }

    pub fn selected_table(&self) -> Option<&str> {
        self.source.as_deref().map(|s| s.table())
    }
}
