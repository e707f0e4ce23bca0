pub mod memory;
pub mod mssql;

use crate::error::Result;
use crate::operation::ServerOperation;
use crate::registry::StatementRegistry;
use crate::transport::Transport;

pub use memory::MemoryProvider;
pub use mssql::MssqlProvider;

/// Per-database behavior behind a connection.
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open a new session with the database.
    fn open_connection(&self) -> Result<Box<dyn Transport>>;

    /// Render a DDL operation in the provider's dialect.
    fn render_operation(&self, op: &ServerOperation) -> Result<String>;

    /// Statements used for schema queries.
    fn statements(&self) -> &StatementRegistry;
}
