mod session_table;

pub use session_table::SessionTable;
