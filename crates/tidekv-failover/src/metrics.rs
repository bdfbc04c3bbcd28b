//! Observability snapshot for a failover table.

use crate::entry::FailoverEntry;

/// Point-in-time view of a failover table, as exposed on the stats
/// surface.
#[derive(Debug, Clone)]
pub struct FailoverTableStats {
    /// Number of entries currently held.
    pub num_entries: usize,
    /// Entries dropped by sanitisation over the table's lifetime.
    pub num_erroneous_entries_erased: u64,
    /// The entries themselves, newest first.
    pub entries: Vec<FailoverEntry>,
}
