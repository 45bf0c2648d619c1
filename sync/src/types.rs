/// Identifies a remote endpoint. The application assigns these when peers
/// connect and keeps them stable for the life of the connection.
pub type PeerId = u64;

/// Identifies one stored snapshot within a tracker's history. Allocated
/// sequentially starting at 1; 0 is reserved for "no baseline", meaning the
/// zero value of the tracked type.
pub type SyncId = u64;
