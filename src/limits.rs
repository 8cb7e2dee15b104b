/// Max byte length of an occupant label.
pub const MAX_LABEL_LEN: usize = 256;

/// Max number of days a range query may cover (inclusive).
pub const MAX_RANGE_DAYS: i64 = 366;

/// Default bound on waiting for a slot lock.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2_000;

/// Default number of WAL appends between compactions.
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1_000;

/// Capacity of the journal writer's command channel.
pub const WAL_CHANNEL_CAPACITY: usize = 4096;
