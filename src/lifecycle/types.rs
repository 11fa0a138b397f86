#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationResult {
    Success { restored: usize, skipped: usize },
    NotFound,
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DehydrationResult {
    Success { entries: usize, bytes: u64 },
    Skipped { reason: String },
}
