/// Which scorer implementation is serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerMode {
    /// A GGUF model is loaded.
    Model,
    /// Deterministic synthetic hidden states.
    Stub,
    /// Test double.
    Mock,
}

impl ScorerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScorerMode::Model => "model",
            ScorerMode::Stub => "stub",
            ScorerMode::Mock => "mock",
        }
    }
}

impl std::fmt::Display for ScorerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
