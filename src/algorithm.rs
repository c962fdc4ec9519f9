//! Algorithm dispatch: a closed tagged enum, matched exhaustively by
//! the facade. There is no dynamic dispatch and no per-algorithm
//! helper type — the facade speaks directly to the store and scripts.

/// Which rate-limiting algorithm governs a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmTag {
    /// Simple counter reset at aligned window boundaries.
    Fixed,
    /// Smoothly refilling token bucket; allows bursts up to capacity.
    Bucket,
    /// Weighted blend of the current and previous aligned windows.
    Sliding,
}

impl AlgorithmTag {
    /// The literal suffix this algorithm contributes to a composed key.
    pub fn key_suffix(&self) -> &'static str {
        match self {
            AlgorithmTag::Fixed => "", // fixed window supplies its own window-start suffix
            AlgorithmTag::Bucket => "bucket",
            AlgorithmTag::Sliding => "sliding",
        }
    }

    /// Parse the `"fixed" | "bucket" | "sliding"` algorithm tag used by
    /// `reset(..., algorithm = ...)`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(AlgorithmTag::Fixed),
            "bucket" => Some(AlgorithmTag::Bucket),
            "sliding" => Some(AlgorithmTag::Sliding),
            _ => None,
        }
    }
}
