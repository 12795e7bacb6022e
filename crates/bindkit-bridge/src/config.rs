//! Bridge Configuration

/// Bridge configuration options
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Reject calls whose argument count differs from the declared arity
    pub strict_arity: bool,

    /// Upper bound on superclass and base-table walks
    pub max_class_depth: usize,

    /// Log every native method call at trace level
    pub trace_calls: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            strict_arity: true,
            max_class_depth: 64,
            trace_calls: false,
        }
    }
}

impl BridgeConfig {
    /// Accept extra trailing arguments instead of failing the call
    pub fn lenient() -> Self {
        Self {
            strict_arity: false,
            ..Self::default()
        }
    }

    /// Check an argument count against a declared arity
    pub fn arity_ok(&self, declared: usize, got: usize) -> bool {
        if self.strict_arity {
            got == declared
        } else {
            got >= declared
        }
    }
}
