/// Direction preference for colored Jacobian sweeps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SweepMode {
    /// Column coloring, forward sweeps only.
    Forward,
    /// Row coloring, adjoint sweeps only.
    Adjoint,
    /// Heavy rows by adjoint sweeps, the rest by forward sweeps.
    Bidirectional,
    /// Cheapest of the three; ties prefer forward, then adjoint.
    #[default]
    Auto,
}

/// Options fixed when a function is compiled.
///
/// # Example
///
/// ```
/// use mxtape::{CompileConfig, SweepMode};
///
/// let config = CompileConfig::default()
///     .max_directions(4)
///     .mode(SweepMode::Forward);
/// assert_eq!(config.max_directions, 4);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompileConfig {
    /// Use the liveness-compacted work layout when no adjoints are requested.
    pub reuse_work: bool,
    /// Maximum number of seed directions batched into one sweep by
    /// `jacobian` and `hessian`.
    pub max_directions: usize,
    /// Fail with [`Error::Numeric`](crate::Error::Numeric) on non-finite values.
    pub check_finite: bool,
    /// Jacobian direction preference.
    pub mode: SweepMode,
}

impl Default for CompileConfig {
    fn default() -> Self {
        CompileConfig {
            reuse_work: true,
            max_directions: 8,
            check_finite: true,
            mode: SweepMode::Auto,
        }
    }
}

impl CompileConfig {
    /// Set [`reuse_work`](Self::reuse_work).
    pub fn reuse_work(mut self, on: bool) -> Self {
        self.reuse_work = on;
        self
    }

    /// Set [`max_directions`](Self::max_directions), clamped to at least 1.
    pub fn max_directions(mut self, n: usize) -> Self {
        self.max_directions = n.max(1);
        self
    }

    /// Set [`check_finite`](Self::check_finite).
    pub fn check_finite(mut self, on: bool) -> Self {
        self.check_finite = on;
        self
    }

    /// Set the Jacobian [`SweepMode`].
    pub fn mode(mut self, mode: SweepMode) -> Self {
        self.mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_chain() {
        let config = CompileConfig::default()
            .reuse_work(false)
            .check_finite(false)
            .max_directions(0)
            .mode(SweepMode::Adjoint);
        assert!(!config.reuse_work);
        assert!(!config.check_finite);
        assert_eq!(config.max_directions, 1);
        assert_eq!(config.mode, SweepMode::Adjoint);
    }
}
