use crate::coverage::ProbeStyle;

/// Configuration for coverage instrumentation.
///
/// Controls which probes are placed and how a method is adjusted to carry them. The default
/// places every requested probe, skips methods that already carry them and reserves two
/// extra stack slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentationConfig {
    /// Place statement probes
    pub sequence_points: bool,

    /// Place branch path probes
    pub branch_points: bool,

    /// Leave a method untouched if its first statement probe is already present, which makes
    /// recompilation idempotent
    pub skip_instrumented: bool,

    /// Added to the method's maximum stack depth once probes are placed
    pub extra_max_stack: u16,

    /// Probe shape requested from the host
    pub probe: ProbeStyle,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            sequence_points: true,
            branch_points: true,
            skip_instrumented: true,
            extra_max_stack: 2,
            probe: ProbeStyle::Managed,
        }
    }
}

impl InstrumentationConfig {
    /// Statement coverage only.
    #[must_use]
    pub fn sequence_only() -> Self {
        Self {
            branch_points: false,
            ..Self::default()
        }
    }

    /// Enables or disables statement probes.
    #[must_use]
    pub fn with_sequence_points(mut self, enabled: bool) -> Self {
        self.sequence_points = enabled;
        self
    }

    /// Enables or disables branch probes.
    #[must_use]
    pub fn with_branch_points(mut self, enabled: bool) -> Self {
        self.branch_points = enabled;
        self
    }

    /// Enables or disables the already-instrumented check.
    #[must_use]
    pub fn with_skip_instrumented(mut self, enabled: bool) -> Self {
        self.skip_instrumented = enabled;
        self
    }

    /// Sets the extra stack depth reserved for probes.
    #[must_use]
    pub fn with_extra_max_stack(mut self, extra: u16) -> Self {
        self.extra_max_stack = extra;
        self
    }

    /// Selects the probe shape.
    #[must_use]
    pub fn with_probe(mut self, probe: ProbeStyle) -> Self {
        self.probe = probe;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::PointerWidth;

    #[test]
    fn defaults_and_builders() {
        let config = InstrumentationConfig::default();
        assert!(config.sequence_points && config.branch_points && config.skip_instrumented);
        assert_eq!(config.extra_max_stack, 2);

        let config = InstrumentationConfig::sequence_only()
            .with_skip_instrumented(false)
            .with_extra_max_stack(3)
            .with_probe(ProbeStyle::Unmanaged(PointerWidth::Bits32));
        assert!(!config.branch_points);
        assert!(!config.skip_instrumented);
        assert_eq!(config.extra_max_stack, 3);
        assert_eq!(config.probe, ProbeStyle::Unmanaged(PointerWidth::Bits32));
    }
}
