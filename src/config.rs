//! User-tunable settings threaded through extraction and build calls.
//!
//! Nothing here is global: every extract/patch entry point takes the
//! relevant struct by reference so that two projects with different settings
//! can run side by side.

/// Soft byte-budget parameters for extracted strings.
///
/// `max_bytes = ceil(longest × safety_margin × arabic_multiplier)`, where
/// `longest` is the longest UTF-8 value observed in the column.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BudgetConfig {
    /// Headroom over the longest observed source value.
    pub safety_margin: f64,
    /// Expansion factor for the target script (Arabic presentation forms
    /// are three UTF-8 bytes where base letters are two).
    pub arabic_multiplier: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            safety_margin: 1.2,
            arabic_multiplier: 1.0,
        }
    }
}

impl BudgetConfig {
    /// Soft budget for a column whose longest value is `longest` bytes.
    pub fn max_bytes(&self, longest: usize) -> usize {
        let raw = longest as f64 * self.safety_margin * self.arabic_multiplier;
        // Absorb float noise such as 10 × 1.2 = 12.000000000000002.
        (raw - 1e-9).ceil().max(0.0) as usize
    }
}

/// Options for [`crate::formats::rtbl::patch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatchOptions {
    /// Put back control tags the translation lost and repair broken
    /// bracket pairs before writing.
    pub repair_tags: bool,
    /// Convert Arabic text to presentation forms in visual order.
    pub shape: bool,
    /// Fail on the first value that does not fit instead of skipping it.
    pub strict: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            repair_tags: true,
            shape: false,
            strict: false,
        }
    }
}

/// Options for [`crate::formats::sarc::pack`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PackOptions {
    /// Zero the unused tail of a slot whose replacement is shorter than the
    /// original. Off by default: the stale bytes are left as they were.
    pub zero_fill: bool,
    /// Fail on the first replacement that cannot be written.
    pub strict: bool,
}

/// Options for [`crate::formats::msbt::inject`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InjectOptions {
    /// Fail on the first entry that does not fit its slot.
    pub strict: bool,
}

/// Options for recompression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompressionOptions {
    /// Zstandard level.
    pub level: i32,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self { level: 16 }
    }
}

/// Everything an archive build needs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BuildOptions {
    pub patch: PatchOptions,
    pub pack: PackOptions,
    pub inject: InjectOptions,
    pub compression: CompressionOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_scenario() {
        let budget = BudgetConfig {
            safety_margin: 1.2,
            arabic_multiplier: 2.0,
        };
        assert_eq!(budget.max_bytes(10), 24);
    }

    #[test]
    fn budget_rounds_up() {
        let budget = BudgetConfig::default();
        assert_eq!(budget.max_bytes(10), 12);
        assert_eq!(budget.max_bytes(11), 14);
        assert_eq!(budget.max_bytes(0), 0);
    }
}
