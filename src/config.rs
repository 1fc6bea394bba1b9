//! Pass-level configuration.
//!
//! Mirrors the `RAYZOR_NO_SRA` / `RAYZOR_NO_PHI_SRA` environment-variable
//! toggles in `scalar_replacement.rs`: a debugging/bisection escape hatch,
//! read once at context construction, never consulted mid-analysis.

use std::env;

#[derive(Debug, Clone, Copy)]
pub struct PeaConfig {
    /// Disables the pass entirely; `analyze` returns `Bailout::Disabled`
    /// without visiting a single block.
    pub disabled: bool,
    /// Disables the big-integer decomposition family (§4.4) only; all other
    /// rewrites proceed normally.
    pub disable_bigint: bool,
}

impl PeaConfig {
    pub fn from_env() -> Self {
        Self {
            disabled: env_flag("PEA_DISABLE"),
            disable_bigint: env_flag("PEA_DISABLE_BIGINT"),
        }
    }
}

impl Default for PeaConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            disable_bigint: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(v) => v != "0" && !v.is_empty(),
        Err(_) => false,
    }
}
