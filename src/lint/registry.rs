use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;
use tracing::debug;

use super::errors::{LintError, LintResult};
use super::rules::{self, CrlLint};

/// Rule filter applied when none is configured: only the nextUpdate window
/// check, evaluated with the limits for CRLs covering CA certificates.
pub const DEFAULT_RULE_FILTER: &str = r#"
include = ["e_crl_next_update_invalid"]

[e_crl_next_update_invalid]
subscriber_crl = false
"#;

#[derive(Debug, Default, Deserialize)]
struct Selection {
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
}

/// Which rules run and with which settings.
///
/// Written in TOML:
///
/// ```toml
/// include = ["e_crl_next_update_invalid"]   # empty or absent: every rule
/// exclude = []
///
/// [e_crl_next_update_invalid]
/// subscriber_crl = false
/// ```
#[derive(Debug, Clone)]
pub struct RuleFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    settings: Config,
}

impl RuleFilter {
    pub fn from_toml(source: &str) -> LintResult<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;
        let selection: Selection = settings.clone().try_deserialize()?;

        Ok(Self {
            include: selection.include,
            exclude: selection.exclude,
            settings,
        })
    }

    pub fn load(path: &Path) -> LintResult<Self> {
        debug!("Loading lint rule filter from {}", path.display());
        let source = std::fs::read_to_string(path)?;
        Self::from_toml(&source)
    }

    /// The filter used when no rule filter file is configured.
    pub fn builtin() -> LintResult<Self> {
        Self::from_toml(DEFAULT_RULE_FILTER)
    }

    /// Every registered rule with default settings.
    pub fn all() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            settings: Config::default(),
        }
    }

    fn selects(&self, name: &str) -> bool {
        (self.include.is_empty() || self.include.iter().any(|n| n == name))
            && !self.exclude.iter().any(|n| n == name)
    }
}

/// Ordered collection of rules
pub struct LintRegistry {
    lints: Vec<Box<dyn CrlLint>>,
}

impl LintRegistry {
    pub fn new(lints: Vec<Box<dyn CrlLint>>) -> Self {
        Self { lints }
    }

    /// Registry holding every built-in rule.
    pub fn builtin() -> Self {
        Self::new(rules::builtin())
    }

    /// Keep only the rules selected by `filter` and apply its settings.
    ///
    /// Naming a rule the registry does not know is an error, so typos in the
    /// filter do not silently disable a check.
    pub fn filter(self, filter: &RuleFilter) -> LintResult<Self> {
        for name in filter.include.iter().chain(filter.exclude.iter()) {
            if !self.names().any(|known| known == name) {
                return Err(LintError::UnknownRule(name.clone()));
            }
        }

        let mut lints = self.lints;
        lints.retain(|lint| filter.selects(lint.metadata().name));
        for lint in &mut lints {
            lint.configure(&filter.settings)?;
        }

        debug!("Lint registry holds {} rules", lints.len());
        Ok(Self { lints })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.lints.iter().map(|lint| lint.metadata().name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn CrlLint> {
        self.lints.iter().map(|lint| lint.as_ref())
    }

    pub fn len(&self) -> usize {
        self.lints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lints.is_empty()
    }
}

impl std::fmt::Debug for LintRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
