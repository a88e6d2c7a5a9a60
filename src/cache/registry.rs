//! Names and generations of the three cache tiers.

use crate::classify::Category;

/// The three tier kinds the agent owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
  StaticAssets,
  DynamicPages,
  ApiResponses,
}

impl TierKind {
  pub const ALL: [TierKind; 3] = [
    TierKind::StaticAssets,
    TierKind::DynamicPages,
    TierKind::ApiResponses,
  ];

  fn base_name(&self) -> &'static str {
    match self {
      TierKind::StaticAssets => "static-assets",
      TierKind::DynamicPages => "dynamic-pages",
      TierKind::ApiResponses => "api-responses",
    }
  }

  /// Tier that holds responses for a request category.
  pub fn for_category(category: Category) -> Self {
    match category {
      Category::Static => TierKind::StaticAssets,
      Category::Navigation => TierKind::DynamicPages,
      Category::Api => TierKind::ApiResponses,
    }
  }
}

/// Built once at startup and shared by every handler, so call sites never
/// spell out tier names.
#[derive(Debug, Clone)]
pub struct CacheTierRegistry {
  generation: String,
}

impl CacheTierRegistry {
  pub fn new(generation: impl Into<String>) -> Self {
    Self {
      generation: generation.into(),
    }
  }

  pub fn generation(&self) -> &str {
    &self.generation
  }

  /// Full tier name, e.g. "static-assets-v3".
  pub fn name(&self, kind: TierKind) -> String {
    format!("{}-{}", kind.base_name(), self.generation)
  }

  /// Whether a stored tier belongs to the current deployment.
  pub fn is_current(&self, tier: &str) -> bool {
    TierKind::ALL.iter().any(|kind| self.name(*kind) == tier)
  }
}
