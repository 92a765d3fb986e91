//! Pack configuration resolver
//!
//! Builds the effective `PackConfig` for a pack id. The persisted record is
//! preferred; the static table compiled into the deployment fills in for
//! packs that were never persisted and for persisted records that carry no
//! fields. Field keys are normalised and fields ordered by their `order`
//! attribute.

use dossier_core::pack::normalize_field_key;
use dossier_core::{
    BehaviorType, ConfigurationError, DossierError, DossierResult, FieldConfig, PackConfig,
    PackId, PackRecord, SkipCondition,
};
use dossier_storage::InterviewStore;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Where the resolved field list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSource {
    Persisted,
    Static,
    /// Persisted attributes with the static table's fields
    Merged,
}

impl SchemaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaSource::Persisted => "persisted",
            SchemaSource::Static => "static",
            SchemaSource::Merged => "merged",
        }
    }
}

/// Effective pack definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPack {
    pub schema_source: SchemaSource,
    pub config: PackConfig,
}

impl ResolvedPack {
    pub fn fields(&self) -> &[FieldConfig] {
        &self.config.fields
    }

    pub fn pack_id(&self) -> &str {
        &self.config.pack_id
    }

    /// Error for routes that cannot run without fields.
    pub fn require_fields(&self) -> Result<(), ConfigurationError> {
        if self.config.fields.is_empty() {
            return Err(ConfigurationError::EmptyFieldList {
                pack_id: self.config.pack_id.clone(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// STATIC TABLE
// ============================================================================

#[derive(Debug, Deserialize)]
struct StaticTableFile {
    #[serde(default)]
    packs: Vec<PackConfig>,
}

/// Pack definitions shipped with the deployment.
#[derive(Debug, Clone, Default)]
pub struct StaticPackTable {
    packs: HashMap<PackId, PackConfig>,
}

impl StaticPackTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_packs(packs: impl IntoIterator<Item = PackConfig>) -> Self {
        let mut table = Self::new();
        for pack in packs {
            table.insert(pack);
        }
        table
    }

    /// Parse a `[[packs]]` TOML document.
    pub fn from_toml_str(source: &str) -> DossierResult<Self> {
        let file: StaticTableFile = toml::from_str(source).map_err(|e| {
            DossierError::Configuration(ConfigurationError::Parse {
                source_name: "static pack table".to_string(),
                reason: e.to_string(),
            })
        })?;
        Ok(Self::from_packs(file.packs))
    }

    /// Insert with keys normalised and fields ordered.
    pub fn insert(&mut self, mut pack: PackConfig) {
        normalize_pack(&mut pack);
        self.packs.insert(pack.pack_id.clone(), pack);
    }

    pub fn get(&self, pack_id: &str) -> Option<&PackConfig> {
        self.packs.get(pack_id)
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }
}

fn normalize_pack(pack: &mut PackConfig) {
    let pack_id = pack.pack_id.clone();
    for field in &mut pack.fields {
        field.key = normalize_field_key(&pack_id, &field.key);
        if let Some(condition) = field.skip_unless.as_mut() {
            condition.field_key = normalize_field_key(&pack_id, &condition.field_key);
        }
    }
    pack.sort_fields();
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Resolves packs against the store, falling back to the static table.
#[derive(Clone)]
pub struct PackResolver {
    store: Arc<dyn InterviewStore>,
    fallback: Arc<StaticPackTable>,
}

impl PackResolver {
    pub fn new(store: Arc<dyn InterviewStore>, fallback: StaticPackTable) -> Self {
        Self {
            store,
            fallback: Arc::new(fallback),
        }
    }

    /// Resolve `pack_id`.
    ///
    /// A store failure is not fatal here: the lookup degrades to the static
    /// table and the failure is logged.
    pub async fn resolve(&self, pack_id: &str) -> Result<ResolvedPack, ConfigurationError> {
        let persisted = match self.store.pack_get(pack_id).await {
            Ok(record) => record.filter(|r| r.active),
            Err(e) => {
                tracing::warn!(pack_id = %pack_id, error = %e, "Pack lookup failed, using static table");
                None
            }
        };
        let fallback = self.fallback.get(pack_id);

        match (persisted, fallback) {
            (Some(record), fallback) => Ok(from_record(&record, fallback)),
            (None, Some(pack)) => Ok(ResolvedPack {
                schema_source: SchemaSource::Static,
                config: pack.clone(),
            }),
            (None, None) => Err(ConfigurationError::UnknownPack {
                pack_id: pack_id.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for PackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackResolver")
            .field("static_packs", &self.fallback.len())
            .finish()
    }
}

/// Build the effective config from a persisted record, consulting the static
/// definition for anything the record leaves out.
fn from_record(record: &PackRecord, fallback: Option<&PackConfig>) -> ResolvedPack {
    let pack_id = record.pack_id.clone();

    let behavior = match record.behavior.as_deref() {
        Some(raw) => BehaviorType::from_db_str(raw).unwrap_or_else(|| {
            tracing::warn!(pack_id = %pack_id, behavior = %raw, "Unknown persisted behaviour");
            fallback.map(|p| p.behavior_type).unwrap_or_default()
        }),
        None => fallback.map(|p| p.behavior_type).unwrap_or_default(),
    };

    let mut fields: Vec<FieldConfig> = record
        .fields
        .iter()
        .enumerate()
        .map(|(index, f)| FieldConfig {
            key: normalize_field_key(&pack_id, &f.field_key),
            label: f.label.clone(),
            required: f.required.unwrap_or(true),
            skip_unless: f.skip_unless.as_ref().map(|c| SkipCondition {
                field_key: normalize_field_key(&pack_id, &c.field_key),
                equals: c.equals.clone(),
            }),
            semantic_type: f.semantic_type.clone().unwrap_or_default(),
            order: f.order.unwrap_or(index as i32),
            ai_probe: f.ai_probe,
            prefill: f.prefill.clone(),
        })
        .collect();

    let mut schema_source = SchemaSource::Persisted;
    if let Some(static_pack) = fallback {
        if fields.is_empty() && !static_pack.fields.is_empty() {
            tracing::warn!(
                pack_id = %pack_id,
                static_fields = static_pack.fields.len(),
                "Persisted pack has no fields, using static definition"
            );
            fields = static_pack.fields.clone();
            schema_source = SchemaSource::Merged;
        } else if fields.len() != static_pack.fields.len() {
            tracing::warn!(
                pack_id = %pack_id,
                persisted_fields = fields.len(),
                static_fields = static_pack.fields.len(),
                "Persisted and static pack definitions disagree on field count"
            );
        }
        if static_pack.behavior_type != behavior {
            tracing::warn!(
                pack_id = %pack_id,
                persisted = behavior.as_db_str(),
                static_behavior = static_pack.behavior_type.as_db_str(),
                "Persisted and static pack definitions disagree on behaviour"
            );
        }
    }

    let mut config = PackConfig {
        pack_id: pack_id.clone(),
        fields,
        behavior_type: behavior,
        max_ai_followups: record
            .max_ai_followups
            .or_else(|| fallback.map(|p| p.max_ai_followups))
            .unwrap_or(0),
        requires_completion: record.requires_completion
            || fallback.map(|p| p.requires_completion).unwrap_or(false),
        category_id: record
            .category_id
            .clone()
            .or_else(|| fallback.and_then(|p| p.category_id.clone())),
        opener_text: record
            .opener_text
            .clone()
            .or_else(|| fallback.and_then(|p| p.opener_text.clone())),
        substance_name: record
            .substance_name
            .clone()
            .or_else(|| fallback.and_then(|p| p.substance_name.clone())),
    };
    config.sort_fields();

    ResolvedPack {
        schema_source,
        config,
    }
}

// =============================================================================
// TESTS
// =============================================================================
