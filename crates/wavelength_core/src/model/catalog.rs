//! Reference catalog snapshot consumed by analytics.
//!
//! # Responsibility
//! - Map curriculum ids to display text, layer, phase and dosage.
//! - Map strategy ids to display text.
//! - Parse the aggregated catalog payload served by the remote service.
//!
//! # Invariants
//! - A catalog is read-only once handed to an analytics engine.
//! - Ids missing from the catalog are referential gaps, not errors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Healthy vs. excessive/shadow expression of an emotion.
///
/// The service spells these `Medicinal`/`Toxic`; lowercase is accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dosage {
    #[serde(alias = "Medicinal")]
    Medicinal,
    #[serde(alias = "Toxic")]
    Toxic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumInfo {
    pub text: String,
    pub layer_id: i64,
    pub phase_id: i64,
    pub dosage: Dosage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub text: String,
}

/// Error returned when a catalog payload cannot be decoded.
#[derive(Debug)]
pub struct CatalogError(serde_json::Error);

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid catalog payload: {}", self.0)
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

/// Immutable id → info lookup tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    curricula: BTreeMap<i64, CurriculumInfo>,
    strategies: BTreeMap<i64, StrategyInfo>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style curriculum insertion, replacing any previous entry.
    pub fn with_curriculum(mut self, id: i64, info: CurriculumInfo) -> Self {
        self.curricula.insert(id, info);
        self
    }

    /// Builder-style strategy insertion, replacing any previous entry.
    pub fn with_strategy(mut self, id: i64, text: impl Into<String>) -> Self {
        self.strategies
            .insert(id, StrategyInfo { text: text.into() });
        self
    }

    pub fn curriculum(&self, id: i64) -> Option<&CurriculumInfo> {
        self.curricula.get(&id)
    }

    pub fn strategy(&self, id: i64) -> Option<&StrategyInfo> {
        self.strategies.get(&id)
    }

    pub fn curriculum_count(&self) -> usize {
        self.curricula.len()
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// Parses the aggregated `layers → phases → {medicinal, toxic, strategies}`
    /// payload.
    ///
    /// Curriculum entries inherit the enclosing layer and phase ids. The
    /// entry's own `dosage` wins over the list it appears in.
    pub fn from_payload_json(payload: &str) -> Result<Self, CatalogError> {
        let payload: CatalogPayload = serde_json::from_str(payload).map_err(CatalogError)?;
        Ok(Self::from_payload(payload))
    }

    fn from_payload(payload: CatalogPayload) -> Self {
        let mut catalog = Self::new();
        for layer in payload.layers {
            for phase in layer.phases {
                for entry in phase.medicinal.into_iter().chain(phase.toxic) {
                    catalog.curricula.insert(
                        entry.id,
                        CurriculumInfo {
                            text: entry.expression,
                            layer_id: layer.id,
                            phase_id: phase.id,
                            dosage: entry.dosage,
                        },
                    );
                }
                for strategy in phase.strategies {
                    catalog.strategies.insert(
                        strategy.id,
                        StrategyInfo {
                            text: strategy.strategy,
                        },
                    );
                }
            }
        }
        catalog
    }
}

#[derive(Debug, Deserialize)]
struct CatalogPayload {
    #[serde(default)]
    layers: Vec<PayloadLayer>,
}

#[derive(Debug, Deserialize)]
struct PayloadLayer {
    id: i64,
    #[serde(default)]
    phases: Vec<PayloadPhase>,
}

#[derive(Debug, Deserialize)]
struct PayloadPhase {
    id: i64,
    #[serde(default)]
    medicinal: Vec<PayloadCurriculum>,
    #[serde(default)]
    toxic: Vec<PayloadCurriculum>,
    #[serde(default)]
    strategies: Vec<PayloadStrategy>,
}

#[derive(Debug, Deserialize)]
struct PayloadCurriculum {
    id: i64,
    dosage: Dosage,
    expression: String,
}

#[derive(Debug, Deserialize)]
struct PayloadStrategy {
    id: i64,
    strategy: String,
}

#[cfg(test)]
mod tests {
    use super::{Catalog, Dosage};

    const PAYLOAD: &str = r#"{
        "phase_order": ["Rising", "Peaking"],
        "layers": [
            {
                "id": 1,
                "color": "Beige",
                "title": "SELF-CARE",
                "subtitle": "(For Surviving)",
                "phases": [
                    {
                        "id": 1,
                        "name": "Rising",
                        "medicinal": [{"id": 10, "dosage": "Medicinal", "expression": "Commitment"}],
                        "toxic": [{"id": 11, "dosage": "Toxic", "expression": "Overwhelm"}],
                        "strategies": [{"id": 5, "strategy": "Cold Shower", "color": "Beige"}]
                    },
                    {
                        "id": 2,
                        "name": "Peaking",
                        "medicinal": [],
                        "toxic": [],
                        "strategies": []
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_aggregated_payload() {
        let catalog = Catalog::from_payload_json(PAYLOAD).unwrap();
        assert_eq!(catalog.curriculum_count(), 2);
        assert_eq!(catalog.strategy_count(), 1);

        let medicinal = catalog.curriculum(10).unwrap();
        assert_eq!(medicinal.text, "Commitment");
        assert_eq!(medicinal.layer_id, 1);
        assert_eq!(medicinal.phase_id, 1);
        assert_eq!(medicinal.dosage, Dosage::Medicinal);
        assert_eq!(catalog.curriculum(11).unwrap().dosage, Dosage::Toxic);
        assert_eq!(catalog.strategy(5).unwrap().text, "Cold Shower");
    }

    #[test]
    fn rejects_malformed_payload() {
        let err = Catalog::from_payload_json("{\"layers\": 3}").unwrap_err();
        assert!(err.to_string().contains("invalid catalog payload"));
    }
}
