//! Shared catalog fixture for the engine integration tests.
//!
//! Three programmes: a Computer Science major (`cs`), a Mathematics minor
//! (`ma`) and a Statistics minor (`st`). MA1521 is listed by all three,
//! which makes it the double-counting candidate. Every course is 4 units.

#![allow(dead_code)]

use std::sync::Arc;

use courseplan_catalog::CatalogDocument;
use courseplan_engine::{EngineConfig, SelectionState, ValidationEngine};
use courseplan_lookup::{ReferenceLookup, StaticLookup};
use rust_decimal::Decimal;
use serde_json::{json, Value};

pub fn catalog() -> Value {
    json!({
        "courses": [
            { "id": "CS1010", "title": "Programming Methodology", "units": 4, "preclusions": ["CS1010E"] },
            { "id": "CS1010E", "units": 4, "preclusions": ["CS1010"] },
            { "id": "CS1231", "units": 4 },
            { "id": "CS2040S", "units": 4, "prerequisite": { "kind": "simple", "course": "CS1010" } },
            {
                "id": "CS2030",
                "units": 4,
                "prerequisite": { "kind": "simple_or", "courses": ["CS1010", "CS1010E"] }
            },
            {
                "id": "CS2100",
                "units": 4,
                "prerequisite": {
                    "kind": "complex_or",
                    "children": [
                        { "kind": "simple", "course": "CS1010", "description": "Programming Methodology" },
                        { "kind": "simple_and", "courses": ["CS1231", "MA1521"] }
                    ]
                }
            },
            {
                "id": "CS3230",
                "units": 4,
                "prerequisite": { "kind": "simple_and", "courses": ["CS2040S", "CS1231"] }
            },
            {
                "id": "CS3244",
                "units": 4,
                "prerequisite": { "kind": "n_of_k", "n": 2, "courses": ["MA1521", "MA2001", "ST2334"] }
            },
            { "id": "CS4243", "units": 4 },
            { "id": "CS4248", "units": 4 },
            { "id": "MA1521", "units": 4 },
            { "id": "MA2001", "units": 4 },
            { "id": "ST2334", "units": 4 },
            { "id": "GEA1000", "units": 4 }
        ],
        "programmes": [
            {
                "id": "cs",
                "kind": "major",
                "label": "Computer Science",
                "total_units": 160,
                "double_count_cap": 8,
                "paths": ["cs-found", "cs-found-core", "cs-breadth", "cs-breadth-elec"]
            },
            {
                "id": "ma",
                "kind": "minor",
                "label": "Mathematics",
                "total_units": 20,
                "double_count_cap": 8,
                "paths": ["ma-core", "ma-core-list"]
            },
            {
                "id": "st",
                "kind": "minor",
                "label": "Statistics",
                "total_units": 20,
                "double_count_cap": 8,
                "paths": ["st-core", "st-core-list"]
            }
        ],
        "paths": [
            { "id": "cs-found", "programme": "cs", "label": "Foundation", "logic": "section", "required_units": 20 },
            {
                "id": "cs-found-core",
                "parent": "cs-found",
                "programme": "cs",
                "label": "Foundation core",
                "logic": "leaf",
                "required_units": 20,
                "courses": ["CS1010", "CS1010E", "CS1231", "CS2040S", "CS2030", "CS2100", "MA1521"]
            },
            { "id": "cs-breadth", "programme": "cs", "label": "Breadth", "logic": "section", "required_units": 12 },
            {
                "id": "cs-breadth-elec",
                "parent": "cs-breadth",
                "programme": "cs",
                "label": "Breadth electives",
                "logic": "leaf",
                "cap": { "kind": "max", "units": 4 },
                "required_units": 12,
                "courses": ["CS3230", "CS3244", "CS4243", "CS4248"]
            },
            { "id": "ma-core", "programme": "ma", "label": "Mathematics core", "logic": "section", "required_units": 20 },
            {
                "id": "ma-core-list",
                "parent": "ma-core",
                "programme": "ma",
                "logic": "leaf",
                "required_units": 20,
                "courses": ["MA1521", "MA2001", "ST2334"]
            },
            { "id": "st-core", "programme": "st", "logic": "section", "required_units": 20 },
            {
                "id": "st-core-list",
                "parent": "st-core",
                "programme": "st",
                "logic": "leaf",
                "required_units": 20,
                "courses": ["MA1521", "ST2334"]
            }
        ]
    })
}

pub fn static_lookup(doc: &Value) -> StaticLookup {
    StaticLookup::new(CatalogDocument::from_json(doc).expect("fixture catalog is valid"))
}

pub fn lookup(doc: &Value) -> Arc<dyn ReferenceLookup> {
    Arc::new(static_lookup(doc))
}

pub fn ids(programmes: &[&str]) -> Vec<String> {
    programmes.iter().map(|p| p.to_string()).collect()
}

pub fn units(n: i64) -> Decimal {
    Decimal::from(n)
}

pub async fn engine(programmes: &[&str]) -> ValidationEngine {
    engine_with(&catalog(), programmes, EngineConfig::default()).await
}

pub async fn engine_with(doc: &Value, programmes: &[&str], config: EngineConfig) -> ValidationEngine {
    ValidationEngine::load(lookup(doc), &ids(programmes), config)
        .await
        .expect("fixture programmes load")
}

/// Structural invariants that must hold after every operation.
pub fn assert_invariants(engine: &ValidationEngine) {
    let state: &SelectionState = engine.state();
    let hierarchy = engine.hierarchy();

    for (course, usage) in &state.usage_count {
        assert!(*usage <= 2, "{} has usage {}", course, usage);
    }

    for (path, contributions) in &state.path_contributors {
        let sum: Decimal = contributions.iter().map(|c| c.units).sum();
        assert_eq!(state.fulfilment(path), sum, "fulfilment of {}", path);
        if hierarchy.leaf(path).is_some() {
            for ancestor in hierarchy.chain(path).iter().skip(1) {
                assert!(
                    state.fulfilment(ancestor) >= state.fulfilment(path),
                    "{} below its leaf {}",
                    ancestor,
                    path
                );
            }
        }
    }

    for (programme, used) in &state.double_count_usage {
        let cap = hierarchy
            .programme(programme)
            .map(|p| p.double_count_cap)
            .unwrap_or_default();
        assert!(*used <= cap, "{} double count {} over cap {}", programme, used, cap);
    }
    for (course, programmes) in &state.double_count_attribution {
        assert!(programmes.len() <= 2, "{} double counted into {:?}", course, programmes);
    }
}
