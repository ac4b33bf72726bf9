//! Shared fixtures for the integration tests

#![allow(dead_code)]

use quake_forge::prelude::*;
use quake_forge::{BoxedChoiceTree, CompositeError, CompositeSourceModel};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Source with a fixed rupture count whose length decides the split
#[derive(Debug, Clone, PartialEq)]
pub struct TestSource {
    pub id: String,
    pub trt: String,
    pub kind: SourceKind,
    pub num_ruptures: u64,
    pub length_km: f64,
    pub weight: f64,
    pub group: Option<GroupId>,
}

impl TestSource {
    pub fn new(id: &str, trt: &str, num_ruptures: u64) -> Self {
        Self {
            id: id.to_string(),
            trt: trt.to_string(),
            kind: SourceKind::SimpleFault,
            num_ruptures,
            length_km: 10.0,
            weight: 0.0,
            group: None,
        }
    }

    pub fn point(id: &str, trt: &str, num_ruptures: u64) -> Self {
        Self {
            kind: SourceKind::Point,
            ..Self::new(id, trt, num_ruptures)
        }
    }

    pub fn length(mut self, km: f64) -> Self {
        self.length_km = km;
        self
    }
}

impl Source for TestSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn tectonic_region_type(&self) -> &str {
        &self.trt
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn min_max_mag(&self) -> (f64, f64) {
        (5.0, 7.5)
    }

    fn count_ruptures(&self) -> u64 {
        self.num_ruptures
    }

    fn split(&self, discretization: f64) -> quake_forge::Result<Vec<Self>> {
        if !(self.length_km > 0.0) {
            return Err(CompositeError::split(&self.id, "zero length"));
        }
        let pieces = (self.length_km / discretization).ceil().max(1.0) as u64;
        if pieces == 1 {
            return Ok(vec![self.clone()]);
        }
        Ok((0..pieces)
            .map(|i| Self {
                id: format!("{}-{}", self.id, i),
                num_ruptures: (self.num_ruptures / pieces).max(1),
                length_km: self.length_km / pieces as f64,
                ..self.clone()
            })
            .collect())
    }

    fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    fn group_id(&self) -> Option<GroupId> {
        self.group
    }

    fn set_group_id(&mut self, id: GroupId) {
        self.group = Some(id);
    }
}

/// Active crust has three GSIMs, stable crust two
pub fn two_region_tree() -> BoxedChoiceTree {
    BranchSetTree::new()
        .with_branch_set(
            "Active Shallow Crust",
            vec![
                Branch::new("b11", "BooreAtkinson2008", 0.5),
                Branch::new("b12", "ChiouYoungs2008", 0.3),
                Branch::new("b13", "Campbell2003", 0.2),
            ],
        )
        .unwrap()
        .with_branch_set(
            "Stable Continental Crust",
            vec![
                Branch::new("b21", "ToroEtAl2002", 0.6),
                Branch::new("b22", "AtkinsonBoore2006", 0.4),
            ],
        )
        .unwrap()
        .into_shared()
}

pub fn sources(prefix: &str) -> Vec<TestSource> {
    vec![
        TestSource::new(&format!("{}-f1", prefix), "Active Shallow Crust", 12).length(35.0),
        TestSource::point(&format!("{}-p1", prefix), "Active Shallow Crust", 80),
        TestSource::new(&format!("{}-f2", prefix), "Stable Continental Crust", 7),
        TestSource::point(&format!("{}-p2", prefix), "Stable Continental Crust", 40).length(25.0),
    ]
}

/// Two source model branches, sampled `samples[0]` and `samples[1]` times
pub fn composite(sampling: SamplingConfig, samples: [usize; 2]) -> CompositeSourceModel<TestSource> {
    try_composite(sampling, samples).unwrap()
}

pub fn try_composite(
    sampling: SamplingConfig,
    samples: [usize; 2],
) -> quake_forge::Result<CompositeSourceModel<TestSource>> {
    CompositeBuilder::new()
        .with_sampling(sampling)
        .source_model(
            SourceModelBranch::new("model_a.xml", two_region_tree())
                .with_weight(0.7)
                .with_path(vec!["b1"])
                .with_samples(samples[0])
                .with_sources(sources("a")),
        )
        .source_model(
            SourceModelBranch::new("model_b.xml", two_region_tree())
                .with_weight(0.3)
                .with_path(vec!["b2"])
                .with_samples(samples[1])
                .with_sources(sources("b")),
        )
        .build()
}
