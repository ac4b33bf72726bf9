//! Test doubles shared by the unit tests

use crate::error::{CompositeError, Result};
use crate::source::Source;
use crate::types::{GroupId, SourceKind};

/// A source whose rupture count is fixed and whose extent decides the split
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FakeSource {
    pub id: String,
    pub trt: String,
    pub kind: SourceKind,
    pub mags: (f64, f64),
    pub num_ruptures: u64,
    pub extent: f64,
    pub weight: f64,
    pub group: Option<GroupId>,
    pub broken: bool,
    pub split_trt: Option<String>,
}

impl FakeSource {
    pub fn new(id: &str, trt: &str) -> Self {
        Self {
            id: id.to_string(),
            trt: trt.to_string(),
            kind: SourceKind::SimpleFault,
            mags: (5.0, 7.0),
            num_ruptures: 1,
            extent: 10.0,
            weight: 0.0,
            group: None,
            broken: false,
            split_trt: None,
        }
    }

    pub fn kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn mags(mut self, min: f64, max: f64) -> Self {
        self.mags = (min, max);
        self
    }

    pub fn ruptures(mut self, n: u64) -> Self {
        self.num_ruptures = n;
        self
    }

    pub fn extent(mut self, km: f64) -> Self {
        self.extent = km;
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Sub-sources come out of `split` with another TRT
    pub fn split_into_trt(mut self, trt: &str) -> Self {
        self.split_trt = Some(trt.to_string());
        self
    }
}

impl Source for FakeSource {
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
        self.mags
    }

    fn count_ruptures(&self) -> u64 {
        self.num_ruptures
    }

    fn split(&self, discretization: f64) -> Result<Vec<Self>> {
        if self.broken {
            return Err(CompositeError::split(&self.id, "degenerate geometry"));
        }
        let pieces = (self.extent / discretization).ceil().max(1.0) as u64;
        let mut subs = if pieces == 1 {
            vec![self.clone()]
        } else {
            (0..pieces)
                .map(|i| Self {
                    id: format!("{}:{}", self.id, i),
                    num_ruptures: (self.num_ruptures / pieces).max(1),
                    extent: self.extent / pieces as f64,
                    ..self.clone()
                })
                .collect()
        };
        if let Some(trt) = &self.split_trt {
            for sub in &mut subs {
                sub.trt = trt.clone();
            }
        }
        Ok(subs)
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
