//! Realization association
//!
//! ## Table of Contents
//! - **Realization**: Source model path crossed with a GSIM path, with a weight
//! - **AssocKey**: (group ID, GSIM) join key of the reverse index
//! - **RlzsAssoc**: Reverse index and aggregation operators
//! - **agg_prob / collection_id_from_tag**: Helpers for the aggregation operators
//!
//! A realization association is built once per composite model. For every
//! source model, in ordinal order, the GSIM logic tree is reduced to the
//! tectonic region types that actually contribute, then either enumerated or
//! sampled. Each resulting path becomes a realization, and every group of the
//! model indexes that realization under the GSIM the path selects for the
//! group's TRT. Downstream numeric results computed per (group, GSIM) are
//! then folded onto realizations with [`RlzsAssoc::combine`] and friends.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use tracing::{debug, warn};

use crate::composite::CompositeSourceModel;
use crate::composition::CompositionInfo;
use crate::config::SamplingConfig;
use crate::error::{CompositeError, Result};
use crate::logictree::ChoicePath;
use crate::source::{Source, SourceGroup, SourceModel};
use crate::types::{CollectionId, GroupId};

/// Aggregation function for probabilities
pub fn agg_prob(acc: f64, prob: f64) -> f64 {
    1.0 - (1.0 - acc) * (1.0 - prob)
}

/// Extract the collection index from a stochastic tag
///
/// Tags look like `col=01|ses=0001|src=A|rup=001-00`; only the leading
/// `col=NN` field is read.
pub fn collection_id_from_tag(tag: &str) -> Result<CollectionId> {
    let head = tag.split('|').next().unwrap_or_default();
    head.strip_prefix("col=")
        .and_then(|digits| digits.parse::<u32>().ok())
        .map(CollectionId)
        .ok_or_else(|| CompositeError::MalformedTag(tag.to_string()))
}

/// A source model path crossed with a GSIM path
#[derive(Debug, Clone, Serialize)]
pub struct Realization {
    /// Global ordinal, assigned once at construction
    pub ordinal: usize,
    /// Path of the source model branch
    pub sm_lt_path: Vec<String>,
    /// GSIM logic tree path
    pub gsim_path: ChoicePath,
    /// Normalized weight
    pub weight: f64,
    /// Collections of the realization (oversampled models only)
    pub col_ids: BTreeSet<CollectionId>,
    uid: String,
}

impl Realization {
    /// Create a realization without collections
    pub fn new(ordinal: usize, sm_lt_path: Vec<String>, gsim_path: ChoicePath, weight: f64) -> Self {
        let uid = format!("{},{}", sm_lt_path.join("_"), gsim_path.uid());
        Self {
            ordinal,
            sm_lt_path,
            gsim_path,
            weight,
            col_ids: BTreeSet::new(),
            uid,
        }
    }

    /// Canonical identifier: source model path plus GSIM path
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Branch IDs of the GSIM path
    pub fn gsim_lt_path(&self) -> &[String] {
        &self.gsim_path.branch_ids
    }
}

impl PartialEq for Realization {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for Realization {}

impl Hash for Realization {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uid.hash(state);
    }
}

impl fmt::Display for Realization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{},{},w={}", self.ordinal, self.uid, self.weight)?;
        if !self.col_ids.is_empty() {
            let cols: Vec<String> = self.col_ids.iter().map(|c| c.to_string()).collect();
            write!(f, ",col={}", cols.join(","))?;
        }
        write!(f, ">")
    }
}

/// Join key of the reverse index
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssocKey {
    /// Source group ID
    pub group_id: GroupId,
    /// GSIM name
    pub gsim: String,
}

impl AssocKey {
    /// Create a new key
    pub fn new(group_id: GroupId, gsim: impl Into<String>) -> Self {
        Self {
            group_id,
            gsim: gsim.into(),
        }
    }
}

impl fmt::Display for AssocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.group_id, self.gsim)
    }
}

/// Association between (group, GSIM) pairs and realizations
#[derive(Debug, Clone)]
pub struct RlzsAssoc {
    info: CompositionInfo,
    rlzs_assoc: BTreeMap<AssocKey, Vec<usize>>,
    gsim_by_trt: Vec<BTreeMap<String, String>>,
    realizations: Vec<Realization>,
    rlzs_by_smodel: BTreeMap<usize, Range<usize>>,
}

impl RlzsAssoc {
    /// Create an empty association
    pub fn new(info: CompositionInfo) -> Self {
        Self {
            info,
            rlzs_assoc: BTreeMap::new(),
            gsim_by_trt: Vec::new(),
            realizations: Vec::new(),
            rlzs_by_smodel: BTreeMap::new(),
        }
    }

    /// Build an association from an explicit reverse index
    ///
    /// `realizations` must be ordered by ordinal; the index refers to them by
    /// ordinal. All realizations are attributed to source model 0.
    pub fn from_parts(
        info: CompositionInfo,
        realizations: Vec<Realization>,
        index: BTreeMap<AssocKey, Vec<usize>>,
    ) -> Result<Self> {
        if let Some((pos, rlz)) = realizations
            .iter()
            .enumerate()
            .find(|(pos, rlz)| rlz.ordinal != *pos)
        {
            return Err(CompositeError::config(format!(
                "realization at position {} has ordinal {}",
                pos, rlz.ordinal
            )));
        }
        if let Some((key, _)) = index
            .iter()
            .find(|(_, ordinals)| ordinals.iter().any(|&o| o >= realizations.len()))
        {
            return Err(CompositeError::config(format!(
                "key {} refers to an unknown realization",
                key
            )));
        }
        let gsim_by_trt = realizations
            .iter()
            .map(|rlz| rlz.gsim_path.choices.clone())
            .collect();
        let mut rlzs_by_smodel = BTreeMap::new();
        if !realizations.is_empty() {
            rlzs_by_smodel.insert(0, 0..realizations.len());
        }
        Ok(Self {
            info,
            rlzs_assoc: index,
            gsim_by_trt,
            realizations,
            rlzs_by_smodel,
        })
    }

    /// Build the association of a composite source model
    ///
    /// `get_weight` decides which groups contribute: a group whose weight is
    /// not positive is dropped from the GSIM logic tree of its model.
    pub fn build<S, F>(csm: &mut CompositeSourceModel<S>, get_weight: F) -> Result<Self>
    where
        S: Source,
        F: Fn(&SourceGroup<S>) -> f64,
    {
        let sampling = csm.sampling().clone();
        let mut assoc = Self::new(csm.info().clone());

        let mut order: Vec<usize> = (0..csm.len()).collect();
        order.sort_by_key(|&i| csm[i].ordinal);

        for i in order {
            let smodel = csm.source_model_mut(i);
            let trts: BTreeSet<String> = smodel
                .groups
                .iter()
                .filter(|&group| get_weight(group) > 0.0)
                .map(|group| group.trt.clone())
                .collect();
            if trts != smodel.gsim_lt.tectonic_region_types() {
                smodel.gsim_lt = smodel.gsim_lt.reduce(&trts);
            }

            let paths = if sampling.is_sampling() {
                let mut rng = StdRng::seed_from_u64(sampling.seed_for(smodel.ordinal));
                smodel.gsim_lt.sample_paths(smodel.samples, &mut rng)
            } else {
                smodel.gsim_lt.enumerate_paths()
            };

            if paths.is_empty() {
                warn!(
                    path = %smodel.path_str(),
                    model = %smodel.name,
                    "No realizations for source model"
                );
                continue;
            }
            debug!(
                path = %smodel.path_str(),
                realizations = paths.len(),
                "Adding realizations"
            );
            assoc.add_realizations(smodel, paths)?;
        }

        assoc.normalize_weights(&sampling)?;
        Ok(assoc)
    }

    fn add_realizations<S>(&mut self, smodel: &mut SourceModel<S>, paths: Vec<ChoicePath>) -> Result<()> {
        let start = self.realizations.len();
        for (i, gsim_path) in paths.into_iter().enumerate() {
            let ordinal = self.realizations.len();
            let weight = smodel.weight * gsim_path.weight;
            let mut rlz = Realization::new(ordinal, smodel.path.clone(), gsim_path, weight);
            self.gsim_by_trt.push(rlz.gsim_path.choices.clone());

            for group in smodel.groups.iter_mut() {
                // groups dropped by the reduction have no GSIM in this path
                let Some(gsim) = smodel.gsim_lt.choice_for(&rlz.gsim_path, &group.trt) else {
                    continue;
                };
                self.rlzs_assoc
                    .entry(AssocKey::new(group.id, gsim))
                    .or_default()
                    .push(ordinal);
                group.gsims = smodel.gsim_lt.values(&group.trt);
                if smodel.samples > 1 {
                    let col_id = self.info.collection_id(group.id, i).ok_or(
                        CompositeError::MissingCollection {
                            group_id: group.id,
                            sample: i,
                        },
                    )?;
                    rlz.col_ids.insert(col_id);
                }
            }
            self.realizations.push(rlz);
        }
        self.rlzs_by_smodel
            .insert(smodel.ordinal, start..self.realizations.len());
        Ok(())
    }

    fn normalize_weights(&mut self, sampling: &SamplingConfig) -> Result<()> {
        if sampling.is_sampling() {
            let num_samples = sampling.number_of_logic_tree_samples;
            if self.realizations.len() != num_samples {
                return Err(CompositeError::SampleCountMismatch {
                    expected: num_samples,
                    actual: self.realizations.len(),
                });
            }
            let weight = 1.0 / num_samples as f64;
            for rlz in &mut self.realizations {
                rlz.weight = weight;
            }
        } else {
            let tot_weight: f64 = self.realizations.iter().map(|r| r.weight).sum();
            if tot_weight == 0.0 {
                return Err(CompositeError::NoViableRealizations);
            }
            if (tot_weight - 1.0).abs() > 1e-12 {
                warn!(
                    total_weight = tot_weight,
                    "Some source models are not contributing, weights are being rescaled"
                );
            }
            for rlz in &mut self.realizations {
                rlz.weight /= tot_weight;
            }
        }
        Ok(())
    }

    /// All realizations in canonical order
    pub fn realizations(&self) -> &[Realization] {
        &self.realizations
    }

    /// Realization with the given ordinal
    pub fn realization(&self, ordinal: usize) -> Option<&Realization> {
        self.realizations.get(ordinal)
    }

    /// Realizations contributed by the source model with the given ordinal
    pub fn realizations_by_model(&self, ordinal: usize) -> &[Realization] {
        self.rlzs_by_smodel
            .get(&ordinal)
            .map(|range| &self.realizations[range.clone()])
            .unwrap_or(&[])
    }

    /// Ordinals of the source models that contributed realizations
    pub fn contributing_models(&self) -> impl Iterator<Item = usize> + '_ {
        self.rlzs_by_smodel.keys().copied()
    }

    /// GSIM selected for each TRT by the realization with the given ordinal
    pub fn gsim_by_trt(&self, ordinal: usize) -> Option<&BTreeMap<String, String>> {
        self.gsim_by_trt.get(ordinal)
    }

    /// Realizations using the given (group, GSIM) pair
    pub fn get(&self, key: &AssocKey) -> Vec<&Realization> {
        self.rlzs_assoc
            .get(key)
            .map(|ordinals| ordinals.iter().map(|&o| &self.realizations[o]).collect())
            .unwrap_or_default()
    }

    /// Ordinals of the realizations using the given (group, GSIM) pair
    pub fn ordinals(&self, key: &AssocKey) -> &[usize] {
        self.rlzs_assoc.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Keys of the reverse index, in order
    pub fn keys(&self) -> impl Iterator<Item = &AssocKey> + '_ {
        self.rlzs_assoc.keys()
    }

    /// Number of keys in the reverse index
    pub fn len(&self) -> usize {
        self.rlzs_assoc.len()
    }

    /// True if the reverse index is empty
    pub fn is_empty(&self) -> bool {
        self.rlzs_assoc.is_empty()
    }

    /// Composition information the association was built with
    pub fn info(&self) -> &CompositionInfo {
        &self.info
    }

    /// Sorted GSIMs associated to each group
    pub fn gsims_by_group(&self) -> BTreeMap<GroupId, Vec<String>> {
        let mut gsims: BTreeMap<GroupId, Vec<String>> = BTreeMap::new();
        for key in self.rlzs_assoc.keys() {
            gsims.entry(key.group_id).or_default().push(key.gsim.clone());
        }
        for names in gsims.values_mut() {
            names.sort();
        }
        gsims
    }

    /// GSIMs for each collection, indexed by collection ID
    pub fn gsims_by_col(&self) -> Result<Vec<Vec<String>>> {
        let gsims = self.gsims_by_group();
        (0..self.info.num_collections())
            .map(|col| {
                let group_id = self.info.group_of(CollectionId(col))?;
                Ok(gsims.get(&group_id).cloned().unwrap_or_default())
            })
            .collect()
    }

    /// Fold per-(group, GSIM) values onto realizations
    ///
    /// Every realization starts from `identity`; each value is folded into
    /// every realization its key maps to. The result is indexed by ordinal
    /// and is independent of the iteration order of `results` as long as
    /// `agg` is commutative and associative.
    pub fn combine<'a, V, F>(
        &self,
        results: impl IntoIterator<Item = (&'a AssocKey, &'a V)>,
        identity: V,
        agg: F,
    ) -> Vec<V>
    where
        V: Clone + 'a,
        F: Fn(&V, &V) -> V,
    {
        let mut acc = vec![identity; self.realizations.len()];
        for (key, value) in results {
            for &ordinal in self.ordinals(key) {
                acc[ordinal] = agg(&acc[ordinal], value);
            }
        }
        acc
    }

    /// Combine probabilities with [`agg_prob`]
    pub fn combine_probs<'a>(&self, results: impl IntoIterator<Item = (&'a AssocKey, &'a f64)>) -> Vec<f64> {
        self.combine(results, 0.0, |acc, prob| agg_prob(*acc, *prob))
    }

    /// Combine hazard curves level by level with [`agg_prob`]
    pub fn combine_curves<'a>(
        &self,
        results: impl IntoIterator<Item = (&'a AssocKey, &'a Vec<f64>)>,
        num_levels: usize,
    ) -> Vec<Vec<f64>> {
        self.combine(results, vec![0.0; num_levels], |acc, curve| {
            acc.iter()
                .zip(curve.iter())
                .map(|(&a, &p)| agg_prob(a, p))
                .collect()
        })
    }

    /// Fold tagged stochastic results onto realizations
    ///
    /// Realizations without collections receive every tag. Realizations of
    /// oversampled models only receive the tags whose collection, obtained
    /// through `tag_lookup`, belongs to them. A tag the lookup rejects aborts
    /// the whole combination.
    pub fn combine_filtered<'a, V, L, F>(
        &self,
        results: impl IntoIterator<Item = (&'a AssocKey, &'a BTreeMap<String, V>)>,
        tag_lookup: L,
        agg: F,
    ) -> Result<Vec<BTreeMap<String, V>>>
    where
        V: Clone + 'a,
        L: Fn(&str) -> Result<CollectionId>,
        F: Fn(&V, &V) -> V,
    {
        let mut acc: Vec<BTreeMap<String, V>> = vec![BTreeMap::new(); self.realizations.len()];
        for (key, by_tag) in results {
            for &ordinal in self.ordinals(key) {
                let col_ids = &self.realizations[ordinal].col_ids;
                for (tag, value) in by_tag {
                    if !col_ids.is_empty() && !col_ids.contains(&tag_lookup(tag.as_str())?) {
                        continue;
                    }
                    let merged = match acc[ordinal].get(tag) {
                        Some(prev) => agg(prev, value),
                        None => value.clone(),
                    };
                    acc[ordinal].insert(tag.clone(), merged);
                }
            }
        }
        Ok(acc)
    }
}

impl fmt::Display for RlzsAssoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<RlzsAssoc")?;
        for (key, ordinals) in &self.rlzs_assoc {
            let rlzs: Vec<String> = if ordinals.len() > 10 {
                vec![format!("{} realizations", ordinals.len())]
            } else {
                ordinals
                    .iter()
                    .map(|&o| self.realizations[o].to_string())
                    .collect()
            };
            writeln!(f, "{}: [{}]", key, rlzs.join(", "))?;
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn rlz(ordinal: usize) -> Realization {
        let path = ChoicePath::new(1.0 / 6.0).with_choice("T", format!("g{}", ordinal), "G");
        Realization::new(ordinal, vec!["sm".to_string()], path, 1.0 / 6.0)
    }

    fn t1_t2_assoc() -> RlzsAssoc {
        let (t1, t2) = (GroupId(1), GroupId(2));
        let index: BTreeMap<AssocKey, Vec<usize>> = [
            (AssocKey::new(t1, "A"), vec![0, 1]),
            (AssocKey::new(t1, "B"), vec![2, 3]),
            (AssocKey::new(t1, "C"), vec![4, 5]),
            (AssocKey::new(t2, "D"), vec![0, 2, 4]),
            (AssocKey::new(t2, "E"), vec![1, 3, 5]),
        ]
        .into_iter()
        .collect();
        RlzsAssoc::from_parts(CompositionInfo::default(), (0..6).map(rlz).collect(), index).unwrap()
    }

    fn t1_t2_results() -> Vec<(AssocKey, f64)> {
        vec![
            (AssocKey::new(GroupId(1), "A"), 0.01),
            (AssocKey::new(GroupId(1), "B"), 0.02),
            (AssocKey::new(GroupId(1), "C"), 0.03),
            (AssocKey::new(GroupId(2), "D"), 0.04),
            (AssocKey::new(GroupId(2), "E"), 0.05),
        ]
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{} != {}", a, e);
        }
    }

    #[test]
    fn test_combine_sums_every_pair() {
        let assoc = t1_t2_assoc();
        let results = t1_t2_results();
        let combined = assoc.combine(results.iter().map(|(k, v)| (k, v)), 0.0, |a, b| a + b);
        assert_close(&combined, &[0.05, 0.06, 0.06, 0.07, 0.07, 0.08]);
    }

    #[test]
    fn test_combine_is_order_independent() {
        let assoc = t1_t2_assoc();
        let mut results = t1_t2_results();
        let forward = assoc.combine(results.iter().map(|(k, v)| (k, v)), 0.0, |a, b| a + b);
        results.reverse();
        results.swap(1, 3);
        let shuffled = assoc.combine(results.iter().map(|(k, v)| (k, v)), 0.0, |a, b| a + b);
        assert_close(&forward, &shuffled);

        let as_map: HashMap<AssocKey, f64> = results.into_iter().collect();
        let from_map = assoc.combine(&as_map, 0.0, |a, b| a + b);
        assert_close(&forward, &from_map);
    }

    #[test]
    fn test_combine_probs() {
        let assoc = t1_t2_assoc();
        let results: BTreeMap<AssocKey, f64> = t1_t2_results().into_iter().collect();
        let combined = assoc.combine_probs(&results);
        assert!((combined[0] - agg_prob(0.01, 0.04)).abs() < 1e-15);
        assert!((combined[5] - (1.0 - 0.97 * 0.95)).abs() < 1e-12);
    }

    #[test]
    fn test_combine_curves() {
        let assoc = t1_t2_assoc();
        let results: BTreeMap<AssocKey, Vec<f64>> = t1_t2_results()
            .into_iter()
            .map(|(k, v)| (k, vec![v, v / 2.0]))
            .collect();
        let curves = assoc.combine_curves(&results, 2);
        assert_eq!(curves.len(), 6);
        assert!((curves[0][0] - agg_prob(0.01, 0.04)).abs() < 1e-15);
        assert!((curves[0][1] - agg_prob(0.005, 0.02)).abs() < 1e-15);
    }

    #[test]
    fn test_combine_filtered_routes_by_collection() {
        let mut rlzs: Vec<Realization> = (0..3).map(rlz).collect();
        rlzs[1].col_ids.insert(CollectionId(0));
        rlzs[2].col_ids.insert(CollectionId(1));
        let key = AssocKey::new(GroupId(1), "A");
        let index = [(key.clone(), vec![0, 1, 2])].into_iter().collect();
        let assoc = RlzsAssoc::from_parts(CompositionInfo::default(), rlzs, index).unwrap();

        let gmfs: BTreeMap<String, f64> = [
            ("col=00|ses=0001|rup=001".to_string(), 0.1),
            ("col=01|ses=0001|rup=002".to_string(), 0.2),
        ]
        .into_iter()
        .collect();
        let results: BTreeMap<AssocKey, BTreeMap<String, f64>> = [(key, gmfs)].into_iter().collect();

        let combined = assoc
            .combine_filtered(&results, collection_id_from_tag, |a, b| a + b)
            .unwrap();
        assert_eq!(combined[0].len(), 2);
        assert_eq!(combined[1].keys().collect::<Vec<_>>(), vec!["col=00|ses=0001|rup=001"]);
        assert_eq!(combined[2].keys().collect::<Vec<_>>(), vec!["col=01|ses=0001|rup=002"]);
    }

    #[test]
    fn test_combine_filtered_rejects_malformed_tag() {
        let mut rlzs: Vec<Realization> = (0..1).map(rlz).collect();
        rlzs[0].col_ids.insert(CollectionId(0));
        let key = AssocKey::new(GroupId(1), "A");
        let index = [(key.clone(), vec![0])].into_iter().collect();
        let assoc = RlzsAssoc::from_parts(CompositionInfo::default(), rlzs, index).unwrap();

        let gmfs: BTreeMap<String, f64> = [("ses=0001|rup=001".to_string(), 0.1)].into_iter().collect();
        let results: BTreeMap<AssocKey, BTreeMap<String, f64>> = [(key, gmfs)].into_iter().collect();
        let err = assoc
            .combine_filtered(&results, collection_id_from_tag, |a, b| a + b)
            .unwrap_err();
        assert!(matches!(err, CompositeError::MalformedTag(_)));
    }

    #[test]
    fn test_collection_id_from_tag() {
        assert_eq!(collection_id_from_tag("col=01|ses=0001").unwrap(), CollectionId(1));
        assert_eq!(collection_id_from_tag("col=12").unwrap(), CollectionId(12));
        assert!(collection_id_from_tag("col=x1|ses=1").is_err());
        assert!(collection_id_from_tag("").is_err());
    }

    #[test]
    fn test_realization_identity_ignores_ordinal() {
        let a = rlz(0);
        let mut b = rlz(0);
        b.ordinal = 9;
        b.weight = 0.5;
        assert_eq!(a, b);
        assert_eq!(a.uid(), "sm,g0");
        assert_ne!(rlz(0), rlz(1));
        assert_eq!(a.to_string(), format!("<0,sm,g0,w={}>", 1.0 / 6.0));
    }

    #[test]
    fn test_from_parts_validates_ordinals() {
        let index = [(AssocKey::new(GroupId(1), "A"), vec![3])].into_iter().collect();
        let err = RlzsAssoc::from_parts(CompositionInfo::default(), vec![rlz(0)], index);
        assert!(err.is_err());

        let misnumbered = RlzsAssoc::from_parts(CompositionInfo::default(), vec![rlz(1)], BTreeMap::new());
        assert!(misnumbered.is_err());
    }

    #[test]
    fn test_display_shortens_long_lists() {
        let assoc = t1_t2_assoc();
        let text = assoc.to_string();
        assert!(text.starts_with("<RlzsAssoc"));
        assert!(text.contains("1,A: [<0,sm,g0"));
    }
}
