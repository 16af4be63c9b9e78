//! Deterministic train/valid/test splitting and split manifests.

use crate::types::{DatasetError, DatasetResult, SamplePair};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatasetSplits {
    pub train: Vec<SamplePair>,
    pub valid: Vec<SamplePair>,
    pub test: Vec<SamplePair>,
}

impl DatasetSplits {
    pub fn get(&self, split: Split) -> &[SamplePair] {
        match split {
            Split::Train => &self.train,
            Split::Valid => &self.valid,
            Split::Test => &self.test,
        }
    }

    /// The splits `manifest` recorded, resolved against freshly indexed `pairs`.
    ///
    /// Every listed file must be present; pairs the manifest does not name are ignored.
    pub fn from_manifest(pairs: Vec<SamplePair>, manifest: &SplitManifest) -> DatasetResult<Self> {
        let mut by_name: HashMap<String, SamplePair> =
            pairs.into_iter().map(|p| (p.file_name(), p)).collect();
        let mut take = |names: &[String]| -> DatasetResult<Vec<SamplePair>> {
            names
                .iter()
                .map(|name| {
                    by_name
                        .remove(name)
                        .ok_or_else(|| DatasetError::ManifestEntryMissing(name.clone()))
                })
                .collect()
        };
        Ok(Self {
            train: take(&manifest.train)?,
            valid: take(&manifest.valid)?,
            test: take(&manifest.test)?,
        })
    }

    pub fn manifest(&self, split_ratio: f64, seed: u64) -> SplitManifest {
        let names = |pairs: &[SamplePair]| pairs.iter().map(SamplePair::file_name).collect();
        SplitManifest {
            seed,
            split_ratio,
            train: names(&self.train),
            valid: names(&self.valid),
            test: names(&self.test),
        }
    }
}

/// Shuffle with `seed`, then carve `floor(N * split)` pairs for test and as many for valid.
pub fn split_pairs(
    mut pairs: Vec<SamplePair>,
    split: f64,
    seed: u64,
) -> DatasetResult<DatasetSplits> {
    if !split.is_finite() || !(0.0..0.5).contains(&split) {
        return Err(DatasetError::InvalidSplit(split));
    }
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    pairs.shuffle(&mut rng);

    let held_out = (pairs.len() as f64 * split).floor() as usize;
    let test: Vec<SamplePair> = pairs.drain(..held_out).collect();
    let valid: Vec<SamplePair> = pairs.drain(..held_out).collect();
    Ok(DatasetSplits {
        train: pairs,
        valid,
        test,
    })
}

/// File names per split, written next to checkpoints so evaluation can be repeated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitManifest {
    pub seed: u64,
    pub split_ratio: f64,
    pub train: Vec<String>,
    pub valid: Vec<String>,
    pub test: Vec<String>,
}

impl SplitManifest {
    pub fn save(&self, path: &Path) -> DatasetResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| DatasetError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| DatasetError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> DatasetResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| DatasetError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pairs(n: usize) -> Vec<SamplePair> {
        (0..n)
            .map(|i| SamplePair {
                image: PathBuf::from(format!("images/{i:03}.jpg")),
                mask: PathBuf::from(format!("masks/{i:03}.jpg")),
            })
            .collect()
    }

    #[test]
    fn carves_test_and_valid_by_floor() {
        let splits = split_pairs(pairs(105), 0.1, 42).unwrap();
        assert_eq!(splits.test.len(), 10);
        assert_eq!(splits.valid.len(), 10);
        assert_eq!(splits.train.len(), 85);
    }

    #[test]
    fn same_seed_same_split() {
        let a = split_pairs(pairs(40), 0.2, 7).unwrap();
        let b = split_pairs(pairs(40), 0.2, 7).unwrap();
        assert_eq!(a.test, b.test);
        assert_eq!(a.valid, b.valid);
        assert_eq!(a.train, b.train);
    }

    #[test]
    fn splits_are_disjoint_and_complete() {
        let splits = split_pairs(pairs(50), 0.1, 3).unwrap();
        let mut all: Vec<String> = [Split::Train, Split::Valid, Split::Test]
            .iter()
            .flat_map(|s| splits.get(*s).iter().map(SamplePair::file_name))
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 50);
    }

    #[test]
    fn rejects_ratio_that_leaves_no_training_data() {
        assert!(matches!(
            split_pairs(pairs(10), 0.5, 0),
            Err(DatasetError::InvalidSplit(_))
        ));
    }

    #[test]
    fn manifest_rebuilds_the_recorded_split() {
        let manifest = split_pairs(pairs(30), 0.1, 7).unwrap().manifest(0.1, 7);
        let rebuilt = DatasetSplits::from_manifest(pairs(30), &manifest).unwrap();
        assert_eq!(rebuilt.manifest(0.1, 7), manifest);
        assert_ne!(split_pairs(pairs(30), 0.1, 41).unwrap().test, rebuilt.test);
    }

    #[test]
    fn manifest_naming_a_missing_file_is_an_error() {
        let manifest = split_pairs(pairs(30), 0.1, 7).unwrap().manifest(0.1, 7);
        let err = DatasetSplits::from_manifest(pairs(20), &manifest);
        assert!(matches!(err, Err(DatasetError::ManifestEntryMissing(_))));
    }

    #[test]
    fn manifest_survives_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/split_manifest.json");
        let manifest = split_pairs(pairs(20), 0.1, 41).unwrap().manifest(0.1, 41);
        manifest.save(&path).unwrap();
        assert_eq!(SplitManifest::load(&path).unwrap(), manifest);
    }
}
