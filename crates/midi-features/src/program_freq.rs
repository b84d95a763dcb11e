use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Relative frequency of each MIDI program in the training rows.
///
/// Persisted as JSON with string keys (`{"0": 0.61, "40": 0.12}`); keys are
/// cast back to program numbers on load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramFrequencies {
    frequencies: HashMap<u8, f64>,
}

impl ProgramFrequencies {
    pub fn from_map(frequencies: HashMap<u8, f64>) -> Self {
        Self { frequencies }
    }

    /// Relative frequency of each program among `programs`, one entry per row.
    pub fn fit(programs: impl IntoIterator<Item = u8>) -> Self {
        let mut counts: HashMap<u8, usize> = HashMap::new();
        let mut total = 0usize;
        for program in programs {
            *counts.entry(program).or_default() += 1;
            total += 1;
        }
        let frequencies = counts
            .into_iter()
            .map(|(program, count)| (program, count as f64 / total as f64))
            .collect();
        Self { frequencies }
    }

    /// Frequency for `program`; unseen programs encode to 0.
    pub fn encode(&self, program: u8) -> f64 {
        self.frequencies.get(&program).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| crate::Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents).map_err(|message| crate::Error::InvalidArtifact {
            path: path.to_path_buf(),
            message,
        })
    }

    fn from_json(contents: &str) -> std::result::Result<Self, String> {
        let raw: HashMap<String, f64> = serde_json::from_str(contents).map_err(|e| e.to_string())?;
        let mut frequencies = HashMap::with_capacity(raw.len());
        for (key, freq) in raw {
            let program: u8 = key
                .trim()
                .parse()
                .ok()
                .filter(|p| *p < 128)
                .ok_or_else(|| format!("invalid program key {:?}", key))?;
            frequencies.insert(program, freq);
        }
        Ok(Self { frequencies })
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let keyed: BTreeMap<u8, f64> = self.frequencies.iter().map(|(k, v)| (*k, *v)).collect();
        let keyed: BTreeMap<String, f64> =
            keyed.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let json = serde_json::to_string_pretty(&keyed).map_err(|e| crate::Error::InvalidArtifact {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| crate::Error::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn string_keys_become_programs() {
        let table = ProgramFrequencies::from_json(r#"{"0": 0.75, "40": 0.25}"#).unwrap();
        assert_eq!(table.encode(0), 0.75);
        assert_eq!(table.encode(40), 0.25);
    }

    #[test]
    fn unseen_program_is_zero() {
        let table = ProgramFrequencies::from_json(r#"{"0": 1.0}"#).unwrap();
        assert_eq!(table.encode(73), 0.0);
        assert_eq!(ProgramFrequencies::default().encode(0), 0.0);
    }

    #[test]
    fn bad_keys_are_rejected() {
        assert!(ProgramFrequencies::from_json(r#"{"piano": 1.0}"#).is_err());
        assert!(ProgramFrequencies::from_json(r#"{"200": 1.0}"#).is_err());
    }

    #[test]
    fn fit_counts_rows() {
        let table = ProgramFrequencies::fit([0, 0, 0, 40]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.encode(0), 0.75);
        assert_eq!(table.encode(40), 0.25);
    }

    #[test]
    fn save_writes_string_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("program_freq.json");
        ProgramFrequencies::fit([0, 1]).save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["1"], 0.5);

        let loaded = ProgramFrequencies::load(&path).unwrap();
        assert_eq!(loaded.encode(0), 0.5);
    }
}
