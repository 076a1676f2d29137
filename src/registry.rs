use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use crate::error::ConfigError;

/// Plates with expired insurance, loaded once per session.
#[derive(Debug, Clone, Default)]
pub struct InsuranceRegistry {
    plates: HashSet<String>,
}

impl InsuranceRegistry {
    pub fn from_plates<I, S>(plates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        InsuranceRegistry {
            plates: plates.into_iter().map(Into::into).collect(),
        }
    }

    /// Read the plate column of a CSV file. A missing file or column is a
    /// startup failure.
    pub fn from_csv_path(path: impl AsRef<Path>, column: &str) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let registry_err = |source| ConfigError::Registry {
            path: path.display().to_string(),
            source,
        };

        let mut reader = csv::Reader::from_path(path).map_err(registry_err)?;
        let index = reader
            .headers()
            .map_err(registry_err)?
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| ConfigError::MissingColumn {
                path: path.display().to_string(),
                column: column.to_string(),
            })?;

        let mut plates = HashSet::new();
        for row in reader.records() {
            let row = row.map_err(registry_err)?;
            if let Some(plate) = row.get(index).map(str::trim).filter(|p| !p.is_empty()) {
                plates.insert(plate.to_string());
            }
        }
        info!(path = %path.display(), plates = plates.len(), "loaded expired-insurance registry");
        Ok(InsuranceRegistry { plates })
    }

    /// Exact, case-sensitive match.
    pub fn contains(&self, plate: &str) -> bool {
        self.plates.contains(plate)
    }

    pub fn len(&self) -> usize {
        self.plates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plates.is_empty()
    }
}
