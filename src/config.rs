//! Runtime configuration of the particle readers.
use std::path::Path;

use serde::Deserialize;

use crate::error::ParticleError;

/// Tunables for reading and generating particles.
///
/// All fields have defaults so that a configuration file only needs to list what it changes:
/// ```toml
/// max_readers = 16
/// max_particles_per_read = 50000
/// verbose = 1
/// ```
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ParticleConfig {
    /// Maximum number of ranks that open a particle file.
    pub max_readers: usize,
    /// Number of particles each binary reader reads before everyone redistributes.
    pub max_particles_per_read: usize,
    /// 0 is silent, 1 reports particle counts, 2 also reports timings.
    pub verbose: u32,
    /// Seed of the generator the leader uses to draw binary reader sets.
    pub reader_seed: u64,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            max_readers: 64,
            max_particles_per_read: 100_000,
            verbose: 0,
            reader_seed: 1,
        }
    }
}

impl ParticleConfig {
    /// Load a configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ParticleError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ParticleError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ParticleError> {
        let config: ParticleConfig =
            toml::from_str(contents).map_err(|e| ParticleError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ParticleError> {
        if self.max_readers == 0 {
            return Err(ParticleError::Config("max_readers must be positive".into()));
        }
        if self.max_particles_per_read == 0 {
            return Err(ParticleError::Config(
                "max_particles_per_read must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::ParticleConfig;

    #[test]
    fn test_partial_config() {
        let config = ParticleConfig::from_toml_str("max_readers = 8\nverbose = 2\n").unwrap();

        assert_eq!(config.max_readers, 8);
        assert_eq!(config.verbose, 2);
        assert_eq!(
            config.max_particles_per_read,
            ParticleConfig::default().max_particles_per_read
        );
    }

    #[test]
    fn test_invalid_config() {
        assert!(ParticleConfig::from_toml_str("max_readers = 0").is_err());
        assert!(ParticleConfig::from_toml_str("max_readers = \"many\"").is_err());
    }
}
