//! Error type for particle ingestion.
use std::fmt;
use std::path::PathBuf;

use crate::constants::SPACEDIM;

/// Everything that can go wrong while reading, generating or redistributing particles.
///
/// With the exception of [ParticleError::Config] none of these are recoverable. The
/// collective entry points of [ParticleContainer](crate::container::ParticleContainer)
/// hand them to [Communicator::abort](crate::comm::Communicator::abort), which ends the
/// whole distributed computation.
#[derive(Debug)]
pub enum ParticleError {
    /// A particle file could not be opened.
    FileOpen {
        /// The offending path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A particle file violates its format.
    Format {
        /// The file being read.
        file: PathBuf,
        /// Which stage of reading detected the problem.
        stage: &'static str,
        /// What went wrong.
        message: String,
    },

    /// A particle could not be placed in the hierarchy, even after a periodic shift.
    InvalidParticle {
        /// The id the particle would have been given.
        would_be_id: u64,
        /// The position after boundary snapping and the periodic shift.
        position: [f64; SPACEDIM],
    },

    /// A caller supplied argument is out of range.
    Precondition(String),

    /// A configuration file could not be read or parsed.
    Config(String),

    /// I/O failure outside of opening a file.
    Io(std::io::Error),

    /// The distributed computation was aborted by some rank.
    Aborted {
        /// The rank that called abort.
        rank: usize,
        /// The diagnostic of that rank.
        message: String,
    },
}

impl ParticleError {
    /// Shorthand for a [ParticleError::Format] error.
    pub fn format(
        file: impl Into<PathBuf>,
        stage: &'static str,
        message: impl Into<String>,
    ) -> Self {
        ParticleError::Format {
            file: file.into(),
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParticleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticleError::FileOpen { path, source } => {
                write!(f, "couldn't open file {}: {}", path.display(), source)
            }
            ParticleError::Format {
                file,
                stage,
                message,
            } => write!(f, "reading {} failed @ {}: {}", file.display(), stage, message),
            ParticleError::InvalidParticle {
                would_be_id,
                position,
            } => write!(
                f,
                "invalid particle, id would be {}, position {:?}",
                would_be_id, position
            ),
            ParticleError::Precondition(e) => write!(f, "Precondition violated: {}", e),
            ParticleError::Config(e) => write!(f, "Configuration error: {}", e),
            ParticleError::Io(e) => write!(f, "I/O error: {}", e),
            ParticleError::Aborted { rank, message } => {
                write!(f, "aborted by rank {}: {}", rank, message)
            }
        }
    }
}

impl std::error::Error for ParticleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParticleError::FileOpen { source, .. } => Some(source),
            ParticleError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ParticleError {
    fn from(e: std::io::Error) -> Self {
        ParticleError::Io(e)
    }
}
