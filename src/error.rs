//! Crate-level error

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::ModelError;
use crate::parser::ParseError;
use crate::schedule::ScheduleError;
use crate::translator::TranslationError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("cannot read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid model description `{path}`: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
