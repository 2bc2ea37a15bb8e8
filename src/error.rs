use std::path::PathBuf;

use thiserror::Error;

use crate::shared::Layer;

/// Rejections from grid generation and the administrative GridMap updates.
/// The GridMap is left untouched whenever one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("bpm must be a positive number, got {0}")]
    InvalidBpm(f64),

    #[error("track duration must be a positive number, got {0}")]
    InvalidDuration(f64),

    #[error("offset must be a non-negative number, got {0}")]
    InvalidOffset(f64),

    #[error("invalid bridge list: {0}")]
    InvalidBridges(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

#[derive(Error, Debug)]
pub enum MixerError {
    #[error("could not decode {layer:?} layer from {path}: {source}")]
    Decode {
        layer: Layer,
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("{layer:?} layer: {message}")]
    Unsupported { layer: Layer, message: String },

    #[error("no playable layer was loaded")]
    NoPlayableLayer,
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("cannot {op} while {from}")]
    InvalidTransition { from: &'static str, op: &'static str },

    #[error("no track loaded")]
    NoTrack,

    #[error("load was superseded by a newer one")]
    StaleLoad,

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Mixer(#[from] MixerError),
}
