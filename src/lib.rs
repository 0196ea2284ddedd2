//! Client for a remote media-generation service with an immediate mode and
//! a deferred, poll-until-done mode.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod request;

pub use config::{Config, PollConfig};
pub use dispatch::payload::Mode;
pub use dispatch::{Artifact, GenerationClient};
pub use error::GenError;
pub use request::{Blob, GenerationRequest, ParamValue};
