//! Controller Contract (§4.5): the abstraction any command source must
//! satisfy, plus two reference implementations — an HTTP adapter and an
//! in-process "programmatic" controller.

pub mod contract;
pub mod http;
pub mod programmatic;

pub use contract::Controller;
pub use http::HttpAdapterController;
pub use programmatic::{ImuControlResult, ProgrammaticController, ProgrammaticControllerError};
