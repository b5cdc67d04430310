#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
pub mod api;
mod controller;
mod resource;

pub use controller::{run, Gateway, Settings, MANAGER};
pub use resource::{
    Agent, AgentSpec, Card, CardEndpoint, CardSpec, CardStatus, Condition, Registry,
    RegistryPhase, RegistrySpec, RegistryStatus, SourceRef,
};
