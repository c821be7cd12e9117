//! Graph authoring model, file-backed graph store, snapshot normalization,
//! and the deployment-version service.
//!
//! A graph is a directed set of agent nodes with typed edges. The editor
//! saves live state through [`store::GraphStore`]; deployments snapshot that
//! state into immutable, content-hashed versions managed by
//! [`deployments::DeploymentService`].

pub mod deployments;
pub mod model;
pub mod snapshot;
pub mod store;

pub use deployments::{DeploymentService, DeploymentVersion, VersionStore};
pub use model::{EdgeKind, Graph, GraphEdge, GraphNode, Position};
pub use store::GraphStore;
