//! An incremental view graph core.
//!
//! Environment and transaction values live in persistent [`PropertyList`]s, preferences flow up
//! through [`PreferenceList`]s, [`Tracker`]s record which values a computation read, and a
//! [`ViewGraph`] drives an embedder-provided attribute [`Graph`] to a fixed point once per frame,
//! negotiating layout through [`LayoutComputer`]s.

#[macro_use]
mod log;
#[macro_use]
mod property_list;
#[macro_use]
mod preference;

mod bloom;
mod cache;
pub mod config;
mod environment;
mod error;
pub mod geometry;
mod graph;
mod graph_host;
pub mod layout;
pub mod layout_trace;
mod tracker;
pub mod transaction;
pub mod unary_layout;
mod unique_id;
pub mod update;
mod version_seed;
mod view_graph;

pub use bloom::BloomFilter;
pub use cache::Cache3;
pub use config::Config;
pub use environment::{EnvironmentKey, EnvironmentValues};
pub use error::ViewGraphError;
pub use graph::{AttributeId, Continuation, Graph, NextUpdate, SubgraphFlags, Time, UpdateContext};
pub use graph_host::{
    AsyncTransaction, GraphDelegate, GraphHost, HostData, Mutation, MutationStyle, Phase,
    RemovedState, TransactionSender,
};
pub use layout::{DefaultLayoutEngine, LayoutComputer, LayoutEngine};
pub use preference::{
    HostPreferencesKey, PreferenceKey, PreferenceKeys, PreferenceList, PreferenceValue,
};
pub use property_list::{DerivedPropertyKey, PropertyKey, PropertyKeyLookup, PropertyList};
pub use tracker::Tracker;
pub use transaction::{Transaction, TransactionId, TransactionKey};
pub use unique_id::UniqueId;
pub use version_seed::VersionSeed;
pub use view_graph::{Outputs, SizeThatFitsObserver, UpdateReport, ViewGraph, ViewGraphDelegate};
