//! # qubesmgmt
//!
//! Client for the qubesd management API.
//!
//! Calls reach qubesd either over the local socket (in dom0) or through a
//! qrexec helper program (inside a VM). Results are exposed as cached,
//! typed collections of domains, labels and storage pools.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Qubes                                                   │
//! │   domains / labels / pools      pool drivers, properties │
//! │        │  Collection<W>                  │               │
//! │        │  (snapshot + wrapper arena)     │               │
//! │        ▼                                 ▼               │
//! │  ┌─────────────────────────────────────────────────┐     │
//! │  │ AdminClient::call(dest, method, arg, payload)   │     │
//! │  └─────────────────────────────────────────────────┘     │
//! │        │ Call (framed)             ▲ Response::decode    │
//! │        ▼                           │                     │
//! │  ┌──────────────────┐   ┌──────────────────────────┐     │
//! │  │ LocalTransport   │   │ RemoteTransport          │     │
//! │  │ (unix socket)    │   │ (qrexec-client-vm)       │     │
//! │  └──────────────────┘   └──────────────────────────┘     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use qubesmgmt::{ClientConfig, Qubes, Wrapper};
//!
//! # async fn example() -> qubesmgmt::Result<()> {
//! let app = Qubes::new(&ClientConfig::default());
//!
//! for domain in app.domains.objects().await? {
//!     println!("{} ({})", domain.name(), domain.class());
//! }
//!
//! app.add_pool("extra", "file", [("dir_path", "/mnt/extra")]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! A single call fails with exactly one of [`Error::Connection`],
//! [`Error::Protocol`] or [`Error::Remote`]. Nothing is retried.

mod app;
mod call;
mod client;
mod collection;
mod config;
mod domain;
mod error;
mod label;
mod pool;
mod property;
mod response;
pub mod transport;

pub use app::Qubes;
pub use call::Call;
pub use client::AdminClient;
pub use collection::{
    ClassRegistry, Collection, CollectionSpec, Factory, Properties, Snapshot, Wrapper,
    CLASS_PROPERTY,
};
pub use config::{
    ClientConfig, ConnectionType, DEFAULT_QREXEC_CLIENT, DEFAULT_QUBESD_SOCKET, DEFAULT_SOURCE,
};
pub use domain::{Domain, DomainClass};
pub use error::{Error, Result};
pub use label::{Label, LABEL_CLASS};
pub use pool::{pool_add_payload, Pool, PoolDrivers, POOL_CLASS};
pub use property::PropertyHolder;
pub use response::{Response, ERROR_MARKER, SUCCESS_MARKER};
