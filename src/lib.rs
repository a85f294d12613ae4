//! # llmkernel: a notebook kernel backed by a local language model
//!
//! Every code cell sent to this kernel is treated as a prompt. The reply of a
//! locally running model is streamed back as stdout, fragment by fragment. A
//! few magic commands (`%ai ...`) select the model.
//!
//! ## Loading
//!
//! The kernel is not linked into the host. The host loads it through a
//! [`federation::FederationContainer`]:
//!
//! ```text
//! SharedRegistry ─init─▶ FederationContainer ─get("./index")─▶ ModuleThunk
//!                                                    │ invoke
//!                                                    ▼
//!                     resolve "@llmkernel/engine" ─▶ PluginDescriptor
//!                                                    │ activate(app, capabilities)
//!                                                    ▼
//!                                  KernelSpecs.register(spec, factory)
//! ```
//!
//! ## Layers
//!
//! - Federation: registry, container, plugin descriptors ([`federation`], [`extension`])
//! - Kernel: protocol handlers and state machine ([`kernel`])
//! - Commands: the `%ai` language ([`magic`])
//! - Model: catalog and per-session model lifecycle ([`model`])
//! - Engines: the inference runtime behind a trait ([`engine`])
//! - Settings: optional default-model override from the host ([`settings`])
//!
//! Download progress and other side-channel notifications go through the
//! [`event::event_bus::EventBus`]; nothing in the request path waits for a
//! listener.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod extension;
pub mod federation;
pub mod kernel;
pub mod magic;
pub mod model;
pub mod settings;

// Re-exports
pub use error::*;
