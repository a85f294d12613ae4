//! # Execution kernel
//!
//! The kernel is composed, not inherited: [`chat_kernel::ChatKernel`]
//! implements the [`handlers::KernelHandlers`] set and talks to the host only
//! through an injected [`context::KernelContext`] (parent header, execution
//! counter, stream output).
//!
//! ```text
//! Uninitialized ──first model init──▶ ModelReady
//!       │                                 │
//!       └────────── shutdown ─────────────┴──▶ Terminated (absorbing)
//! ```

pub mod chat_kernel;
pub mod context;
pub mod handlers;
pub mod kernelspec;
pub mod protocol;

pub use chat_kernel::{ChatKernel, KernelState};
pub use context::{ChannelContext, KernelContext, KernelOutput};
pub use handlers::{dispatch, KernelHandlers, ProtocolError};
pub use kernelspec::{KernelFactory, KernelSpec, KernelSpecRegistry, KernelSpecs};
