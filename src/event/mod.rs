//! # Events
//!
//! Everything the kernel reports outside of a request/response exchange goes
//! through the [`event_bus::EventBus`]:
//!
//! ```text
//! ┌────────────┐  progress hook  ┌──────────┐     ┌──────────────┐
//! │ModelHandle │────────────────▶│ EventBus │────▶│ progress bar │
//! └────────────┘                 └──────────┘     └──────────────┘
//!                                     ▲
//! ┌──────────────┐  default model     │
//! │SettingsBridge│────────────────────┘
//! └──────────────┘
//! ```
//!
//! Nothing on the request path waits on a subscriber.
//!
//! ```rust,no_run
//! # use llmkernel::event::event_bus::{Event, EventBus};
//! # async fn example() {
//! let event_bus = EventBus::new(16);
//! let (mut event_rx, _) = event_bus.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = event_rx.recv().await {
//!         if let Event::Progress(progress) = event {
//!             println!("{:>3.0}% {}", progress.progress * 100.0, progress.text);
//!         }
//!     }
//! });
//! # }
//! ```

pub mod event_bus;
